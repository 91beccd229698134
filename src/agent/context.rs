//! Message context builder for the agent loop.

use crate::agent::history::History;
use crate::types::*;
use tracing::debug;

/// Build the message list for an inference call.
///
/// System messages are always sent. Of the rest, roughly the last `window`
/// are kept (`0` keeps everything). A window that would open on tool
/// results is widened back to the assistant message that requested them,
/// so the latest turn is always sent whole. The first user message (the
/// task) is pinned when it would otherwise drop out.
pub fn build_messages(history: &History, window: usize) -> Vec<ChatMessage> {
    let (system, rest): (Vec<&ChatMessage>, Vec<&ChatMessage>) =
        history.iter().partition(|m| m.role == ChatRole::System);

    let mut start = if window == 0 {
        0
    } else {
        rest.len().saturating_sub(window)
    };
    while start > 0 && rest[start].role == ChatRole::Tool {
        start -= 1;
    }

    let mut messages: Vec<ChatMessage> = system.into_iter().cloned().collect();
    if start > 0 {
        if let Some(task) = rest[..start].iter().find(|m| m.role == ChatRole::User) {
            messages.push((*task).clone());
        }
    }
    messages.extend(rest[start..].iter().map(|m| (*m).clone()));

    debug!(
        "Context: {} of {} messages (window {})",
        messages.len(),
        history.len(),
        window
    );
    messages
}
