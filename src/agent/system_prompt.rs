//! System message built from the agent's goals.

use crate::types::Goal;

const SEPARATOR_WIDTH: usize = 50;

const FALLBACK_PROMPT: &str =
    "You are a helpful AI assistant. Use the available tools to help users with their tasks.";

/// Render goals, highest priority (lowest number) first.
///
/// Goals with equal priority keep their configured order.
pub fn build_system_prompt(goals: &[Goal]) -> String {
    if goals.is_empty() {
        return FALLBACK_PROMPT.to_string();
    }

    let mut sorted: Vec<&Goal> = goals.iter().collect();
    sorted.sort_by_key(|g| g.priority);

    let rule = "-".repeat(SEPARATOR_WIDTH);
    sorted
        .iter()
        .map(|g| format!("{}:\n{}\n{}\n{}\n", g.name, rule, g.description, rule))
        .collect::<Vec<_>>()
        .join("\n\n")
}
