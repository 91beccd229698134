pub mod context;
pub mod history;
pub mod loop_;
pub mod system_prompt;

pub use history::History;
pub use loop_::{run_agent_loop, Agent, AgentRun, LoopSettings};
