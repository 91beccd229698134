//! tool-agent: a tool-calling agent runtime.
//!
//! Tools are declared with a typed parameter schema and registered in an
//! explicitly constructed [`tools::ToolRegistry`]. The [`agent`] loop asks a
//! model for the next step, dispatches any tool calls it makes through
//! [`tools::Dispatcher`], and feeds the structured results back until the
//! model answers, a terminal tool runs, or the turn limit is reached.

pub mod agent;
pub mod config;
pub mod llm;
pub mod tools;
pub mod types;
