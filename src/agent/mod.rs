//! Caller-facing bindings over the orchestration loop.
//!
//! [`Agent`] runs until the model calls its terminal tool; [`Chat`] ends on the
//! first turn without tool calls. [`SubAgentTool`] exposes an agent as a tool of
//! another run.

pub mod agent;
pub mod chat;
mod live;
pub mod sub_agent;

pub use agent::Agent;
pub use chat::Chat;
pub use sub_agent::SubAgentTool;
