//! Agent loop primitives: termination, truncation, guards, events, and the runner.

pub mod events;
pub mod guard;
pub mod history;
pub mod policy;
pub mod runner;
pub mod types;

pub use events::*;
pub use guard::{NestingDepth, TokenBudget};
pub use history::{safe_boundaries, truncate_history};
pub use policy::TerminationPolicy;
pub use runner::{LoopRunner, RunRequest};
pub use types::*;
