//! Convoy: an agent orchestration loop over LLM providers.
//!
//! A run sends the conversation to a model, executes the tools it asks for,
//! feeds the results back, and repeats until a termination policy says stop.
//! Streamed responses are folded into whole turns, the history is truncated
//! without splitting tool call/result pairs, and agents can call agents as
//! tools under depth and token limits.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use convoy::prelude::*;
//!
//! # async fn example() -> convoy::error::Result<()> {
//! let config = ConvoyConfig::from_env();
//! let provider = convoy::provider::create_provider(&config, "openai", "gpt-4o")?;
//! let agent: Agent = Agent::new(Arc::from(provider))
//!     .with_system_prompt("Answer, then call finish.");
//! let result = agent.run(RunRequest::new("Hello!", ())).await?;
//! println!("{}", result.content);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod agent_loop;
pub mod config;
pub mod delta;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod tools;
pub mod types;
pub mod util;
