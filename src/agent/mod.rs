//! Agent module - the tool-calling conversation loop.
//!
//! For every user message the session:
//! 1. Appends the message to its transcript
//! 2. Calls the model with the full transcript and every tool schema
//! 3. If the model requests tools, runs them in order, appends each result
//!    and calls the model again without waiting for the user
//! 4. Stops at a final answer, a gateway failure, or the hop limit

mod activity;
mod agent_loop;
mod prompt;

pub use activity::{truncate_for_log, ActivityEntry, ActivityKind};
pub use agent_loop::{LoopConfig, Session, SessionState, TurnError, TurnOutcome};
pub use prompt::build_system_prompt;
