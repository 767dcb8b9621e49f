//! rt-agent: Agent loop for relay-terminal
//!
//! An [`Agent`] alternates between a [`ReasoningService`] and the remote
//! shell of one channel session: the service proposes `run_command` calls,
//! the agent executes them and feeds the captured output back, until the
//! service answers without tools or the iteration cap is reached.
//!
//! At most one run is active per session. Cancellation is cooperative and
//! never retracts a command that was already sent.

mod agent;
mod error;
mod events;
pub mod prompt;
pub mod service;
pub mod tools;
mod turn;
mod usage;

pub use agent::{Agent, ArchivedRun, CommandRecord};
pub use error::{AgentFailure, CancelReason, RunError, ServiceError, TimeoutSource};
pub use events::{AgentEvent, AgentState, RunOutcome};
pub use prompt::AgentContext;
pub use service::{Completion, CompletionRequest, OpenRouterClient, ReasoningService, Usage};
pub use turn::{ToolCall, Turn};
pub use usage::UsageTotals;
