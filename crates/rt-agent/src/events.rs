//! Run states and observer events

use rt_core::CommandSeq;

use crate::error::AgentFailure;
use crate::usage::UsageTotals;

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentState {
    #[default]
    Idle,
    /// Waiting for the reasoning service
    Thinking,
    /// Executing requested tools
    AwaitingToolResult,
    Done,
    Cancelled,
    Failed,
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Done | AgentState::Cancelled | AgentState::Failed)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentState::Idle => "idle",
            AgentState::Thinking => "thinking",
            AgentState::AwaitingToolResult => "awaiting_tool_result",
            AgentState::Done => "done",
            AgentState::Cancelled => "cancelled",
            AgentState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Answered(String),
    Failed(AgentFailure),
}

impl RunOutcome {
    pub fn state(&self) -> AgentState {
        match self {
            RunOutcome::Answered(_) => AgentState::Done,
            RunOutcome::Failed(AgentFailure::Cancelled(_)) => AgentState::Cancelled,
            RunOutcome::Failed(_) => AgentState::Failed,
        }
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            RunOutcome::Answered(text) => Some(text),
            RunOutcome::Failed(_) => None,
        }
    }
}

/// Progress reported to a run's observer
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    State(AgentState),
    /// Text the service sent alongside tool calls
    Thinking(String),
    CommandStarted {
        seq: CommandSeq,
        command: String,
    },
    CommandFinished {
        seq: CommandSeq,
        command: String,
        output: String,
    },
    Usage(UsageTotals),
    Finished(RunOutcome),
}
