//! Agent error types

use std::time::Duration;

use rt_core::SessionState;
use thiserror::Error;

/// Why a run could not start
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// Another run holds the session
    #[error("An agent run is already active on this session")]
    Busy,

    #[error("Session is {0}, not connected")]
    NotConnected(SessionState),
}

/// Who stopped a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    User,
    /// The session lost its connection
    Disconnected,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::User => write!(f, "cancelled by user"),
            CancelReason::Disconnected => write!(f, "session disconnected"),
        }
    }
}

/// What ran out of time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutSource {
    /// The reasoning service did not answer in time
    Service,
    /// Command output never settled
    Command,
}

impl std::fmt::Display for TimeoutSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutSource::Service => write!(f, "the reasoning service"),
            TimeoutSource::Command => write!(f, "command output to settle"),
        }
    }
}

/// How a started run failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentFailure {
    #[error("Iteration limit of {limit} reached")]
    IterationLimit { limit: u32 },

    #[error("Reasoning service error: {0}")]
    ServiceError(String),

    #[error("Cancelled: {0}")]
    Cancelled(CancelReason),

    #[error("Timed out waiting for {0}")]
    Timeout(TimeoutSource),
}

/// Reasoning service errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("No API key configured (set it in the config file or {0})")]
    MissingApiKey(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<ServiceError> for AgentFailure {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Timeout(_) => AgentFailure::Timeout(TimeoutSource::Service),
            ServiceError::Http(e) if e.is_timeout() => AgentFailure::Timeout(TimeoutSource::Service),
            other => AgentFailure::ServiceError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_timeout_maps_to_timeout_failure() {
        let failure: AgentFailure = ServiceError::Timeout(Duration::from_secs(60)).into();
        assert_eq!(failure, AgentFailure::Timeout(TimeoutSource::Service));
    }

    #[test]
    fn test_other_service_errors_keep_message() {
        let failure: AgentFailure = ServiceError::Status {
            status: 401,
            body: "bad key".into(),
        }
        .into();
        assert_eq!(
            failure,
            AgentFailure::ServiceError("API request failed with status 401: bad key".into())
        );
    }

    #[test]
    fn test_cancelled_display() {
        let failure = AgentFailure::Cancelled(CancelReason::Disconnected);
        assert_eq!(failure.to_string(), "Cancelled: session disconnected");
    }
}
