//! Reasoning service boundary

mod openrouter;
mod scripted;

pub use openrouter::OpenRouterClient;
pub use scripted::ScriptedService;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::tools::ToolSpec;
use crate::turn::{ToolCall, Turn};

/// Everything one completion call needs
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    /// System instructions, rebuilt for every call
    pub system: String,
    pub turns: Vec<Turn>,
    pub tools: Vec<ToolSpec>,
}

/// Token counts reported with a response
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Present when the service priced the call inline
    pub cost: Option<f64>,
}

/// One service response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Completion {
    /// Service-side id, used for cost lookups
    pub id: Option<String>,
    pub text: Option<String>,
    /// Executed in order; empty means the text is the final answer
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
}

#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ServiceError>;

    /// Price of a finished call, if the service can tell
    async fn lookup_cost(&self, call_id: &str) -> Result<Option<f64>, ServiceError>;
}
