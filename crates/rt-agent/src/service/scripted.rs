//! A reasoning service that replays canned responses

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{Completion, CompletionRequest, ReasoningService};
use crate::error::ServiceError;

enum Step {
    Reply(Completion),
    Fail(String),
    /// Never answers
    Stall,
}

/// Replays a fixed script of completions, in order.
///
/// When the script runs out the last reply is repeated. Every request is
/// recorded for inspection.
#[derive(Default)]
pub struct ScriptedService {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Completion>>,
    requests: Mutex<Vec<CompletionRequest>>,
    costs: Mutex<Vec<(String, f64)>>,
    cost_delay: Duration,
}

impl std::fmt::Debug for ScriptedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedService")
            .field("requests", &self.request_count())
            .finish_non_exhaustive()
    }
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, completion: Completion) -> Self {
        self.push(Step::Reply(completion))
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Step::Fail(message.into()))
    }

    pub fn stall(self) -> Self {
        self.push(Step::Stall)
    }

    /// Price reported by `lookup_cost` for `call_id`
    pub fn with_cost(self, call_id: impl Into<String>, cost: f64) -> Self {
        if let Ok(mut costs) = self.costs.lock() {
            costs.push((call_id.into(), cost));
        }
        self
    }

    /// How long `lookup_cost` takes
    pub fn with_cost_delay(mut self, delay: Duration) -> Self {
        self.cost_delay = delay;
        self
    }

    fn push(self, step: Step) -> Self {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(step);
        }
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ReasoningService for ScriptedService {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ServiceError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let step = self.steps.lock().ok().and_then(|mut s| s.pop_front());
        match step {
            Some(Step::Reply(completion)) => {
                if let Ok(mut last) = self.last.lock() {
                    *last = Some(completion.clone());
                }
                Ok(completion)
            }
            Some(Step::Fail(message)) => Err(ServiceError::InvalidResponse(message)),
            Some(Step::Stall) => {
                std::future::pending::<()>().await;
                Err(ServiceError::InvalidResponse("stalled".into()))
            }
            None => self
                .last
                .lock()
                .ok()
                .and_then(|last| last.clone())
                .ok_or_else(|| ServiceError::InvalidResponse("script exhausted".into())),
        }
    }

    async fn lookup_cost(&self, call_id: &str) -> Result<Option<f64>, ServiceError> {
        if !self.cost_delay.is_zero() {
            tokio::time::sleep(self.cost_delay).await;
        }
        let cost = self.costs.lock().ok().and_then(|costs| {
            costs
                .iter()
                .find(|(id, _)| id == call_id)
                .map(|(_, cost)| *cost)
        });
        Ok(cost)
    }
}
