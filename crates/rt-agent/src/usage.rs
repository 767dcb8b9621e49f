//! Token and cost accounting

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::service::{ReasoningService, Usage};

/// Running totals for a run
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UsageTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Cost in credits; calls whose price is still unknown contribute nothing
    pub cost: f64,
    /// Service calls made
    pub calls: u32,
}

impl UsageTotals {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn merge(&mut self, other: &UsageTotals) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.cost += other.cost;
        self.calls += other.calls;
    }
}

impl std::fmt::Display for UsageTotals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} calls, {} prompt + {} completion tokens, cost {:.6}",
            self.calls, self.prompt_tokens, self.completion_tokens, self.cost
        )
    }
}

#[derive(Debug)]
struct CostUpdate {
    call_id: String,
    cost: Option<f64>,
}

/// Per-run usage with asynchronously resolved costs.
///
/// Costs missing from a response are looked up in a background task per
/// call id; results come back over a channel and are applied once each.
pub(crate) struct UsageLedger {
    totals: UsageTotals,
    pending: HashSet<String>,
    tx: mpsc::UnboundedSender<CostUpdate>,
    rx: mpsc::UnboundedReceiver<CostUpdate>,
}

impl UsageLedger {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            totals: UsageTotals::default(),
            pending: HashSet::new(),
            tx,
            rx,
        }
    }

    pub(crate) fn totals(&self) -> UsageTotals {
        self.totals
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Count one service call
    pub(crate) fn record(
        &mut self,
        call_id: Option<&str>,
        usage: Option<&Usage>,
        service: Option<&Arc<dyn ReasoningService>>,
    ) {
        self.totals.calls += 1;
        if let Some(usage) = usage {
            self.totals.prompt_tokens += usage.prompt_tokens;
            self.totals.completion_tokens += usage.completion_tokens;
        }

        // A call id without an inline price is looked up, usage object or not.
        match (usage.and_then(|u| u.cost), call_id, service) {
            (Some(cost), _, _) => self.totals.cost += cost,
            (None, Some(id), Some(service)) => self.spawn_lookup(id, Arc::clone(service)),
            _ => {}
        }
    }

    fn spawn_lookup(&mut self, call_id: &str, service: Arc<dyn ReasoningService>) {
        if !self.pending.insert(call_id.to_string()) {
            return;
        }
        let tx = self.tx.clone();
        let call_id = call_id.to_string();
        tokio::spawn(async move {
            let cost = match service.lookup_cost(&call_id).await {
                Ok(cost) => cost,
                Err(e) => {
                    tracing::debug!("Cost lookup for {} failed: {}", call_id, e);
                    None
                }
            };
            let _ = tx.send(CostUpdate { call_id, cost });
        });
    }

    fn apply(&mut self, update: CostUpdate) -> bool {
        if !self.pending.remove(&update.call_id) {
            return false;
        }
        if let Some(cost) = update.cost {
            self.totals.cost += cost;
        }
        true
    }

    /// Apply every lookup that has finished. Returns whether totals changed.
    pub(crate) fn merge_ready(&mut self) -> bool {
        let mut changed = false;
        while let Ok(update) = self.rx.try_recv() {
            changed |= self.apply(update);
        }
        changed
    }

    /// Wait up to `grace` for outstanding lookups
    pub(crate) async fn settle(&mut self, grace: Duration) {
        self.merge_ready();
        if self.pending.is_empty() {
            return;
        }
        let deadline = tokio::time::Instant::now() + grace;
        while !self.pending.is_empty() {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(update)) => {
                    self.apply(update);
                }
                Ok(None) | Err(_) => break,
            }
        }
        if !self.pending.is_empty() {
            tracing::debug!("{} cost lookups still pending at archive time", self.pending.len());
        }
    }
}
