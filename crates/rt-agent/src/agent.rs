//! The agent run loop

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rt_core::config::AgentSettings;
use rt_core::{CommandSeq, DeviceRegistry, ExecError, SessionState};
use rt_session::{SessionHandle, SessionStatus};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{AgentFailure, CancelReason, RunError, TimeoutSource};
use crate::events::{AgentEvent, AgentState, RunOutcome};
use crate::prompt::{self, AgentContext};
use crate::service::{CompletionRequest, ReasoningService};
use crate::tools::{self, Invocation};
use crate::turn::{self, Turn};
use crate::usage::{UsageLedger, UsageTotals};

/// Tool result text for a command that printed nothing
const NO_OUTPUT: &str = "(command produced no output)";

/// Tool result text for calls left pending when a run ended
const NOT_EXECUTED: &str = "Not executed: the run ended before this call";

/// One command executed during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub seq: CommandSeq,
    pub command: String,
    pub output: String,
}

/// A finished run, kept for display and history
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedRun {
    pub user_message: String,
    pub outcome: RunOutcome,
    /// Service calls made
    pub iterations: u32,
    pub commands: Vec<CommandRecord>,
    pub usage: UsageTotals,
    pub started_at: SystemTime,
    pub duration: Duration,
}

/// Drives one channel session through a reasoning service.
///
/// The conversation persists across runs until [`Agent::reset`].
pub struct Agent {
    handle: SessionHandle,
    service: Arc<dyn ReasoningService>,
    settings: AgentSettings,
    context: AgentContext,
    registry: DeviceRegistry,
    history: Vec<Turn>,
    state: AgentState,
    lifetime_usage: UsageTotals,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("state", &self.state)
            .field("turns", &self.history.len())
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// State local to one run
struct RunCtx<'a> {
    cancel: &'a CancellationToken,
    observer: &'a mpsc::UnboundedSender<AgentEvent>,
    status: watch::Receiver<SessionStatus>,
    usage: UsageLedger,
    commands: Vec<CommandRecord>,
    iterations: u32,
}

impl RunCtx<'_> {
    fn emit(&self, event: AgentEvent) {
        let _ = self.observer.send(event);
    }
}

/// Resolves once the session is no longer connected
async fn disconnected(status: &mut watch::Receiver<SessionStatus>) {
    loop {
        if !status.borrow_and_update().is_connected() {
            return;
        }
        if status.changed().await.is_err() {
            return;
        }
    }
}

impl Agent {
    pub fn new(
        handle: SessionHandle,
        service: Arc<dyn ReasoningService>,
        settings: AgentSettings,
        context: AgentContext,
    ) -> Self {
        Self {
            handle,
            service,
            settings,
            context,
            registry: DeviceRegistry::new(),
            history: Vec::new(),
            state: AgentState::Idle,
            lifetime_usage: UsageTotals::default(),
        }
    }

    /// Device registry used for command hints
    pub fn with_registry(mut self, registry: DeviceRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn context(&self) -> &AgentContext {
        &self.context
    }

    /// Usage summed over every run of this agent
    pub fn lifetime_usage(&self) -> UsageTotals {
        self.lifetime_usage
    }

    /// Forget the conversation
    pub fn reset(&mut self) {
        self.history.clear();
        self.state = AgentState::Idle;
        tracing::debug!("Agent conversation reset");
    }

    pub fn system_prompt(&self) -> String {
        prompt::system_prompt(self.settings.custom_prompt(), &self.registry, &self.context)
    }

    /// Run one user request to completion.
    ///
    /// Fails without side effects when another run holds the session or the
    /// session is not connected. Otherwise always returns an archived run,
    /// whatever the outcome.
    pub async fn run(
        &mut self,
        user_message: &str,
        cancel: CancellationToken,
        observer: mpsc::UnboundedSender<AgentEvent>,
    ) -> Result<ArchivedRun, RunError> {
        let _lease = self.handle.claim_agent().ok_or(RunError::Busy)?;
        let session_state = self.handle.state();
        if session_state != SessionState::Connected {
            return Err(RunError::NotConnected(session_state));
        }

        let started_at = SystemTime::now();
        let started = tokio::time::Instant::now();
        tracing::info!("Agent run started: {}", user_message);

        let mut ctx = RunCtx {
            cancel: &cancel,
            observer: &observer,
            status: self.handle.status(),
            usage: UsageLedger::new(),
            commands: Vec::new(),
            iterations: 0,
        };

        self.history.push(Turn::user(user_message));
        let outcome = self.drive(&mut ctx).await;
        self.close_pending_calls();

        ctx.usage.settle(self.settings.cost_grace).await;
        let usage = ctx.usage.totals();
        self.lifetime_usage.merge(&usage);
        ctx.emit(AgentEvent::Usage(usage));

        self.set_state(&ctx, outcome.state());
        match &outcome {
            RunOutcome::Answered(_) => {
                tracing::info!("Agent run finished after {} iterations", ctx.iterations)
            }
            RunOutcome::Failed(failure) => tracing::warn!("Agent run failed: {}", failure),
        }
        ctx.emit(AgentEvent::Finished(outcome.clone()));

        Ok(ArchivedRun {
            user_message: user_message.to_string(),
            outcome,
            iterations: ctx.iterations,
            commands: ctx.commands,
            usage,
            started_at,
            duration: started.elapsed(),
        })
    }

    fn set_state(&mut self, ctx: &RunCtx<'_>, state: AgentState) {
        if self.state != state {
            self.state = state;
            ctx.emit(AgentEvent::State(state));
        }
    }

    fn cancel_reason(&self, ctx: &RunCtx<'_>) -> Option<CancelReason> {
        if ctx.cancel.is_cancelled() {
            Some(CancelReason::User)
        } else if self.handle.state() != SessionState::Connected {
            Some(CancelReason::Disconnected)
        } else {
            None
        }
    }

    fn close_pending_calls(&mut self) {
        for call_id in turn::unanswered_calls(&self.history) {
            self.history.push(Turn::tool_result(call_id, NOT_EXECUTED, true));
        }
    }

    async fn drive(&mut self, ctx: &mut RunCtx<'_>) -> RunOutcome {
        let limit = self.settings.iteration_cap();
        let tool_specs = tools::tool_specs();

        while ctx.iterations < limit {
            if let Some(reason) = self.cancel_reason(ctx) {
                return RunOutcome::Failed(AgentFailure::Cancelled(reason));
            }
            if ctx.usage.merge_ready() {
                ctx.emit(AgentEvent::Usage(ctx.usage.totals()));
            }

            ctx.iterations += 1;
            tracing::info!("Agent iteration {}", ctx.iterations);
            self.set_state(ctx, AgentState::Thinking);

            let request = CompletionRequest {
                model: self.settings.model.clone(),
                system: self.system_prompt(),
                turns: self.history.clone(),
                tools: tool_specs.clone(),
            };

            let call = tokio::time::timeout(
                self.settings.request_timeout,
                self.service.complete(&request),
            );
            let completion = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    return RunOutcome::Failed(AgentFailure::Cancelled(CancelReason::User));
                }
                _ = disconnected(&mut ctx.status) => {
                    return RunOutcome::Failed(AgentFailure::Cancelled(CancelReason::Disconnected));
                }
                result = call => match result {
                    Err(_) => return RunOutcome::Failed(AgentFailure::Timeout(TimeoutSource::Service)),
                    Ok(Err(e)) => return RunOutcome::Failed(e.into()),
                    Ok(Ok(completion)) => completion,
                },
            };

            let lookup = self.settings.cost_lookup.then_some(&self.service);
            ctx.usage
                .record(completion.id.as_deref(), completion.usage.as_ref(), lookup);
            ctx.emit(AgentEvent::Usage(ctx.usage.totals()));

            if completion.tool_calls.is_empty() {
                let answer = completion.text.unwrap_or_default();
                self.history.push(Turn::Assistant {
                    text: Some(answer.clone()),
                    tool_calls: Vec::new(),
                });
                return RunOutcome::Answered(answer);
            }

            if let Some(text) = completion.text.as_ref().filter(|t| !t.trim().is_empty()) {
                ctx.emit(AgentEvent::Thinking(text.clone()));
            }
            self.history.push(Turn::Assistant {
                text: completion.text.clone(),
                tool_calls: completion.tool_calls.clone(),
            });
            self.set_state(ctx, AgentState::AwaitingToolResult);

            for call in &completion.tool_calls {
                if let Some(reason) = self.cancel_reason(ctx) {
                    return RunOutcome::Failed(AgentFailure::Cancelled(reason));
                }
                let command = match tools::parse_call(call) {
                    Ok(Invocation::RunCommand { command }) => command,
                    Err(reason) => {
                        tracing::warn!("Rejected tool call {}: {}", call.name, reason);
                        self.history.push(Turn::tool_result(&call.id, reason, true));
                        continue;
                    }
                };

                let seq = self.handle.next_seq();
                tracing::info!("Executing {}: {}", seq, command);
                let pending = match self.handle.start_command(seq, &command) {
                    Ok(pending) => pending,
                    Err(e) => return exec_failure(seq, e),
                };
                ctx.emit(AgentEvent::CommandStarted {
                    seq,
                    command: command.clone(),
                });

                let result = tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => {
                        return RunOutcome::Failed(AgentFailure::Cancelled(CancelReason::User));
                    }
                    result = pending.collect() => result,
                };

                match result {
                    Ok(captured) => {
                        let content = if captured.output.trim().is_empty() {
                            NO_OUTPUT.to_string()
                        } else {
                            captured.output.clone()
                        };
                        ctx.emit(AgentEvent::CommandFinished {
                            seq,
                            command: command.clone(),
                            output: captured.output.clone(),
                        });
                        ctx.commands.push(CommandRecord {
                            seq,
                            command,
                            output: captured.output,
                        });
                        self.history.push(Turn::tool_result(&call.id, content, false));
                    }
                    Err(e) => return exec_failure(seq, e),
                }
            }
        }

        RunOutcome::Failed(AgentFailure::IterationLimit { limit })
    }
}

/// How a command that could not complete ends the run
fn exec_failure(seq: CommandSeq, err: ExecError) -> RunOutcome {
    match err {
        ExecError::Timeout { after } => {
            tracing::warn!("{} output did not settle within {:?}", seq, after);
            RunOutcome::Failed(AgentFailure::Timeout(TimeoutSource::Command))
        }
        ExecError::ChannelClosed | ExecError::NotConnected(_) => {
            tracing::warn!("{} abandoned: {}", seq, err);
            RunOutcome::Failed(AgentFailure::Cancelled(CancelReason::Disconnected))
        }
    }
}
