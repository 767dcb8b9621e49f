//! Ask command implementation: one agent run against a saved host

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rt_agent::{Agent, AgentContext, AgentEvent, OpenRouterClient, ReasoningService, RunOutcome};
use rt_core::DisconnectReason;
use rt_session::TerminalDriver;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::output::{format_screen, format_usage, print_info, print_success, print_thought};
use crate::setup::{load_app_config, resolve_target, ssh_session, Paths};

/// How long the login banner may take to settle before the first command
const SETTLE_AFTER_LOGIN: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    /// Overrides `agent.model`
    pub model: Option<String>,
    /// Overrides `agent.max_iterations`
    pub max_iterations: Option<u32>,
    /// Print the remote screen when the run ends
    pub show_screen: bool,
}

/// Connect to `host`, run the agent once on `message` and print the answer
pub async fn ask_command(
    paths: &Paths,
    host: &str,
    message: &str,
    options: AskOptions,
) -> Result<()> {
    let mut config = load_app_config(paths)?;
    if let Some(model) = options.model {
        config.agent.model = model;
    }
    if let Some(limit) = options.max_iterations {
        config.agent.max_iterations = limit;
    }

    let service: Arc<dyn ReasoningService> = Arc::new(
        OpenRouterClient::from_settings(&config.agent)
            .context("Failed to set up the reasoning service")?,
    );
    let target = resolve_target(&config, paths, host)?;

    let mut session = ssh_session(&config, &target.profile);
    // Attached before connecting so probes in the login banner are answered.
    let mut driver = TerminalDriver::spawn(session.handle(), config.session.probe_window);
    print_info(&format!("Connecting to '{}'...", target.profile.name));
    let ready = session
        .connect(target.descriptor)
        .await
        .with_context(|| format!("Failed to connect to '{}'", target.profile.name))?;
    print_success(&format!("Connected to {}", ready.address));

    if let Some(mut queries) = driver.take_queries() {
        tokio::spawn(async move {
            while let Some(query) = queries.recv().await {
                tracing::debug!("Terminal query left unanswered: {:?}", query);
            }
        });
    }
    tokio::time::sleep(SETTLE_AFTER_LOGIN).await;

    let context = AgentContext::from_profile(&target.profile, Some(ready.address.as_str()));
    let mut agent = Agent::new(session.handle(), service, config.agent.clone(), context)
        .with_registry(config.device_registry());

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, cancelling run");
            ctrl_c.cancel();
        }
    });

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(events_rx));
    let archived = agent.run(message, cancel, events_tx).await;
    let _ = printer.await;

    if options.show_screen {
        println!("{}", format_screen(&driver.snapshot()));
    }
    driver.stop().await;
    session.disconnect(DisconnectReason::Manual).await;

    let archived = archived?;
    print_info(&format!(
        "{} in {:.1}s: {}",
        archived.outcome.state(),
        archived.duration.as_secs_f64(),
        format_usage(&archived.usage)
    ));
    match archived.outcome {
        RunOutcome::Answered(_) => Ok(()),
        RunOutcome::Failed(failure) => Err(failure.into()),
    }
}

async fn print_events(mut events: mpsc::UnboundedReceiver<AgentEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            AgentEvent::State(state) => tracing::debug!("Agent state: {}", state),
            AgentEvent::Thinking(text) => print_thought(text.trim()),
            AgentEvent::CommandStarted { seq, command } => {
                print_info(&format!("[{}] $ {}", seq, command));
            }
            AgentEvent::CommandFinished { output, .. } => {
                if !output.trim().is_empty() {
                    println!("{}", output.trim_end());
                }
            }
            AgentEvent::Usage(usage) => tracing::debug!("Usage so far: {}", usage),
            AgentEvent::Finished(RunOutcome::Answered(answer)) => {
                println!();
                println!("{}", answer.trim());
            }
            AgentEvent::Finished(RunOutcome::Failed(failure)) => {
                tracing::debug!("Run failed: {}", failure);
            }
        }
    }
}
