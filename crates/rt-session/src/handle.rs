//! Cloneable access to a live channel session

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use rt_core::config::SessionSettings;
use rt_core::{CommandSeq, ExecError, SessionError, SessionState, TerminalSize};
use tokio::sync::{broadcast, mpsc, watch};

use crate::capture::{self, CapturedOutput};
use crate::events::{OutputEvent, SessionNotice};
use crate::io::{IoCommand, SinkRegistry};

/// Observable session status
#[derive(Debug, Clone, Default)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Address of the live connection, if any
    pub address: Option<String>,
    pub size: TerminalSize,
    /// When the live connection came up; the probe window opens here
    pub connected_at: Option<Instant>,
    pub(crate) commands: Option<mpsc::UnboundedSender<IoCommand>>,
}

impl SessionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }
}

/// State shared between the session owner and all of its handles
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) sinks: SinkRegistry,
    pub(crate) agent_busy: AtomicBool,
    pub(crate) seq: AtomicU64,
    pub(crate) settings: SessionSettings,
    pub(crate) notices: broadcast::Sender<SessionNotice>,
}

impl Shared {
    pub(crate) fn new(settings: SessionSettings) -> Self {
        let (notices, _) = broadcast::channel(crate::NOTICE_CHANNEL_CAPACITY);
        Self {
            sinks: SinkRegistry::default(),
            agent_busy: AtomicBool::new(false),
            seq: AtomicU64::new(0),
            settings,
            notices,
        }
    }
}

/// A cheap handle onto a [`ChannelSession`](crate::ChannelSession).
///
/// Handles stay valid across reconnects and always address whichever
/// connection is current.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub(crate) status: watch::Receiver<SessionStatus>,
    pub(crate) shared: Arc<Shared>,
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        self.status.borrow().state
    }

    /// Watch receiver for status changes
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn size(&self) -> TerminalSize {
        self.status.borrow().size
    }

    pub fn address(&self) -> Option<String> {
        self.status.borrow().address.clone()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.shared.settings
    }

    fn commands(&self) -> Result<mpsc::UnboundedSender<IoCommand>, SessionError> {
        let status = self.status.borrow();
        match (&status.commands, status.state) {
            (Some(tx), SessionState::Connected) => Ok(tx.clone()),
            (_, state) => Err(SessionError::NotConnected(state)),
        }
    }

    /// Queue raw bytes for the remote shell.
    ///
    /// Never blocks; fails at once unless the session is connected.
    pub fn send_input(&self, bytes: impl Into<Bytes>) -> Result<(), SessionError> {
        self.commands()?
            .send(IoCommand::Write(bytes.into()))
            .map_err(|_| SessionError::ChannelClosed)
    }

    /// Ask the remote PTY to change size
    pub fn resize(&self, size: TerminalSize) -> Result<(), SessionError> {
        self.commands()?
            .send(IoCommand::Resize(size))
            .map_err(|_| SessionError::ChannelClosed)
    }

    /// Register a new output sink.
    ///
    /// While connected the registration travels through the command queue,
    /// so the sink sees every byte produced after input queued later.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<OutputEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.commands() {
            Ok(commands) => {
                if let Err(mpsc::error::SendError(IoCommand::Subscribe(tx))) =
                    commands.send(IoCommand::Subscribe(tx))
                {
                    self.shared.sinks.add(tx);
                }
            }
            Err(_) => self.shared.sinks.add(tx),
        }
        rx
    }

    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.shared.notices.subscribe()
    }

    /// Allocate the next command sequence number
    pub fn next_seq(&self) -> CommandSeq {
        CommandSeq(self.shared.seq.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Write `command` plus the line terminator and collect its output
    pub async fn execute_command(&self, command: &str) -> Result<CapturedOutput, ExecError> {
        self.execute_command_as(self.next_seq(), command).await
    }

    /// [`execute_command`](Self::execute_command) under a sequence number
    /// the caller already allocated
    pub async fn execute_command_as(
        &self,
        seq: CommandSeq,
        command: &str,
    ) -> Result<CapturedOutput, ExecError> {
        self.start_command(seq, command)?.collect().await
    }

    /// Queue `command` and its capture without waiting for output.
    ///
    /// Once this returns `Ok` the command is on its way to the remote shell,
    /// whether or not the returned capture is ever awaited.
    pub fn start_command(
        &self,
        seq: CommandSeq,
        command: &str,
    ) -> Result<PendingCapture, ExecError> {
        let commands = self.commands().map_err(|e| match e {
            SessionError::NotConnected(state) => ExecError::NotConnected(state),
            _ => ExecError::ChannelClosed,
        })?;

        let (tx, events) = mpsc::unbounded_channel();
        commands
            .send(IoCommand::Subscribe(tx))
            .map_err(|_| ExecError::ChannelClosed)?;

        let mut line = String::with_capacity(command.len() + 2);
        line.push_str(command);
        line.push_str(&self.shared.settings.line_terminator);
        commands
            .send(IoCommand::Write(Bytes::from(line)))
            .map_err(|_| ExecError::ChannelClosed)?;
        tracing::debug!("{} sent: {}", seq, command);

        Ok(PendingCapture {
            seq,
            command: command.to_string(),
            events,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Claim the single agent slot of this session.
    ///
    /// Returns `None` while another lease is alive.
    pub fn claim_agent(&self) -> Option<AgentLease> {
        self.shared
            .agent_busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| AgentLease {
                shared: Arc::clone(&self.shared),
            })
    }

    pub fn agent_active(&self) -> bool {
        self.shared.agent_busy.load(Ordering::Acquire)
    }
}

/// A command already written to the remote shell, output not yet collected
#[derive(Debug)]
pub struct PendingCapture {
    seq: CommandSeq,
    command: String,
    events: mpsc::UnboundedReceiver<OutputEvent>,
    shared: Arc<Shared>,
}

impl PendingCapture {
    pub fn seq(&self) -> CommandSeq {
        self.seq
    }

    /// Wait for the output to end
    pub async fn collect(mut self) -> Result<CapturedOutput, ExecError> {
        let (raw, ended) =
            capture::collect(&mut self.events, &self.shared.settings, &self.command).await?;
        tracing::debug!("{} captured {} bytes ({:?})", self.seq, raw.len(), ended);

        Ok(CapturedOutput {
            seq: self.seq,
            output: rt_terminal::strip_controls(&raw),
            raw: Bytes::from(raw),
            command: self.command,
            ended,
        })
    }
}

/// Exclusive right to run an agent on a session; released on drop
#[derive(Debug)]
pub struct AgentLease {
    shared: Arc<Shared>,
}

impl Drop for AgentLease {
    fn drop(&mut self) {
        self.shared.agent_busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached() -> SessionHandle {
        let (_tx, status) = watch::channel(SessionStatus::default());
        SessionHandle {
            status,
            shared: Arc::new(Shared::new(SessionSettings::default())),
        }
    }

    #[test]
    fn test_send_input_fails_fast_when_disconnected() {
        let handle = detached();
        assert_eq!(
            handle.send_input(&b"ls"[..]),
            Err(SessionError::NotConnected(SessionState::Disconnected))
        );
        assert_eq!(
            handle.resize(TerminalSize::new(100, 30)),
            Err(SessionError::NotConnected(SessionState::Disconnected))
        );
    }

    #[tokio::test]
    async fn test_execute_command_fails_fast_when_disconnected() {
        let handle = detached();
        let err = handle.execute_command("uptime").await.unwrap_err();
        assert_eq!(err, ExecError::NotConnected(SessionState::Disconnected));
    }

    #[test]
    fn test_agent_lease_is_exclusive() {
        let handle = detached();
        let lease = handle.claim_agent().expect("first claim");
        assert!(handle.agent_active());
        assert!(handle.clone().claim_agent().is_none());
        drop(lease);
        assert!(!handle.agent_active());
        assert!(handle.claim_agent().is_some());
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let handle = detached();
        assert_eq!(handle.next_seq(), CommandSeq(1));
        assert_eq!(handle.clone().next_seq(), CommandSeq(2));
    }

    #[test]
    fn test_subscribe_while_disconnected_registers_directly() {
        let handle = detached();
        let _rx = handle.subscribe();
        assert_eq!(handle.shared.sinks.len(), 1);
    }
}
