//! Channel session lifecycle

use std::sync::Arc;

use rt_core::config::{KnockStep, SessionSettings};
use rt_core::traits::{NoPrompter, OpenRequest, Prompter, ShellTransport};
use rt_core::{
    ConnectError, ConnectionDescriptor, DisconnectReason, SessionError, SessionState,
    TerminalSize,
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::events::{OutputEvent, SessionNotice};
use crate::handle::{SessionHandle, SessionStatus, Shared};
use crate::io::IoTask;
use crate::knock;

/// A successful connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ready {
    /// The address that accepted
    pub address: String,
    pub size: TerminalSize,
    /// Addresses tried, including the one that accepted
    pub attempts: usize,
}

struct RunningIo {
    shutdown: CancellationToken,
    task: JoinHandle<DisconnectReason>,
}

/// Owns one remote shell channel and its lifecycle
pub struct ChannelSession {
    transport: Arc<dyn ShellTransport>,
    prompter: Arc<dyn Prompter>,
    status: watch::Sender<SessionStatus>,
    shared: Arc<Shared>,
    descriptor: Option<ConnectionDescriptor>,
    knock: Vec<KnockStep>,
    io: Option<RunningIo>,
    ready: Option<Ready>,
    last_reason: Option<DisconnectReason>,
}

impl std::fmt::Debug for ChannelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSession")
            .field("state", &self.state())
            .field("descriptor", &self.descriptor)
            .field("ready", &self.ready)
            .finish()
    }
}

impl ChannelSession {
    pub fn new(transport: Arc<dyn ShellTransport>, settings: SessionSettings) -> Self {
        let (status, _) = watch::channel(SessionStatus {
            size: settings.size(),
            ..SessionStatus::default()
        });
        Self {
            transport,
            prompter: Arc::new(NoPrompter),
            status,
            shared: Arc::new(Shared::new(settings)),
            descriptor: None,
            knock: Vec::new(),
            io: None,
            ready: None,
            last_reason: None,
        }
    }

    /// Port knock sequence performed before each connect attempt
    pub fn with_knock(mut self, steps: Vec<KnockStep>) -> Self {
        self.knock = steps;
        self
    }

    /// Where missing credentials are asked for
    pub fn set_prompter(&mut self, prompter: Arc<dyn Prompter>) {
        self.prompter = prompter;
    }

    pub fn state(&self) -> SessionState {
        self.status.borrow().state
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            status: self.status.subscribe(),
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<OutputEvent> {
        self.handle().subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.shared.notices.subscribe()
    }

    /// The descriptor a reconnect would use
    pub fn descriptor(&self) -> Option<&ConnectionDescriptor> {
        self.descriptor.as_ref()
    }

    /// How the previous connection ended
    pub fn last_disconnect(&self) -> Option<&DisconnectReason> {
        self.last_reason.as_ref()
    }

    pub fn can_reconnect(&self) -> bool {
        self.descriptor.is_some()
    }

    /// Open a shell, trying each address of `descriptor` in order.
    ///
    /// A live connection is torn down first. The descriptor is kept even
    /// when every address fails, so `reconnect` can retry it.
    pub async fn connect(&mut self, descriptor: ConnectionDescriptor) -> Result<Ready, ConnectError> {
        self.teardown().await;
        self.descriptor = Some(descriptor.clone());
        self.status.send_modify(|s| {
            s.state = SessionState::Connecting;
            s.address = None;
        });

        let timeout = self.shared.settings.connect_timeout;
        let mut last_error: Option<ConnectError> = None;
        let mut auth_rejected = false;

        for (i, address) in descriptor.addresses.iter().enumerate() {
            if !self.knock.is_empty() {
                knock::knock(address, &self.knock).await;
            }

            tracing::info!("Connecting to {}:{} (attempt {})", address, descriptor.port, i + 1);
            let request = OpenRequest {
                address: address.clone(),
                descriptor: descriptor.clone(),
                timeout,
            };
            match self.transport.open(request, Arc::clone(&self.prompter)).await {
                Ok(channel) => {
                    let ready = Ready {
                        address: address.clone(),
                        size: descriptor.size,
                        attempts: i + 1,
                    };
                    self.start_io(channel, &ready);
                    return Ok(ready);
                }
                Err(e) => {
                    tracing::warn!("Connection to {} failed: {}", address, e);
                    auth_rejected |= e == ConnectError::AuthRejected;
                    last_error = Some(e);
                }
            }
        }

        self.status.send_modify(|s| s.state = SessionState::Disconnected);
        if auth_rejected {
            return Err(ConnectError::AuthRejected);
        }
        Err(last_error.unwrap_or_else(|| ConnectError::Unreachable("no addresses to try".into())))
    }

    fn start_io(&mut self, channel: Box<dyn rt_core::traits::ShellChannel>, ready: &Ready) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        self.status.send_modify(|s| {
            s.state = SessionState::Connected;
            s.address = Some(ready.address.clone());
            s.size = ready.size;
            s.connected_at = Some(tokio::time::Instant::now().into_std());
            s.commands = Some(commands_tx);
        });

        let task = IoTask {
            channel,
            commands: commands_rx,
            sinks: self.shared.sinks.clone(),
            status: self.status.clone(),
            notices: self.shared.notices.clone(),
            shutdown: shutdown.clone(),
            address: ready.address.clone(),
            size: ready.size,
        };
        let task = tokio::spawn(task.run());
        self.io = Some(RunningIo { shutdown, task });
        self.ready = Some(ready.clone());

        tracing::info!("Connected to {}", ready.address);
        let _ = self.shared.notices.send(SessionNotice::Connected {
            address: ready.address.clone(),
        });
    }

    /// Stop the current connection, if any, as a manual disconnect
    /// without touching the descriptor.
    async fn teardown(&mut self) {
        if let Some(io) = self.io.take() {
            io.shutdown.cancel();
            self.status.send_modify(|s| {
                s.state = SessionState::Disconnecting;
                s.commands = None;
                s.connected_at = None;
            });
            self.last_reason = Some(io.task.await.unwrap_or(DisconnectReason::Manual));
        }
        self.ready = None;
        self.status.send_modify(|s| {
            s.state = SessionState::Disconnected;
            s.address = None;
            s.commands = None;
            s.connected_at = None;
        });
    }

    /// End the connection.
    ///
    /// `Manual` forgets the descriptor and raises no notice. `Unexpected`
    /// behaves as if the link had failed with the given cause.
    pub async fn disconnect(&mut self, reason: DisconnectReason) {
        match reason {
            DisconnectReason::Manual => {
                self.descriptor = None;
                self.teardown().await;
            }
            DisconnectReason::Unexpected(cause) => {
                let Some(io) = self.io.take() else {
                    return;
                };
                let delivered = self
                    .status
                    .borrow()
                    .commands
                    .as_ref()
                    .map(|tx| tx.send(crate::io::IoCommand::Fail(cause)).is_ok())
                    .unwrap_or(false);
                if !delivered {
                    io.shutdown.cancel();
                }
                self.last_reason = Some(io.task.await.unwrap_or(DisconnectReason::Manual));
                self.ready = None;
                self.status.send_modify(|s| {
                    s.state = SessionState::Disconnected;
                    s.address = None;
                    s.commands = None;
                    s.connected_at = None;
                });
            }
        }
    }

    /// Reconnect with the preserved descriptor at the current size.
    ///
    /// A no-op returning the existing connection while still connected.
    pub async fn reconnect(&mut self) -> Result<Ready, SessionError> {
        if self.state() == SessionState::Connected {
            if let Some(ready) = &self.ready {
                return Ok(ready.clone());
            }
        }
        let descriptor = self
            .descriptor
            .clone()
            .ok_or(SessionError::NothingToReconnect)?;
        let size = self.status.borrow().size;
        tracing::info!("Reconnecting");
        Ok(self.connect(descriptor.with_size(size)).await?)
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        if let Some(io) = &self.io {
            io.shutdown.cancel();
        }
    }
}
