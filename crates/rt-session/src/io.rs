//! The per-connection I/O task

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use rt_core::traits::ShellChannel;
use rt_core::{DisconnectReason, LinkFailure, SessionState, TerminalSize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::events::{OutputEvent, SessionNotice};
use crate::handle::SessionStatus;

/// Requests handled by the I/O task, in queue order
#[derive(Debug)]
pub(crate) enum IoCommand {
    Write(Bytes),
    Resize(TerminalSize),
    Subscribe(mpsc::UnboundedSender<OutputEvent>),
    /// Treat the link as failed
    Fail(LinkFailure),
}

/// Output sinks shared by every connection of a session.
///
/// Senders whose receiver is gone are pruned on the next publish.
#[derive(Debug, Clone, Default)]
pub(crate) struct SinkRegistry(Arc<Mutex<Vec<mpsc::UnboundedSender<OutputEvent>>>>);

impl SinkRegistry {
    pub(crate) fn add(&self, sink: mpsc::UnboundedSender<OutputEvent>) {
        let mut sinks = self.0.lock().unwrap_or_else(|e| e.into_inner());
        sinks.push(sink);
    }

    pub(crate) fn publish(&self, event: &OutputEvent) {
        let mut sinks = self.0.lock().unwrap_or_else(|e| e.into_inner());
        sinks.retain(|sink| sink.send(event.clone()).is_ok());
    }

    pub(crate) fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

pub(crate) struct IoTask {
    pub(crate) channel: Box<dyn ShellChannel>,
    pub(crate) commands: mpsc::UnboundedReceiver<IoCommand>,
    pub(crate) sinks: SinkRegistry,
    pub(crate) status: watch::Sender<SessionStatus>,
    pub(crate) notices: broadcast::Sender<SessionNotice>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) address: String,
    pub(crate) size: TerminalSize,
}

impl IoTask {
    /// Pump the channel until it fails or shutdown is requested.
    ///
    /// Returns how the connection ended. An unexpected end also updates the
    /// status and raises the notices before returning.
    pub(crate) async fn run(self) -> DisconnectReason {
        let IoTask {
            mut channel,
            mut commands,
            sinks,
            status,
            notices,
            shutdown,
            address,
            size,
        } = self;

        let classify = |failure: LinkFailure| {
            if shutdown.is_cancelled() {
                DisconnectReason::Manual
            } else {
                DisconnectReason::Unexpected(failure)
            }
        };

        sinks.publish(&OutputEvent::Connected {
            address: address.clone(),
            size,
        });
        tracing::debug!("Reader started for {}", address);

        let reason = loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break DisconnectReason::Manual,

                // Queued input goes out even while the remote floods output.
                command = commands.recv() => match command {
                    Some(IoCommand::Write(bytes)) => {
                        if let Err(failure) = channel.write(&bytes).await {
                            break classify(failure);
                        }
                    }
                    Some(IoCommand::Resize(size)) => match channel.resize(size).await {
                        Ok(()) => {
                            status.send_modify(|s| s.size = size);
                            sinks.publish(&OutputEvent::Resized(size));
                            tracing::debug!("Remote PTY resized to {}", size);
                        }
                        Err(failure) => break classify(failure),
                    },
                    Some(IoCommand::Subscribe(sink)) => sinks.add(sink),
                    Some(IoCommand::Fail(failure)) => break classify(failure),
                    None => break DisconnectReason::Manual,
                },

                read = channel.read() => match read {
                    Ok(Some(chunk)) => sinks.publish(&OutputEvent::Data(chunk)),
                    Ok(None) => break classify(LinkFailure::Eof),
                    Err(failure) => break classify(failure),
                },
            }
        };

        channel.close().await;
        tracing::debug!("Reader stopped for {}", address);

        // Late subscribers still get the final event.
        commands.close();
        while let Ok(command) = commands.try_recv() {
            if let IoCommand::Subscribe(sink) = command {
                sinks.add(sink);
            }
        }

        match &reason {
            DisconnectReason::Manual => {
                tracing::info!("Disconnected from {} (manual)", address);
            }
            DisconnectReason::Unexpected(cause) => {
                tracing::warn!("Unexpected disconnect from {}: {}", address, cause);
                status.send_modify(|s| {
                    s.state = SessionState::Disconnected;
                    s.commands = None;
                    s.connected_at = None;
                });
                let _ = notices.send(SessionNotice::UnexpectedDisconnect {
                    cause: cause.clone(),
                });
                let _ = notices.send(SessionNotice::ReconnectAvailable);
            }
        }
        sinks.publish(&OutputEvent::Disconnected(reason.clone()));
        reason
    }
}
