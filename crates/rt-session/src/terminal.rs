//! Keeps a terminal state model in step with a session's output

use std::time::Duration;

use rt_terminal::{ProbeQuery, ScreenSnapshot, Terminal};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::events::OutputEvent;
use crate::handle::SessionHandle;

/// Background task feeding session output into a [`Terminal`].
///
/// Probes found while the window is open are answered through
/// [`SessionHandle::send_input`]; the rest are forwarded on the query
/// channel for the display layer.
#[derive(Debug)]
pub struct TerminalDriver {
    snapshots: watch::Receiver<ScreenSnapshot>,
    queries: Option<mpsc::UnboundedReceiver<ProbeQuery>>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

impl TerminalDriver {
    /// Start feeding `handle`'s output.
    ///
    /// May be called before connecting or on a live session. In the latter
    /// case the probe window counts from the moment the connection came up,
    /// and output produced before the call is not seen.
    pub fn spawn(handle: SessionHandle, window: Duration) -> Self {
        let mut events = handle.subscribe();
        let status = handle.status().borrow().clone();
        let mut terminal = Terminal::new(status.size, window);
        // Attached to a live connection whose Connected event went out
        // before this subscription.
        if let (true, Some(connected_at)) = (status.is_connected(), status.connected_at) {
            terminal.open_probe_window(connected_at);
        }
        let (snapshot_tx, snapshots) = watch::channel(terminal.snapshot());
        let (query_tx, queries) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let task = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                match event {
                    OutputEvent::Connected { size, .. } => {
                        terminal.reset();
                        terminal.resize(size);
                        terminal.open_probe_window(now());
                    }
                    OutputEvent::Data(chunk) => {
                        let outcome = terminal.feed(&chunk, now());
                        let reply = outcome.response_bytes();
                        if !reply.is_empty() {
                            if let Err(e) = handle.send_input(reply) {
                                tracing::debug!("Dropped probe reply: {}", e);
                            }
                        }
                        for query in outcome.passthrough {
                            let _ = query_tx.send(query);
                        }
                    }
                    OutputEvent::Resized(size) => terminal.resize(size),
                    OutputEvent::Disconnected(_) => terminal.close_probe_window(),
                }

                snapshot_tx.send_replace(terminal.snapshot());
            }
            tracing::debug!("Terminal driver stopped");
        });

        Self {
            snapshots,
            queries: Some(queries),
            shutdown,
            task: Some(task),
        }
    }

    /// Latest screen state, updated after every event
    pub fn snapshots(&self) -> watch::Receiver<ScreenSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> ScreenSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Probes left unanswered; can be taken once
    pub fn take_queries(&mut self) -> Option<mpsc::UnboundedReceiver<ProbeQuery>> {
        self.queries.take()
    }

    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TerminalDriver {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
