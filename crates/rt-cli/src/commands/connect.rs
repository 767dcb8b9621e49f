//! Connect command implementation: an interactive shell on a saved host

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, size};
use rt_core::{DisconnectReason, SessionState, TerminalSize};
use rt_session::{ChannelSession, OutputEvent};
use tokio::sync::mpsc;

use crate::keys::{key_to_bytes, shortcut, Shortcut};
use crate::output::{print_info, print_success};
use crate::setup::{load_app_config, resolve_target, ssh_session, Paths};

/// Restores cooked mode when the relay loop exits, however it exits
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Key and resize events read on a blocking thread.
///
/// While `paused` is set the thread stops polling so an authentication
/// prompt can read the terminal itself.
struct EventReader {
    events: mpsc::Receiver<Event>,
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl EventReader {
    fn spawn() -> Self {
        let (tx, events) = mpsc::channel::<Event>(256);
        let paused = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let (thread_paused, thread_stop) = (Arc::clone(&paused), Arc::clone(&stop));

        tokio::task::spawn_blocking(move || {
            while !thread_stop.load(Ordering::Acquire) {
                if thread_paused.load(Ordering::Acquire) {
                    std::thread::sleep(Duration::from_millis(10));
                    continue;
                }
                if event::poll(Duration::from_millis(10)).unwrap_or(false) {
                    if let Ok(evt) = event::read() {
                        if tx.blocking_send(evt).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            events,
            paused,
            stop,
        }
    }

    fn pause(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }
}

impl Drop for EventReader {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

fn local_size() -> Option<TerminalSize> {
    size()
        .ok()
        .filter(|(cols, rows)| *cols > 0 && *rows > 0)
        .map(|(cols, rows)| TerminalSize::new(cols, rows))
}

/// Print a status line while in raw mode
fn notice(text: &str) {
    let mut stdout = std::io::stdout();
    let _ = write!(stdout, "\r\n[relay] {}\r\n", text);
    let _ = stdout.flush();
}

/// Connect to `host` and relay the local terminal until Ctrl+]
pub async fn connect_command(paths: &Paths, host: &str) -> Result<()> {
    let config = load_app_config(paths)?;
    let mut target = resolve_target(&config, paths, host)?;
    if let Some(size) = local_size() {
        target.descriptor.size = size;
    }

    let mut session = ssh_session(&config, &target.profile);
    let mut output = session.subscribe();

    print_info(&format!("Connecting to '{}'...", target.profile.name));
    let ready = session
        .connect(target.descriptor)
        .await
        .with_context(|| format!("Failed to connect to '{}'", target.profile.name))?;
    print_success(&format!("Connected to {} (Ctrl+] to detach)", ready.address));

    let raw = RawMode::enable()?;
    let mut reader = EventReader::spawn();
    let result = relay(&mut session, &mut output, &mut reader).await;
    drop(reader);

    session.disconnect(DisconnectReason::Manual).await;
    drop(raw);
    println!();
    print_success("Detached");
    result
}

async fn relay(
    session: &mut ChannelSession,
    output: &mut mpsc::UnboundedReceiver<OutputEvent>,
    reader: &mut EventReader,
) -> Result<()> {
    let handle = session.handle();
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            Some(evt) = reader.events.recv() => match evt {
                Event::Key(KeyEvent { code, modifiers, kind, .. }) => {
                    if kind == KeyEventKind::Release {
                        continue;
                    }
                    match shortcut(code, modifiers) {
                        Some(Shortcut::Detach) => break,
                        Some(Shortcut::Reconnect) if handle.state() != SessionState::Connected => {
                            reconnect(session, reader).await;
                            continue;
                        }
                        _ => {}
                    }
                    let bytes = key_to_bytes(code, modifiers);
                    if !bytes.is_empty() && handle.send_input(bytes).is_err() {
                        tracing::debug!("Dropped input while disconnected");
                    }
                }
                Event::Paste(text) => {
                    let _ = handle.send_input(text.into_bytes());
                }
                Event::Resize(cols, rows) => {
                    if cols > 0 && rows > 0 {
                        let _ = handle.resize(TerminalSize::new(cols, rows));
                    }
                }
                _ => {}
            },

            event = output.recv() => match event {
                Some(OutputEvent::Data(bytes)) => {
                    stdout.write_all(&bytes)?;
                    stdout.flush()?;
                }
                Some(OutputEvent::Disconnected(DisconnectReason::Unexpected(cause))) => {
                    notice(&format!(
                        "Connection lost: {}. Ctrl+R reconnects, Ctrl+] quits.",
                        cause
                    ));
                }
                Some(_) => {}
                None => break,
            },
        }
    }
    Ok(())
}

async fn reconnect(session: &mut ChannelSession, reader: &EventReader) {
    notice("Reconnecting...");
    reader.pause(true);
    let result = session.reconnect().await;
    reader.pause(false);
    match result {
        Ok(ready) => notice(&format!("Reconnected to {}", ready.address)),
        Err(e) => notice(&format!("Reconnect failed: {}. Ctrl+R retries.", e)),
    }
}
