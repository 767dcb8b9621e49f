//! Best-effort command output framing.
//!
//! A capture has no view of command boundaries. It collects whatever the
//! shell prints after the command was written and stops on one of:
//!
//! - the configured completion marker appearing in the output,
//! - a quiet period of `idle_window` once output has started,
//! - `first_output_wait` passing with no output at all (empty capture).
//!
//! Output that keeps flowing past `capture_ceiling` is an
//! [`ExecError::Timeout`]. Echoed input, prompts and late output from an
//! earlier command all land in the capture; callers must tolerate that.

use bytes::Bytes;
use rt_core::config::SessionSettings;
use rt_core::{CommandSeq, ExecError};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

use crate::events::OutputEvent;

/// Why a capture stopped collecting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEnd {
    /// The completion marker was seen
    Marker,
    /// Output went quiet for the idle window
    Quiet,
    /// Nothing arrived before the first-output wait expired
    NoOutput,
}

/// Output collected for one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub seq: CommandSeq,
    pub command: String,
    /// `raw` with escape sequences and control bytes removed
    pub output: String,
    pub raw: Bytes,
    pub ended: CaptureEnd,
}

impl CapturedOutput {
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Where to look for the marker within the collected bytes.
///
/// When the command itself contains the marker its echo would end the
/// capture at once, so the search starts after the first line break.
fn marker_position(raw: &[u8], marker: &[u8], skip_echo: bool) -> Option<usize> {
    if marker.is_empty() {
        return None;
    }
    let start = if skip_echo {
        raw.iter().position(|b| *b == b'\n')? + 1
    } else {
        0
    };
    raw.get(start..)?
        .windows(marker.len())
        .position(|w| w == marker)
        .map(|p| p + start)
}

pub(crate) async fn collect(
    events: &mut mpsc::UnboundedReceiver<OutputEvent>,
    settings: &SessionSettings,
    command: &str,
) -> Result<(Vec<u8>, CaptureEnd), ExecError> {
    let started = Instant::now();
    let ceiling_at = started + settings.capture_ceiling;
    let marker = settings
        .completion_marker
        .as_deref()
        .filter(|m| !m.is_empty());
    let skip_echo = marker.map(|m| command.contains(m)).unwrap_or(false);

    let mut raw: Vec<u8> = Vec::new();
    let mut last_output: Option<Instant> = None;

    loop {
        let deadline = match last_output {
            None => (started + settings.first_output_wait).min(ceiling_at),
            Some(at) => (at + settings.idle_window).min(ceiling_at),
        };

        match timeout_at(deadline, events.recv()).await {
            Ok(Some(OutputEvent::Data(chunk))) => {
                if chunk.is_empty() {
                    continue;
                }
                raw.extend_from_slice(&chunk);
                last_output = Some(Instant::now());
                if let Some(marker) = marker {
                    if let Some(pos) = marker_position(&raw, marker.as_bytes(), skip_echo) {
                        raw.truncate(pos);
                        return Ok((raw, CaptureEnd::Marker));
                    }
                }
            }
            Ok(Some(OutputEvent::Disconnected(_))) | Ok(None) => {
                return Err(ExecError::ChannelClosed);
            }
            Ok(Some(_)) => {}
            Err(_) => {
                return match last_output {
                    None => Ok((raw, CaptureEnd::NoOutput)),
                    Some(at) if at + settings.idle_window <= ceiling_at => {
                        Ok((raw, CaptureEnd::Quiet))
                    }
                    Some(_) => Err(ExecError::Timeout {
                        after: settings.capture_ceiling,
                    }),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings() -> SessionSettings {
        SessionSettings {
            idle_window: Duration::from_millis(300),
            first_output_wait: Duration::from_secs(3),
            capture_ceiling: Duration::from_secs(10),
            ..SessionSettings::default()
        }
    }

    fn data(s: &'static str) -> OutputEvent {
        OutputEvent::Data(Bytes::from_static(s.as_bytes()))
    }

    #[test]
    fn test_marker_position_skips_echo() {
        assert_eq!(marker_position(b"echo END\r\nout\r\nEND", b"END", true), Some(15));
        assert_eq!(marker_position(b"echo END", b"END", true), None);
        assert_eq!(marker_position(b"abcEND", b"END", false), Some(3));
        assert_eq!(marker_position(b"abc", b"", false), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_period_ends_capture() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(data("line one\r\n")).unwrap();
        tx.send(data("line two\r\n")).unwrap();

        let (raw, ended) = collect(&mut rx, &settings(), "ls").await.unwrap();
        assert_eq!(raw, b"line one\r\nline two\r\n");
        assert_eq!(ended, CaptureEnd::Quiet);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_output_is_empty_capture() {
        let (_tx, mut rx) = mpsc::unbounded_channel::<OutputEvent>();
        let started = Instant::now();
        let (raw, ended) = collect(&mut rx, &settings(), "true").await.unwrap();
        assert!(raw.is_empty());
        assert_eq!(ended, CaptureEnd::NoOutput);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_cuts_output() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let settings = SessionSettings {
            completion_marker: Some("__DONE__".into()),
            ..settings()
        };
        tx.send(data("result\r\n__DO")).unwrap();
        tx.send(data("NE__\r\n$ ")).unwrap();

        let (raw, ended) = collect(&mut rx, &settings, "ls").await.unwrap();
        assert_eq!(raw, b"result\r\n");
        assert_eq!(ended, CaptureEnd::Marker);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_output_hits_ceiling() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                if tx.send(data("tick\r\n")).is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });

        let err = collect(&mut rx, &settings(), "ping").await.unwrap_err();
        assert_eq!(
            err,
            ExecError::Timeout {
                after: Duration::from_secs(10)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_capture() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(data("partial")).unwrap();
        tx.send(OutputEvent::Disconnected(rt_core::DisconnectReason::Manual))
            .unwrap();
        let err = collect(&mut rx, &settings(), "ls").await.unwrap_err();
        assert_eq!(err, ExecError::ChannelClosed);
    }
}
