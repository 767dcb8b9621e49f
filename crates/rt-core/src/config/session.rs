//! Channel session settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};
use crate::types::{TerminalKind, TerminalSize};

/// Timing and framing for shell channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Per-address timeout for TCP connect plus SSH handshake
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Quiet period that ends a command capture once output has started
    #[serde(with = "duration_millis")]
    pub idle_window: Duration,

    /// How long a capture waits for the first byte before giving up empty
    #[serde(with = "duration_millis")]
    pub first_output_wait: Duration,

    /// Longest a single capture may run
    #[serde(with = "duration_secs")]
    pub capture_ceiling: Duration,

    /// Appended to every command the agent sends
    pub line_terminator: String,

    /// Text that ends a capture immediately when seen in the output
    pub completion_marker: Option<String>,

    /// How long after connect terminal probes are answered automatically
    #[serde(with = "duration_secs")]
    pub probe_window: Duration,

    /// Terminal type used when a host does not name one
    pub terminal: TerminalKind,

    /// Initial PTY columns
    pub cols: u16,

    /// Initial PTY rows
    pub rows: u16,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            idle_window: Duration::from_millis(300),
            first_output_wait: Duration::from_millis(3000),
            capture_ceiling: Duration::from_secs(30),
            line_terminator: "\r".to_string(),
            completion_marker: None,
            probe_window: Duration::from_secs(5),
            terminal: TerminalKind::Xterm,
            cols: 80,
            rows: 24,
        }
    }
}

impl SessionSettings {
    pub fn size(&self) -> TerminalSize {
        TerminalSize::new(self.cols.max(1), self.rows.max(1))
    }
}
