//! Terminal capability probes
//!
//! Some device CLIs (RouterOS in particular) ask the terminal who it is
//! right after login and fall back to monochrome output if nobody answers.
//! For a short window after connect the terminal model answers those
//! queries itself; later queries are left to the display layer.

use std::time::{Duration, Instant};

use crate::screen::CursorPos;

/// A query the remote end sent to the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeQuery {
    /// DA1, `CSI c` or `CSI 0 c`
    PrimaryAttributes,
    /// DA2, `CSI > c`
    SecondaryAttributes,
    /// CPR request, `CSI 6 n`
    CursorPosition,
    /// Operating status, `CSI 5 n`
    DeviceStatus,
    /// DECID, `ESC Z`
    TerminalId,
}

impl ProbeQuery {
    /// The reply an xterm-compatible terminal would send.
    ///
    /// `cursor` is the zero-based position at the time of the query.
    pub fn response(&self, cursor: CursorPos) -> Vec<u8> {
        match self {
            ProbeQuery::PrimaryAttributes | ProbeQuery::TerminalId => b"\x1b[?1;2c".to_vec(),
            ProbeQuery::SecondaryAttributes => b"\x1b[>0;276;0c".to_vec(),
            ProbeQuery::CursorPosition => {
                format!("\x1b[{};{}R", cursor.row + 1, cursor.col + 1).into_bytes()
            }
            ProbeQuery::DeviceStatus => b"\x1b[0n".to_vec(),
        }
    }
}

/// When probes are answered automatically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    window: Duration,
    opened_at: Option<Instant>,
}

impl ProbePolicy {
    /// A closed policy with the given window length
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            opened_at: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Start a new window at `now`
    pub fn open(&mut self, now: Instant) {
        self.opened_at = Some(now);
    }

    pub fn close(&mut self) {
        self.opened_at = None;
    }

    /// True iff `now < opened_at + window`
    pub fn is_open(&self, now: Instant) -> bool {
        match self.opened_at {
            Some(opened) => now.saturating_duration_since(opened) < self.window,
            None => false,
        }
    }

    /// When the current window ends, if one was opened
    pub fn expires_at(&self) -> Option<Instant> {
        self.opened_at.map(|t| t + self.window)
    }
}
