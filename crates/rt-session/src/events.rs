//! Events published by a channel session

use bytes::Bytes;
use rt_core::{DisconnectReason, LinkFailure, TerminalSize};

/// What output sinks receive, in channel order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// A new channel is live; sent before any of its data
    Connected { address: String, size: TerminalSize },
    /// Raw bytes from the remote shell
    Data(Bytes),
    /// The remote PTY accepted a new size
    Resized(TerminalSize),
    /// The channel ended; the last event of a connection
    Disconnected(DisconnectReason),
}

/// Notifications for the display boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    Connected { address: String },
    /// The link failed without being asked to
    UnexpectedDisconnect { cause: LinkFailure },
    /// A preserved descriptor can be reused by `reconnect`
    ReconnectAvailable,
}
