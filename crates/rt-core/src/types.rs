//! Core domain types

use std::fmt;
use std::io;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// Terminal dimensions in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Number of columns
    pub cols: u16,
    /// Number of rows
    pub rows: u16,
}

impl TerminalSize {
    /// Create a new terminal size
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Default terminal size (80x24)
    pub fn default_size() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self::default_size()
    }
}

impl fmt::Display for TerminalSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// Terminal type announced to the remote PTY
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TerminalKind {
    #[default]
    #[serde(rename = "xterm")]
    Xterm,
    #[serde(rename = "xterm-256color")]
    Xterm256Color,
    #[serde(rename = "vt100")]
    Vt100,
    #[serde(rename = "vt220")]
    Vt220,
    #[serde(rename = "linux")]
    Linux,
}

impl TerminalKind {
    /// All supported kinds
    pub const ALL: [TerminalKind; 5] = [
        TerminalKind::Xterm,
        TerminalKind::Xterm256Color,
        TerminalKind::Vt100,
        TerminalKind::Vt220,
        TerminalKind::Linux,
    ];

    /// The TERM value sent with the PTY request
    pub fn term_name(&self) -> &'static str {
        match self {
            TerminalKind::Xterm => "xterm",
            TerminalKind::Xterm256Color => "xterm-256color",
            TerminalKind::Vt100 => "vt100",
            TerminalKind::Vt220 => "vt220",
            TerminalKind::Linux => "linux",
        }
    }
}

impl fmt::Display for TerminalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.term_name())
    }
}

impl FromStr for TerminalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        TerminalKind::ALL
            .into_iter()
            .find(|k| k.term_name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unsupported terminal kind: {}", s))
    }
}

/// A credential held in memory only, wiped on drop
#[derive(Clone)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    /// Wrap a plaintext secret
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Borrow the plaintext
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    /// True if the secret is the empty string
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Everything needed for one connect attempt.
///
/// Addresses are tried in order and the first reachable one wins. A missing
/// username or secret means the transport prompts interactively; building
/// or reading a descriptor never blocks.
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    /// Candidate addresses (hostnames or IPs), in preference order
    pub addresses: Vec<String>,
    /// SSH port
    pub port: u16,
    /// Login name, prompted for when absent
    pub username: Option<String>,
    /// Password, prompted for when absent
    pub secret: Option<Secret>,
    /// Terminal type for the PTY request
    pub terminal: TerminalKind,
    /// Requested PTY size
    pub size: TerminalSize,
}

impl ConnectionDescriptor {
    /// Create a descriptor for the given addresses with defaults elsewhere
    pub fn new<I, S>(addresses: I, port: u16) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
            port,
            username: None,
            secret: None,
            terminal: TerminalKind::default(),
            size: TerminalSize::default(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_secret(mut self, secret: impl Into<Secret>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_terminal(mut self, terminal: TerminalKind) -> Self {
        self.terminal = terminal;
        self
    }

    pub fn with_size(mut self, size: TerminalSize) -> Self {
        self.size = size;
        self
    }

    /// Whether authentication will need interactive prompting
    pub fn needs_prompt(&self) -> bool {
        let no_user = self.username.as_deref().map_or(true, str::is_empty);
        let no_secret = self.secret.as_ref().map_or(true, Secret::is_empty);
        no_user || no_secret
    }

    /// The primary (first) address, if any
    pub fn primary_address(&self) -> Option<&str> {
        self.addresses.first().map(String::as_str)
    }
}

/// Lifecycle state of a channel session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No live channel
    #[default]
    Disconnected,
    /// A connect attempt is in progress
    Connecting,
    /// The channel is live and accepts input
    Connected,
    /// A manual disconnect is tearing the channel down
    Disconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

/// Why a live channel stopped working
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkFailure {
    /// The remote side ended the stream cleanly
    #[error("end of stream")]
    Eof,
    /// The SSH channel was closed
    #[error("channel closed")]
    ChannelClosed,
    /// The TCP connection was reset
    #[error("connection reset")]
    ConnectionReset,
    /// A write hit a closed pipe
    #[error("broken pipe")]
    BrokenPipe,
    /// Any other transport failure
    #[error("{0}")]
    Other(String),
}

impl LinkFailure {
    /// Classify an I/O error
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => LinkFailure::Eof,
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                LinkFailure::ConnectionReset
            }
            io::ErrorKind::BrokenPipe => LinkFailure::BrokenPipe,
            io::ErrorKind::NotConnected => LinkFailure::ChannelClosed,
            _ => LinkFailure::Other(err.to_string()),
        }
    }
}

impl From<io::Error> for LinkFailure {
    fn from(err: io::Error) -> Self {
        LinkFailure::from_io(&err)
    }
}

/// How a channel session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The user asked for the disconnect
    Manual,
    /// The link failed on its own
    Unexpected(LinkFailure),
}

impl DisconnectReason {
    /// True for a user-initiated disconnect
    pub fn is_manual(&self) -> bool {
        matches!(self, DisconnectReason::Manual)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Manual => write!(f, "manual"),
            DisconnectReason::Unexpected(cause) => write!(f, "unexpected ({})", cause),
        }
    }
}

/// Sequence number of a command issued through a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommandSeq(pub u64);

impl CommandSeq {
    /// Get the raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}
