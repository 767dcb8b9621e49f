//! Core error types for relay-terminal

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::SessionState;

/// Failure to establish a shell channel.
///
/// Returned by a connect attempt only after every address of the
/// descriptor has been tried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// No address accepted a connection
    #[error("Host unreachable: {0}")]
    Unreachable(String),

    /// The remote end refused the supplied or prompted credentials
    #[error("Authentication rejected")]
    AuthRejected,

    /// The remote end did not answer in time
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure while running a command for the agent
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The channel closed before output could be collected
    #[error("Channel closed")]
    ChannelClosed,

    /// Output never went quiet before the capture ceiling
    #[error("Command output did not settle within {after:?}")]
    Timeout { after: Duration },

    /// The session is not connected
    #[error("Session is {0}, not connected")]
    NotConnected(SessionState),
}

/// Session-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session is not connected
    #[error("Session is {0}, not connected")]
    NotConnected(SessionState),

    /// The channel went away while a request was in flight
    #[error("Channel closed")]
    ChannelClosed,

    /// Reconnect requested but no descriptor was preserved
    #[error("Nothing to reconnect: the last disconnect was manual or no connection was made")]
    NothingToReconnect,

    /// A connect or reconnect attempt failed
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// Credential vault errors.
///
/// None of these are retried automatically; the user has to re-enter the
/// passphrase.
#[derive(Error, Debug)]
pub enum VaultError {
    /// The passphrase did not match the stored verifier
    #[error("Wrong passphrase")]
    WrongPassphrase,

    /// A sealed secret or vault file failed authentication or parsing
    #[error("Vault data is corrupt or was sealed with a different key: {0}")]
    Corrupt(String),

    /// No vault header exists yet
    #[error("Vault is not initialized")]
    NotInitialized,

    /// The vault has no working key in this process
    #[error("Vault is locked")]
    Locked,

    /// I/O error while reading or writing vault files
    #[error("Vault I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Host profile lookup failed
    #[error("Unknown host: {0}")]
    UnknownHost(String),
}
