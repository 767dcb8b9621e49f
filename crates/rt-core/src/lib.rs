//! rt-core: Core abstractions and configuration for relay-terminal
//!
//! This crate provides the shared domain types, the transport traits the
//! session engine is written against, configuration structures, the device
//! class registry, and the credential vault.

pub mod config;
pub mod devices;
pub mod error;
pub mod traits;
pub mod types;
pub mod vault;

pub use devices::{DeviceClass, DeviceRegistry};
pub use error::{ConfigError, ConnectError, ExecError, SessionError, VaultError};
pub use types::{
    CommandSeq, ConnectionDescriptor, DisconnectReason, LinkFailure, Secret, SessionState,
    TerminalKind, TerminalSize,
};
