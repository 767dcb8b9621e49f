//! Transport traits
//!
//! The session engine only ever talks to a remote shell through these two
//! traits. A transport produces channels; a channel is one interactive shell
//! with a PTY attached.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::Prompter;
use crate::error::ConnectError;
use crate::types::{ConnectionDescriptor, LinkFailure, TerminalSize};

/// One attempt to open a shell on a single address
#[derive(Debug, Clone)]
pub struct OpenRequest {
    /// The address being tried
    pub address: String,
    /// The descriptor the attempt was made from
    pub descriptor: ConnectionDescriptor,
    /// Upper bound for TCP connect plus handshake
    pub timeout: Duration,
}

/// Something that can open interactive shell channels
#[async_trait]
pub trait ShellTransport: Send + Sync {
    /// Connect, authenticate, allocate a PTY sized from the descriptor and
    /// start a shell on it.
    ///
    /// Credentials missing from the descriptor are asked for through
    /// `prompter`.
    async fn open(
        &self,
        request: OpenRequest,
        prompter: Arc<dyn Prompter>,
    ) -> Result<Box<dyn ShellChannel>, ConnectError>;
}

/// A live shell channel
#[async_trait]
pub trait ShellChannel: Send {
    /// Read the next chunk of output.
    ///
    /// Must be cancel safe: dropping the future loses no data. `Ok(None)`
    /// means the remote end closed the stream.
    async fn read(&mut self) -> Result<Option<Bytes>, LinkFailure>;

    /// Write raw bytes to the remote shell
    async fn write(&mut self, data: &[u8]) -> Result<(), LinkFailure>;

    /// Tell the remote PTY about a new window size
    async fn resize(&mut self, size: TerminalSize) -> Result<(), LinkFailure>;

    /// Close the channel and its connection
    async fn close(&mut self);
}
