//! In-process loopback transport
//!
//! Stands in for a network transport in tests and demos. Each address gets
//! a scripted outcome; accepted connections hand the test a [`RemoteEnd`]
//! that plays the part of the remote shell.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rt_core::traits::{OpenRequest, Prompter, ShellChannel, ShellTransport};
use rt_core::{ConnectError, LinkFailure, TerminalSize};
use tokio::sync::mpsc;

/// What happens when an address is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressBehavior {
    Accept,
    /// Fails with `Unreachable`
    Refuse,
    /// Fails with `AuthRejected`
    RejectAuth,
    /// Never answers; fails with `Timeout` once the request timeout passes
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Credentials {
    username: String,
    secret: String,
}

#[derive(Debug)]
enum RemoteMsg {
    Data(Bytes),
    Eof,
    Fail(LinkFailure),
}

#[derive(Debug, Default)]
struct Inner {
    behaviors: HashMap<String, AddressBehavior>,
    credentials: Option<Credentials>,
    attempts: Vec<String>,
}

/// Loopback [`ShellTransport`].
///
/// Addresses without a scripted behavior are refused.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    inner: Arc<Mutex<Inner>>,
    remotes_tx: mpsc::UnboundedSender<RemoteEnd>,
    remotes_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<RemoteEnd>>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (remotes_tx, remotes_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            remotes_tx,
            remotes_rx: Arc::new(tokio::sync::Mutex::new(remotes_rx)),
        }
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_behavior(self, address: impl Into<String>, behavior: AddressBehavior) -> Self {
        self.set_behavior(address, behavior);
        self
    }

    pub fn set_behavior(&self, address: impl Into<String>, behavior: AddressBehavior) {
        self.inner().behaviors.insert(address.into(), behavior);
    }

    /// Require these credentials; missing ones are prompted for
    pub fn with_credentials(self, username: impl Into<String>, secret: impl Into<String>) -> Self {
        self.inner().credentials = Some(Credentials {
            username: username.into(),
            secret: secret.into(),
        });
        self
    }

    /// Addresses opened so far, in order
    pub fn attempts(&self) -> Vec<String> {
        self.inner().attempts.clone()
    }

    /// Wait for the next accepted connection
    pub async fn next_remote(&self) -> Option<RemoteEnd> {
        self.remotes_rx.lock().await.recv().await
    }

    async fn authenticate(
        &self,
        request: &OpenRequest,
        prompter: &dyn Prompter,
    ) -> Result<String, ConnectError> {
        let required = self.inner().credentials.clone();
        let descriptor = &request.descriptor;

        let username = match descriptor.username.clone().filter(|u| !u.is_empty()) {
            Some(user) => user,
            None => prompter
                .prompt("login: ", true)
                .await
                .ok_or(ConnectError::AuthRejected)?,
        };

        let Some(required) = required else {
            return Ok(username);
        };

        let secret = match descriptor.secret.as_ref().filter(|s| !s.is_empty()) {
            Some(secret) => secret.expose().to_string(),
            None => prompter
                .prompt("Password: ", false)
                .await
                .ok_or(ConnectError::AuthRejected)?,
        };

        if username == required.username && secret == required.secret {
            Ok(username)
        } else {
            Err(ConnectError::AuthRejected)
        }
    }
}

#[async_trait]
impl ShellTransport for MemoryTransport {
    async fn open(
        &self,
        request: OpenRequest,
        prompter: Arc<dyn Prompter>,
    ) -> Result<Box<dyn ShellChannel>, ConnectError> {
        let behavior = {
            let mut inner = self.inner();
            inner.attempts.push(request.address.clone());
            inner
                .behaviors
                .get(&request.address)
                .cloned()
                .unwrap_or(AddressBehavior::Refuse)
        };

        match behavior {
            AddressBehavior::Refuse => {
                return Err(ConnectError::Unreachable(format!(
                    "{}: connection refused",
                    request.address
                )))
            }
            AddressBehavior::RejectAuth => return Err(ConnectError::AuthRejected),
            AddressBehavior::Hang => {
                tokio::time::sleep(request.timeout).await;
                return Err(ConnectError::Timeout(request.timeout));
            }
            AddressBehavior::Accept => {}
        }

        let username = self.authenticate(&request, prompter.as_ref()).await?;

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (resize_tx, resize_rx) = mpsc::unbounded_channel();
        let fail_writes = Arc::new(Mutex::new(None));

        let remote = RemoteEnd {
            address: request.address.clone(),
            username,
            size: request.descriptor.size,
            output: output_tx,
            input: input_rx,
            resizes: resize_rx,
            fail_writes: Arc::clone(&fail_writes),
        };
        let channel = MemoryChannel {
            output: output_rx,
            input: input_tx,
            resizes: resize_tx,
            fail_writes,
            finished: false,
        };
        let _ = self.remotes_tx.send(remote);
        Ok(Box::new(channel))
    }
}

/// The remote side of an accepted loopback connection
#[derive(Debug)]
pub struct RemoteEnd {
    address: String,
    username: String,
    size: TerminalSize,
    output: mpsc::UnboundedSender<RemoteMsg>,
    input: mpsc::UnboundedReceiver<Bytes>,
    resizes: mpsc::UnboundedReceiver<TerminalSize>,
    fail_writes: Arc<Mutex<Option<LinkFailure>>>,
}

impl RemoteEnd {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// PTY size requested at open
    pub fn initial_size(&self) -> TerminalSize {
        self.size
    }

    /// Push shell output to the client
    pub fn send(&self, data: impl Into<Bytes>) -> bool {
        self.output.send(RemoteMsg::Data(data.into())).is_ok()
    }

    pub fn eof(&self) {
        let _ = self.output.send(RemoteMsg::Eof);
    }

    /// Make the client's next read fail
    pub fn fail(&self, failure: LinkFailure) {
        let _ = self.output.send(RemoteMsg::Fail(failure));
    }

    /// Make every later client write fail
    pub fn fail_writes(&self, failure: LinkFailure) {
        *self.fail_writes.lock().unwrap_or_else(|e| e.into_inner()) = Some(failure);
    }

    /// Next chunk the client wrote; `None` once the client closed
    pub async fn recv_input(&mut self) -> Option<Bytes> {
        self.input.recv().await
    }

    /// Everything written so far without waiting
    pub fn drain_input(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Ok(chunk) = self.input.try_recv() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    pub async fn next_resize(&mut self) -> Option<TerminalSize> {
        self.resizes.recv().await
    }

    /// Whether the client has closed its channel
    pub fn is_closed(&self) -> bool {
        self.output.is_closed()
    }
}

struct MemoryChannel {
    output: mpsc::UnboundedReceiver<RemoteMsg>,
    input: mpsc::UnboundedSender<Bytes>,
    resizes: mpsc::UnboundedSender<TerminalSize>,
    fail_writes: Arc<Mutex<Option<LinkFailure>>>,
    finished: bool,
}

impl MemoryChannel {
    fn write_failure(&self) -> Option<LinkFailure> {
        self.fail_writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ShellChannel for MemoryChannel {
    async fn read(&mut self) -> Result<Option<Bytes>, LinkFailure> {
        if self.finished {
            return Ok(None);
        }
        match self.output.recv().await {
            Some(RemoteMsg::Data(data)) => Ok(Some(data)),
            Some(RemoteMsg::Eof) => {
                self.finished = true;
                Ok(None)
            }
            Some(RemoteMsg::Fail(failure)) => Err(failure),
            None => Err(LinkFailure::ConnectionReset),
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), LinkFailure> {
        if let Some(failure) = self.write_failure() {
            return Err(failure);
        }
        self.input
            .send(Bytes::copy_from_slice(data))
            .map_err(|_| LinkFailure::BrokenPipe)
    }

    async fn resize(&mut self, size: TerminalSize) -> Result<(), LinkFailure> {
        if let Some(failure) = self.write_failure() {
            return Err(failure);
        }
        self.resizes
            .send(size)
            .map_err(|_| LinkFailure::BrokenPipe)
    }

    async fn close(&mut self) {
        self.output.close();
    }
}
