//! SSH client callbacks

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;

/// Client handler for interactive shell connections.
///
/// Channel traffic is left to the default callbacks, which forward it to
/// the channel's own message queue.
pub(crate) struct ClientHandler {
    address: String,
}

impl ClientHandler {
    pub(crate) fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    /// Host keys are accepted and logged by fingerprint
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::info!(
            "Host key for {}: {} {}",
            self.address,
            server_public_key.name(),
            server_public_key.fingerprint()
        );
        Ok(true)
    }
}
