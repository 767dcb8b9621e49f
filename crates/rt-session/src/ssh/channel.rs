//! A russh session channel as a [`ShellChannel`]

use async_trait::async_trait;
use bytes::Bytes;
use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use rt_core::traits::ShellChannel;
use rt_core::{LinkFailure, TerminalSize};

use super::handler::ClientHandler;

pub(crate) fn link_failure(err: russh::Error) -> LinkFailure {
    match err {
        russh::Error::IO(e) => LinkFailure::from_io(&e),
        other => LinkFailure::Other(other.to_string()),
    }
}

pub(crate) struct RusshChannel {
    handle: Handle<ClientHandler>,
    channel: Channel<Msg>,
    address: String,
}

impl RusshChannel {
    pub(crate) fn new(handle: Handle<ClientHandler>, channel: Channel<Msg>, address: String) -> Self {
        Self {
            handle,
            channel,
            address,
        }
    }
}

#[async_trait]
impl ShellChannel for RusshChannel {
    async fn read(&mut self) -> Result<Option<Bytes>, LinkFailure> {
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => return Ok(Some(Bytes::copy_from_slice(&data))),
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    return Ok(Some(Bytes::copy_from_slice(&data)))
                }
                Some(ChannelMsg::Eof) => return Ok(None),
                Some(ChannelMsg::Close) | None => return Err(LinkFailure::ChannelClosed),
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    tracing::debug!("Shell on {} exited with {}", self.address, exit_status);
                }
                Some(other) => {
                    tracing::trace!("Ignoring channel message {:?}", other);
                }
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), LinkFailure> {
        self.channel.data(data).await.map_err(link_failure)
    }

    async fn resize(&mut self, size: TerminalSize) -> Result<(), LinkFailure> {
        self.channel
            .window_change(u32::from(size.cols), u32::from(size.rows), 0, 0)
            .await
            .map_err(link_failure)
    }

    async fn close(&mut self) {
        let _ = self.channel.eof().await;
        let _ = self.channel.close().await;
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "closing", "en")
            .await
        {
            tracing::debug!("Disconnect from {} failed: {}", self.address, e);
        }
    }
}
