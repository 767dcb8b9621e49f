//! SSH transport built on russh
//!
//! Opens one interactive shell per connection: TCP connect and handshake
//! under the request timeout, then authentication, then a PTY and a shell
//! on a single session channel.

mod channel;
mod handler;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config, Handle, KeyboardInteractiveAuthResponse};
use rt_core::traits::{OpenRequest, Prompter, ShellChannel, ShellTransport};
use rt_core::{ConnectError, Secret};

use channel::RusshChannel;
use handler::ClientHandler;

/// Keepalive interval for shell connections
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound on keyboard-interactive rounds per attempt
const MAX_INTERACTIVE_ROUNDS: usize = 8;

/// [`ShellTransport`] over SSH
#[derive(Clone)]
pub struct RusshTransport {
    config: Arc<Config>,
}

impl std::fmt::Debug for RusshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RusshTransport").finish_non_exhaustive()
    }
}

impl Default for RusshTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RusshTransport {
    pub fn new() -> Self {
        let config = Config {
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            ..Default::default()
        };
        Self {
            config: Arc::new(config),
        }
    }
}

fn unreachable(address: &str, err: impl std::fmt::Display) -> ConnectError {
    ConnectError::Unreachable(format!("{}: {}", address, err))
}

/// Try "none", password, keyboard-interactive, then a prompted password
async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    address: &str,
    username: &str,
    secret: Option<&Secret>,
    prompter: &dyn Prompter,
) -> Result<(), ConnectError> {
    if handle
        .authenticate_none(username)
        .await
        .map_err(|e| unreachable(address, e))?
    {
        tracing::debug!("Authenticated to {} with no credentials", address);
        return Ok(());
    }

    if let Some(secret) = secret {
        if handle
            .authenticate_password(username, secret.expose())
            .await
            .map_err(|e| unreachable(address, e))?
        {
            tracing::debug!("Password accepted by {}", address);
            return Ok(());
        }
        tracing::debug!("Password rejected by {}", address);
    }

    if keyboard_interactive(handle, address, username, secret, prompter).await? {
        tracing::debug!("Keyboard-interactive accepted by {}", address);
        return Ok(());
    }

    if secret.is_none() {
        let text = format!("{}@{}'s password: ", username, address);
        if let Some(password) = prompter.prompt(&text, false).await {
            if handle
                .authenticate_password(username, password)
                .await
                .map_err(|e| unreachable(address, e))?
            {
                return Ok(());
            }
        }
    }

    Err(ConnectError::AuthRejected)
}

/// Run keyboard-interactive rounds.
///
/// The stored secret answers the first hidden prompt; everything else goes
/// to the prompter. A declined prompt ends the attempt.
async fn keyboard_interactive(
    handle: &mut Handle<ClientHandler>,
    address: &str,
    username: &str,
    secret: Option<&Secret>,
    prompter: &dyn Prompter,
) -> Result<bool, ConnectError> {
    let mut stored = secret.map(|s| s.expose().to_string());
    let mut response = handle
        .authenticate_keyboard_interactive_start(username, None::<String>)
        .await
        .map_err(|e| unreachable(address, e))?;

    for _ in 0..MAX_INTERACTIVE_ROUNDS {
        match response {
            KeyboardInteractiveAuthResponse::Success => return Ok(true),
            KeyboardInteractiveAuthResponse::Failure => return Ok(false),
            KeyboardInteractiveAuthResponse::InfoRequest {
                name,
                instructions,
                prompts,
            } => {
                if !name.is_empty() || !instructions.is_empty() {
                    tracing::debug!("{}: {} {}", address, name, instructions);
                }
                let mut answers = Vec::with_capacity(prompts.len());
                for prompt in prompts {
                    let answer = match (prompt.echo, stored.take()) {
                        (false, Some(secret)) => Some(secret),
                        (_, kept) => {
                            stored = kept;
                            prompter.prompt(&prompt.prompt, prompt.echo).await
                        }
                    };
                    match answer {
                        Some(answer) => answers.push(answer),
                        None => return Ok(false),
                    }
                }
                response = handle
                    .authenticate_keyboard_interactive_respond(answers)
                    .await
                    .map_err(|e| unreachable(address, e))?;
            }
        }
    }
    Ok(false)
}

#[async_trait]
impl ShellTransport for RusshTransport {
    async fn open(
        &self,
        request: OpenRequest,
        prompter: Arc<dyn Prompter>,
    ) -> Result<Box<dyn ShellChannel>, ConnectError> {
        let OpenRequest {
            address,
            descriptor,
            timeout,
        } = request;

        tracing::debug!("Opening SSH connection to {}:{}", address, descriptor.port);
        let handler = ClientHandler::new(address.clone());
        let mut handle = tokio::time::timeout(
            timeout,
            client::connect(
                Arc::clone(&self.config),
                (address.as_str(), descriptor.port),
                handler,
            ),
        )
        .await
        .map_err(|_| ConnectError::Timeout(timeout))?
        .map_err(|e| unreachable(&address, e))?;

        let username = match descriptor.username.clone().filter(|u| !u.is_empty()) {
            Some(user) => user,
            None => prompter
                .prompt("login as: ", true)
                .await
                .filter(|u| !u.is_empty())
                .ok_or(ConnectError::AuthRejected)?,
        };
        let secret = descriptor.secret.as_ref().filter(|s| !s.is_empty());

        authenticate(&mut handle, &address, &username, secret, prompter.as_ref()).await?;

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| unreachable(&address, e))?;
        let size = descriptor.size;
        channel
            .request_pty(
                false,
                descriptor.terminal.term_name(),
                u32::from(size.cols),
                u32::from(size.rows),
                0,
                0,
                &[],
            )
            .await
            .map_err(|e| unreachable(&address, e))?;
        channel
            .request_shell(false)
            .await
            .map_err(|e| unreachable(&address, e))?;

        tracing::info!(
            "Shell open on {} as {} ({} {})",
            address,
            username,
            descriptor.terminal.term_name(),
            size
        );
        Ok(Box::new(RusshChannel::new(handle, channel, address)))
    }
}
