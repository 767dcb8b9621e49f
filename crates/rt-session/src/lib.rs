//! rt-session: Channel session engine for relay-terminal
//!
//! A [`ChannelSession`] owns one remote shell. Once connected, a single I/O
//! task reads the channel and republishes every chunk, in arrival order, to
//! all subscribed sinks; writes, resizes and subscriptions reach it through
//! one command queue. Cheap [`SessionHandle`] clones give other tasks (the
//! terminal driver, an agent run, the CLI) access to the live channel.
//!
//! # Disconnects
//!
//! A manual disconnect cancels the I/O task's shutdown token before anything
//! else happens, so a read error racing with it is still classified as
//! manual. Unexpected disconnects keep the descriptor for a later
//! [`ChannelSession::reconnect`] and are announced on the notice channel;
//! manual ones clear it and stay silent.

mod capture;
mod events;
mod handle;
mod io;
pub mod knock;
pub mod memory;
mod session;
pub mod ssh;
mod terminal;

pub use capture::{CaptureEnd, CapturedOutput};
pub use events::{OutputEvent, SessionNotice};
pub use handle::{AgentLease, PendingCapture, SessionHandle, SessionStatus};
pub use memory::{AddressBehavior, MemoryTransport, RemoteEnd};
pub use session::{ChannelSession, Ready};
pub use ssh::RusshTransport;
pub use terminal::TerminalDriver;

/// Capacity of the session notice broadcast channel
pub const NOTICE_CHANNEL_CAPACITY: usize = 64;
