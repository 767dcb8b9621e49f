//! Core trait definitions

mod prompt;
mod transport;

pub use prompt::{NoPrompter, Prompter, ScriptedPrompter};
pub use transport::{OpenRequest, ShellChannel, ShellTransport};
