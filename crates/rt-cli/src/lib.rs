//! relay-terminal: Command-line interface for relay-terminal
//!
//! Provides the `relay` binary: interactive shells on saved hosts, one-shot
//! agent requests, and host, vault and config management.

pub mod commands;
pub mod keys;
pub mod output;
pub mod prompter;
pub mod setup;
