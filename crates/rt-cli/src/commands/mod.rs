//! CLI command implementations

mod ask;
mod config;
mod connect;
mod hosts;
mod vault;

pub use ask::{ask_command, AskOptions};
pub use config::{config_init, config_path, config_show};
pub use connect::connect_command;
pub use hosts::hosts_command;
pub use vault::{vault_init, vault_lock, vault_seal, vault_status, vault_unlock};
