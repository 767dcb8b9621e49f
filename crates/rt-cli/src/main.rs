//! relay CLI
//!
//! Single binary for all relay-terminal operations:
//! - Interactive shells on saved hosts (connect)
//! - One-shot agent requests (ask)
//! - Host listing, vault and config management

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_terminal::commands::{self, AskOptions};
use relay_terminal::setup::Paths;

#[derive(Parser)]
#[command(name = "relay")]
#[command(author, version, about = "SSH terminal with an AI agent for saved hosts")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Vault directory
    #[arg(long, global = true, env = "RELAY_VAULT_DIR")]
    vault_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an interactive shell on a saved host
    Connect {
        /// Host name from the config file
        host: String,
    },

    /// Let the agent work on a request against a saved host
    Ask {
        /// Host name from the config file
        host: String,
        /// What the agent should do
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
        /// Model to use instead of the configured one
        #[arg(short, long)]
        model: Option<String>,
        /// Reasoning calls allowed for this request
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Print the remote screen when the run ends
        #[arg(long)]
        show_screen: bool,
    },

    /// List saved hosts
    Hosts {
        /// Only hosts with this tag (repeatable)
        #[arg(short, long)]
        tag: Vec<String>,
        /// Show detailed information
        #[arg(short, long)]
        long: bool,
    },

    /// Manage the credential vault
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum VaultAction {
    /// Create the vault
    Init {
        /// Use a random key kept only in the session cache
        #[arg(long)]
        no_passphrase: bool,
        /// Replace an existing vault
        #[arg(short, long)]
        force: bool,
    },
    /// Enter the passphrase and cache the key
    Unlock,
    /// Forget the cached key
    Lock,
    /// Seal a password for a host profile
    Seal,
    /// Show whether the vault exists and is unlocked
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let paths = Paths {
        config: cli.config,
        vault_dir: cli.vault_dir,
    };

    match cli.command {
        Commands::Connect { host } => {
            commands::connect_command(&paths, &host).await?;
        }

        Commands::Ask {
            host,
            message,
            model,
            max_iterations,
            show_screen,
        } => {
            let options = AskOptions {
                model,
                max_iterations,
                show_screen,
            };
            commands::ask_command(&paths, &host, &message.join(" "), options).await?;
        }

        Commands::Hosts { tag, long } => {
            commands::hosts_command(&paths, &tag, long)?;
        }

        Commands::Vault { action } => {
            let vault = paths.vault();
            match action {
                VaultAction::Init {
                    no_passphrase,
                    force,
                } => commands::vault_init(&vault, no_passphrase, force)?,
                VaultAction::Unlock => commands::vault_unlock(&vault)?,
                VaultAction::Lock => commands::vault_lock(&vault)?,
                VaultAction::Seal => commands::vault_seal(&vault)?,
                VaultAction::Status => commands::vault_status(&vault)?,
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(&paths)?,
            ConfigAction::Init { force } => commands::config_init(&paths, force)?,
            ConfigAction::Path => commands::config_path(&paths)?,
        },
    }

    Ok(())
}
