//! Shared command setup: configuration, vault and host resolution

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rt_core::config::{self, AppConfig, HostProfile};
use rt_core::vault::{Vault, VaultSession};
use rt_core::{ConfigError, ConnectionDescriptor, Secret, VaultError};
use rt_session::{ChannelSession, RusshTransport};

use crate::prompter::{read_line, TerminalPrompter};

/// Paths selected on the command line
#[derive(Debug, Clone, Default)]
pub struct Paths {
    pub config: Option<PathBuf>,
    pub vault_dir: Option<PathBuf>,
}

impl Paths {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(config::default_config_path)
    }

    pub fn vault(&self) -> Vault {
        Vault::new(self.vault_dir.clone().unwrap_or_else(Vault::default_dir))
    }
}

/// Load and validate the config file.
///
/// A missing default file yields the built-in defaults; a missing file that
/// was named explicitly is an error.
pub fn load_app_config(paths: &Paths) -> Result<AppConfig> {
    let path = paths.config_path();
    let config = match config::load_config::<AppConfig>(&path) {
        Ok(config) => config,
        Err(ConfigError::NotFound(_)) if paths.config.is_none() => {
            tracing::info!("No config at {:?}, using defaults", path);
            AppConfig::default()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to load config from {:?}", path))
        }
    };
    config
        .validate()
        .with_context(|| format!("Invalid config in {:?}", path))?;
    Ok(config)
}

/// Open the vault, asking for the passphrase when there is no cached key
pub fn open_vault(vault: &Vault) -> Result<VaultSession> {
    match vault.resume() {
        Ok(session) => Ok(session),
        Err(VaultError::Locked) => {
            let passphrase = read_line("Vault passphrase: ", false)?
                .ok_or_else(|| anyhow::anyhow!("Vault unlock cancelled"))?;
            vault.unlock(&passphrase).context("Failed to unlock vault")
        }
        Err(VaultError::NotInitialized) => {
            anyhow::bail!("Vault is not initialized; run 'relay vault init' first")
        }
        Err(e) => Err(e).context("Failed to open vault"),
    }
}

/// Unseal the stored password of `profile`, if it has one
pub fn unseal_password(profile: &HostProfile, vault: &Vault) -> Result<Option<Secret>> {
    let Some(sealed) = profile.password.as_deref().filter(|p| !p.trim().is_empty()) else {
        return Ok(None);
    };
    let session = open_vault(vault)?;
    let secret = session
        .open_str(sealed)
        .with_context(|| format!("Failed to unseal the password of '{}'", profile.name))?;
    Ok(Some(secret))
}

/// A saved host ready to connect
pub struct Target {
    pub profile: HostProfile,
    pub descriptor: ConnectionDescriptor,
}

/// Resolve `name` to a host profile and its connection descriptor
pub fn resolve_target(config: &AppConfig, paths: &Paths, name: &str) -> Result<Target> {
    let profile = config.host(name)?.clone();
    let secret = unseal_password(&profile, &paths.vault())?;
    let descriptor = profile.descriptor(&config.session, secret)?;
    Ok(Target {
        profile,
        descriptor,
    })
}

/// A session over SSH that asks for missing credentials on the terminal
pub fn ssh_session(config: &AppConfig, profile: &HostProfile) -> ChannelSession {
    let mut session = ChannelSession::new(Arc::new(RusshTransport::new()), config.session.clone())
        .with_knock(profile.knock.clone());
    session.set_prompter(Arc::new(TerminalPrompter));
    session
}

/// Write `contents` to `path`, creating parent directories
pub fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    std::fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths {
            config: Some(dir.path().join("absent.toml")),
            vault_dir: None,
        };
        assert!(load_app_config(&paths).is_err());
    }

    #[test]
    fn test_host_without_password_needs_no_vault() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            "[[hosts]]\nname = \"lab\"\naddresses = [\"10.0.0.5\"]\nusername = \"root\"\n",
        )
        .unwrap();
        let paths = Paths {
            config: Some(config_path),
            vault_dir: Some(dir.path().join("vault")),
        };

        let config = load_app_config(&paths).unwrap();
        let target = resolve_target(&config, &paths, "LAB").unwrap();
        assert_eq!(target.profile.name, "lab");
        assert_eq!(target.descriptor.addresses, vec!["10.0.0.5".to_string()]);
        assert!(target.descriptor.secret.is_none());
    }

    #[test]
    fn test_sealed_password_is_unsealed_from_cached_session() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::new(dir.path()).with_iterations(1_000);
        let session = vault.initialize(Some("master")).unwrap();
        let mut profile = HostProfile::new("lab", ["10.0.0.5"]);
        profile.password = Some(session.seal("hunter2").unwrap().to_string());

        let secret = unseal_password(&profile, &vault).unwrap().unwrap();
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_unknown_host_is_reported() {
        let config = AppConfig::default();
        let err = resolve_target(&config, &Paths::default(), "nowhere")
            .err()
            .unwrap();
        assert!(err.to_string().contains("nowhere"));
    }
}
