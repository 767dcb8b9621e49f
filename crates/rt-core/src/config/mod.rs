//! Configuration management for relay-terminal

mod agent;
mod app;
mod host;
mod session;
pub mod serde_utils;

pub use agent::AgentSettings;
pub use app::AppConfig;
pub use host::{HostProfile, KnockProtocol, KnockStep};
pub use session::SessionSettings;

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// `relay-terminal` under the platform config directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("relay-terminal")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Parse the TOML file at `path`.
///
/// A missing file is [`ConfigError::NotFound`] so callers can fall back to
/// defaults; any other read failure is `Invalid`.
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound(path.to_path_buf()))
        }
        Err(e) => {
            return Err(ConfigError::Invalid(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };
    Ok(toml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = load_config::<AppConfig>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(p) if p == path));
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent]\nmax_iterations = 4\n").unwrap();

        let loaded: AppConfig = load_config(&path).unwrap();
        assert_eq!(loaded.agent.max_iterations, 4);
        assert_eq!(loaded.session, SessionSettings::default());
    }

    #[test]
    fn test_load_bad_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent\n").unwrap();
        assert!(matches!(
            load_config::<AppConfig>(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_default_path_ends_with_app_dir() {
        let path = default_config_path();
        assert!(path.ends_with("relay-terminal/config.toml"));
    }
}
