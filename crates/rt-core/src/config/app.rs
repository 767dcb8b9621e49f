//! Top-level application configuration

use serde::{Deserialize, Serialize};

use super::{AgentSettings, HostProfile, SessionSettings};
use crate::devices::DeviceRegistry;
use crate::error::ConfigError;

/// Everything read from `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Custom device class names on top of the built-ins
    pub device_types: Vec<String>,

    pub agent: AgentSettings,

    pub session: SessionSettings,

    /// Saved hosts
    pub hosts: Vec<HostProfile>,
}

impl AppConfig {
    /// Find a host by name, case-insensitively
    pub fn host(&self, name: &str) -> Result<&HostProfile, ConfigError> {
        let wanted = name.trim();
        self.hosts
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::UnknownHost(wanted.to_string()))
    }

    /// Device registry with the custom classes from this config, including
    /// any named only on a host
    pub fn device_registry(&self) -> DeviceRegistry {
        let mut registry = DeviceRegistry::with_custom(&self.device_types);
        for class in self.hosts.iter().filter_map(|h| h.device_type.as_ref()) {
            registry.ensure(class.name());
        }
        registry
    }

    /// Reject configurations the engine cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for host in &self.hosts {
            if host.name.trim().is_empty() {
                return Err(ConfigError::Invalid("Host with empty name".to_string()));
            }
            if !seen.insert(host.name.to_ascii_lowercase()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate host name '{}'",
                    host.name
                )));
            }
        }
        if self.session.idle_window.is_zero() {
            return Err(ConfigError::Invalid(
                "session.idle_window must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::DeviceClass;

    const SAMPLE: &str = r#"
device_types = ["Juniper"]

[agent]
model = "anthropic/claude-sonnet-4"
max_iterations = 6

[session]
idle_window = 250

[[hosts]]
name = "Edge-Router"
addresses = ["192.168.88.1", "10.8.0.1"]
username = "admin"
device_type = "mikrotik"
disable_terminal_detection = true
knock = [{ port = 7000 }, { protocol = "udp", port = 8000 }]

[[hosts]]
name = "bastion"
addresses = ["bastion.example.net"]
device_type = "OpenBSD"
"#;

    #[test]
    fn test_parse_sample() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.agent.max_iterations, 6);
        assert_eq!(config.agent.api_key_env, "OPENROUTER_API_KEY");
        assert_eq!(config.hosts.len(), 2);
        let edge = config.host("edge-router").unwrap();
        assert_eq!(edge.port, 22);
        assert_eq!(edge.device_type, Some(DeviceClass::MikroTik));
        assert_eq!(edge.knock.len(), 2);
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_host() {
        let config = AppConfig::default();
        assert!(matches!(
            config.host("nope"),
            Err(ConfigError::UnknownHost(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_registry_includes_host_classes() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        let registry = config.device_registry();
        assert!(registry.get("juniper").is_some());
        assert!(registry.get("openbsd").is_some());
    }

    #[test]
    fn test_duplicate_host_names_rejected() {
        let mut config = AppConfig::default();
        config.hosts.push(HostProfile::new("a", ["1.1.1.1"]));
        config.hosts.push(HostProfile::new("A", ["2.2.2.2"]));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
