//! Host profile configuration

use serde::{Deserialize, Serialize};

use super::SessionSettings;
use crate::devices::DeviceClass;
use crate::error::ConfigError;
use crate::types::{ConnectionDescriptor, Secret, TerminalKind};

/// Username suffix that turns off MikroTik terminal capability detection
const NO_DETECTION_SUFFIX: &str = "+ct";

/// A saved remote host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostProfile {
    /// Human-readable name, unique within the config
    pub name: String,

    /// Addresses to try in order
    #[serde(default)]
    pub addresses: Vec<String>,

    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login name; prompted for when absent
    #[serde(default)]
    pub username: Option<String>,

    /// Password sealed by the vault (`v1:...`)
    #[serde(default)]
    pub password: Option<String>,

    /// Terminal type; falls back to the session default
    #[serde(default)]
    pub terminal: Option<TerminalKind>,

    #[serde(default)]
    pub device_type: Option<DeviceClass>,

    #[serde(default)]
    pub manufacturer: Option<String>,

    #[serde(default)]
    pub os_version: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub functions: Vec<String>,

    #[serde(default)]
    pub groups: Vec<String>,

    #[serde(default)]
    pub notes: Option<String>,

    /// Log in with the `+ct` suffix so RouterOS skips its terminal probes
    #[serde(default)]
    pub disable_terminal_detection: bool,

    /// Ports to knock before connecting
    #[serde(default)]
    pub knock: Vec<KnockStep>,
}

fn default_port() -> u16 {
    22
}

/// Protocol used for one knock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnockProtocol {
    #[default]
    Tcp,
    Udp,
}

/// One step of a port-knocking sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnockStep {
    #[serde(default)]
    pub protocol: KnockProtocol,
    pub port: u16,
}

impl HostProfile {
    /// Create a profile with a name and one or more addresses
    pub fn new<I, S>(name: impl Into<String>, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            addresses: addresses.into_iter().map(Into::into).collect(),
            port: default_port(),
            ..Default::default()
        }
    }

    /// The primary (first) address
    pub fn primary_address(&self) -> Option<&str> {
        self.addresses.first().map(String::as_str)
    }

    /// Check if the host has a specific tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// The login name actually sent, with `+ct` appended when terminal
    /// detection is disabled and the name carries no suffix yet
    pub fn effective_username(&self) -> Option<String> {
        let name = self.username.as_deref().map(str::trim).filter(|n| !n.is_empty())?;
        if self.disable_terminal_detection && !name.contains('+') {
            Some(format!("{}{}", name, NO_DETECTION_SUFFIX))
        } else {
            Some(name.to_string())
        }
    }

    /// Build a connection descriptor for this host.
    ///
    /// `secret` is the already unsealed password, if any.
    pub fn descriptor(
        &self,
        settings: &SessionSettings,
        secret: Option<Secret>,
    ) -> Result<ConnectionDescriptor, ConfigError> {
        let addresses: Vec<String> = self
            .addresses
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        if addresses.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "Host '{}' has no addresses",
                self.name
            )));
        }

        let mut descriptor = ConnectionDescriptor::new(addresses, self.port)
            .with_terminal(self.terminal.unwrap_or(settings.terminal))
            .with_size(settings.size());
        descriptor.username = self.effective_username();
        descriptor.secret = secret;
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_username_appends_suffix_once() {
        let mut host = HostProfile::new("edge", ["192.168.88.1"]);
        host.username = Some("admin".to_string());
        assert_eq!(host.effective_username().as_deref(), Some("admin"));

        host.disable_terminal_detection = true;
        assert_eq!(host.effective_username().as_deref(), Some("admin+ct"));

        host.username = Some("admin+cte".to_string());
        assert_eq!(host.effective_username().as_deref(), Some("admin+cte"));

        host.username = Some(String::new());
        assert_eq!(host.effective_username(), None);
    }

    #[test]
    fn test_descriptor_uses_host_terminal_and_settings_size() {
        let mut host = HostProfile::new("core", ["10.0.0.1", " ", "10.0.0.2"]);
        host.port = 2222;
        host.terminal = Some(TerminalKind::Vt100);
        let settings = SessionSettings {
            cols: 132,
            rows: 40,
            ..Default::default()
        };

        let descriptor = host.descriptor(&settings, Some(Secret::new("pw"))).unwrap();
        assert_eq!(descriptor.addresses, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(descriptor.port, 2222);
        assert_eq!(descriptor.terminal, TerminalKind::Vt100);
        assert_eq!(descriptor.size.cols, 132);
        assert_eq!(descriptor.secret.as_ref().map(Secret::expose), Some("pw"));
    }

    #[test]
    fn test_descriptor_without_addresses_is_invalid() {
        let host = HostProfile::new("empty", Vec::<String>::new());
        let err = host.descriptor(&SessionSettings::default(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_knock_protocol_defaults_to_tcp() {
        let step: KnockStep = toml::from_str("port = 7000").unwrap();
        assert_eq!(step.protocol, KnockProtocol::Tcp);
        let step: KnockStep = toml::from_str("protocol = \"udp\"\nport = 7001").unwrap();
        assert_eq!(step.protocol, KnockProtocol::Udp);
    }
}
