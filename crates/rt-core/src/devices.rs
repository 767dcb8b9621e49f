//! Device classes
//!
//! A device class tells the agent which CLI dialect the remote end speaks.
//! The registry holds the built-in classes plus any custom ones named in the
//! configuration. It is built from an [`AppConfig`](crate::config::AppConfig)
//! and passed around by reference.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The family of CLI a remote device speaks
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    Linux,
    MikroTik,
    Huawei,
    Cisco,
    /// A user-defined class, kept with its original spelling
    Custom(String),
}

impl DeviceClass {
    /// Built-in classes, in display order
    pub const BUILTIN: [DeviceClass; 4] = [
        DeviceClass::Linux,
        DeviceClass::MikroTik,
        DeviceClass::Huawei,
        DeviceClass::Cisco,
    ];

    pub fn name(&self) -> &str {
        match self {
            DeviceClass::Linux => "Linux",
            DeviceClass::MikroTik => "MikroTik",
            DeviceClass::Huawei => "Huawei",
            DeviceClass::Cisco => "Cisco",
            DeviceClass::Custom(name) => name,
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, DeviceClass::Custom(_))
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty() {
            return Err("device class cannot be empty".to_string());
        }
        let builtin = DeviceClass::BUILTIN
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name));
        Ok(builtin.unwrap_or_else(|| DeviceClass::Custom(name.to_string())))
    }
}

impl Serialize for DeviceClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for DeviceClass {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Known device classes: the built-ins followed by custom ones
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    custom: Vec<String>,
}

impl DeviceRegistry {
    /// Registry with the built-in classes only
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the given custom class names added
    pub fn with_custom<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();
        for name in names {
            registry.ensure(name.as_ref());
        }
        registry
    }

    /// Built-ins in fixed order, then custom classes sorted by name
    pub fn all(&self) -> Vec<DeviceClass> {
        let mut custom = self.custom.clone();
        custom.sort();
        DeviceClass::BUILTIN
            .into_iter()
            .chain(custom.into_iter().map(DeviceClass::Custom))
            .collect()
    }

    pub fn custom(&self) -> &[String] {
        &self.custom
    }

    /// Look up a class by name, case-insensitively
    pub fn get(&self, name: &str) -> Option<DeviceClass> {
        let name = name.trim();
        self.all()
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// Register `name` as a custom class unless it is already known.
    ///
    /// Returns true if the class was added.
    pub fn ensure(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.get(name).is_some() {
            return false;
        }
        tracing::debug!("Registered custom device class {}", name);
        self.custom.push(name.to_string());
        true
    }

    /// CLI guidance for the agent when talking to a device of this class
    pub fn command_hint(&self, class: &DeviceClass) -> String {
        match class {
            DeviceClass::Linux => "You are connected to a Linux system. Use standard Linux \
                commands (bash, systemctl, ip, journalctl, etc.)."
                .to_string(),
            DeviceClass::MikroTik => "You are connected to a MikroTik RouterOS router. Use \
                RouterOS commands (/interface print, /ip address print, /system resource \
                print, etc.)."
                .to_string(),
            DeviceClass::Huawei => "You are connected to a Huawei device. Use the Huawei VRP \
                CLI (display, system-view, etc.)."
                .to_string(),
            DeviceClass::Cisco => "You are connected to a Cisco IOS device. Use the Cisco CLI \
                (show, configure terminal, etc.)."
                .to_string(),
            DeviceClass::Custom(name) => format!(
                "You are connected to a device of type {}. Use commands appropriate for that \
                 system.",
                name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_builtin_ignores_case() {
        assert_eq!("mikrotik".parse::<DeviceClass>().unwrap(), DeviceClass::MikroTik);
        assert_eq!("CISCO".parse::<DeviceClass>().unwrap(), DeviceClass::Cisco);
        assert_eq!(
            "Juniper".parse::<DeviceClass>().unwrap(),
            DeviceClass::Custom("Juniper".to_string())
        );
        assert!("  ".parse::<DeviceClass>().is_err());
    }

    #[test]
    fn test_all_lists_builtins_then_sorted_custom() {
        let registry = DeviceRegistry::with_custom(["Zyxel", "Juniper"]);
        let names: Vec<String> = registry.all().iter().map(|c| c.to_string()).collect();
        assert_eq!(
            names,
            vec!["Linux", "MikroTik", "Huawei", "Cisco", "Juniper", "Zyxel"]
        );
    }

    #[test]
    fn test_ensure_skips_known_names() {
        let mut registry = DeviceRegistry::new();
        assert!(!registry.ensure("linux"));
        assert!(registry.ensure("Juniper"));
        assert!(!registry.ensure("JUNIPER"));
        assert!(!registry.ensure(""));
        assert_eq!(registry.custom(), &["Juniper".to_string()]);
    }

    #[test]
    fn test_command_hint_for_custom_names_the_class() {
        let registry = DeviceRegistry::new();
        let hint = registry.command_hint(&DeviceClass::Custom("Juniper".to_string()));
        assert!(hint.contains("Juniper"));
        assert!(registry
            .command_hint(&DeviceClass::MikroTik)
            .contains("RouterOS"));
    }

    #[test]
    fn test_serde_uses_display_name() {
        let json = serde_json::to_string(&DeviceClass::MikroTik).unwrap();
        assert_eq!(json, "\"MikroTik\"");
        let parsed: DeviceClass = serde_json::from_str("\"huawei\"").unwrap();
        assert_eq!(parsed, DeviceClass::Huawei);
    }
}
