//! System instructions

use rt_core::config::HostProfile;
use rt_core::{DeviceClass, DeviceRegistry};

/// Operator instructions shared by every run
pub const BASE_PROMPT: &str = "You are an expert in system, network and server administration, \
with hands-on experience of MikroTik RouterOS, Cisco IOS, Huawei VRP and Linux.

Your goal is to help the user diagnose and solve problems by running commands in the \
connected remote terminal.

Rules:
1. Always read a command's output before deciding on the next step.
2. Keep answers concise.
3. Explain what you found after each command.
4. If something goes wrong, explain the problem and suggest a fix.
5. Warn the user before potentially destructive commands (rm, format, reset, reboot).

You have the run_command tool to run commands in the connected terminal. Command output \
is collected until the terminal goes quiet, so it may include the echoed command, the \
shell prompt, or be cut short for long-running commands.";

/// What the agent is told about the remote host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentContext {
    pub host: Option<String>,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub device_class: Option<DeviceClass>,
    pub manufacturer: Option<String>,
    pub os_version: Option<String>,
    pub functions: Vec<String>,
    pub groups: Vec<String>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
}

impl AgentContext {
    /// Identification for a saved host reached at `address`
    pub fn from_profile(profile: &HostProfile, address: Option<&str>) -> Self {
        Self {
            host: Some(profile.name.clone()),
            address: address
                .map(str::to_string)
                .or_else(|| profile.primary_address().map(str::to_string)),
            port: Some(profile.port),
            username: profile.effective_username(),
            device_class: profile.device_type.clone(),
            manufacturer: profile.manufacturer.clone(),
            os_version: profile.os_version.clone(),
            functions: profile.functions.clone(),
            groups: profile.groups.clone(),
            tags: profile.tags.clone(),
            notes: profile.notes.clone(),
        }
    }

    /// `- key: value` lines for every known field
    pub fn identification(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut push = |key: &str, value: Option<String>| {
            if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                lines.push(format!("- {}: {}", key, value));
            }
        };
        let join = |items: &[String]| (!items.is_empty()).then(|| items.join(", "));

        push("Host", self.host.clone());
        push("Address", self.address.clone());
        push("Port", self.port.map(|p| p.to_string()));
        push("Username", self.username.clone());
        push("Device type", self.device_class.as_ref().map(|c| c.name().to_string()));
        push("Manufacturer", self.manufacturer.clone());
        push("System/version", self.os_version.clone());
        push("Functions", join(&self.functions));
        push("Groups", join(&self.groups));
        push("Tags", join(&self.tags));
        push("Notes", self.notes.clone());
        lines
    }
}

/// Assemble the system message.
///
/// A custom prompt goes first; it never replaces the operator rules, the
/// device hint or the identification block. The identification block is
/// always present, down to `- Host: unknown` for an empty context.
pub fn system_prompt(
    custom: Option<&str>,
    registry: &DeviceRegistry,
    context: &AgentContext,
) -> String {
    let mut prompt = String::new();
    if let Some(custom) = custom.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str(custom);
        prompt.push_str("\n\n");
    }
    prompt.push_str(BASE_PROMPT);

    if let Some(class) = &context.device_class {
        prompt.push_str("\n\n");
        prompt.push_str(&registry.command_hint(class));
    }

    let mut identification = context.identification();
    if identification.is_empty() {
        identification.push("- Host: unknown".to_string());
    }
    prompt.push_str("\n\nAbout the connected device:\n");
    prompt.push_str(&identification.join("\n"));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> AgentContext {
        AgentContext {
            host: Some("edge-router".into()),
            address: Some("10.0.0.1".into()),
            port: Some(22),
            device_class: Some(DeviceClass::MikroTik),
            tags: vec!["core".into(), "pop-1".into()],
            notes: Some("Uplink on ether1".into()),
            ..AgentContext::default()
        }
    }

    #[test]
    fn test_prompt_sections_in_order() {
        let prompt = system_prompt(Some("Answer in Portuguese."), &DeviceRegistry::new(), &context());

        let custom = prompt.find("Answer in Portuguese.").unwrap();
        let base = prompt.find("You are an expert").unwrap();
        let hint = prompt.find("RouterOS commands").unwrap();
        let ident = prompt.find("About the connected device:").unwrap();
        assert!(custom < base && base < hint && hint < ident);
        assert!(prompt.contains("- Address: 10.0.0.1"));
        assert!(prompt.contains("- Tags: core, pop-1"));
        assert!(prompt.contains("- Notes: Uplink on ether1"));
    }

    #[test]
    fn test_blank_custom_prompt_is_ignored() {
        let prompt = system_prompt(Some("   "), &DeviceRegistry::new(), &context());
        assert!(prompt.starts_with(BASE_PROMPT));
    }

    #[test]
    fn test_identification_present_without_host_details() {
        let prompt = system_prompt(None, &DeviceRegistry::new(), &AgentContext::default());
        assert!(prompt.starts_with(BASE_PROMPT));
        assert!(prompt.ends_with("About the connected device:\n- Host: unknown"));
    }

    #[test]
    fn test_from_profile() {
        let mut profile = HostProfile::new("lab", ["192.168.88.1", "10.8.0.2"]);
        profile.username = Some("admin".into());
        profile.disable_terminal_detection = true;
        let ctx = AgentContext::from_profile(&profile, Some("10.8.0.2"));
        assert_eq!(ctx.address.as_deref(), Some("10.8.0.2"));
        assert_eq!(ctx.username.as_deref(), Some("admin+ct"));
    }
}
