//! Agent loop settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};

/// Upper bound accepted for `max_iterations`
pub const MAX_ITERATION_CEILING: u32 = 100;

/// Settings for the reasoning service and the agent loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Model identifier sent with every request
    pub model: String,

    /// Base URL of the OpenAI-compatible API
    pub api_base: String,

    /// API key stored in the config file, if any
    pub api_key: Option<String>,

    /// Environment variable consulted when `api_key` is unset
    pub api_key_env: String,

    /// Hard cap on reasoning calls per run
    pub max_iterations: u32,

    /// Extra instructions prepended to the system prompt
    pub system_prompt: Option<String>,

    /// Network timeout for one reasoning call
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// Look up cost by call id when a response carries none
    pub cost_lookup: bool,

    /// How long to wait for outstanding cost lookups before archiving a run
    #[serde(with = "duration_millis")]
    pub cost_grace: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: "google/gemini-2.5-flash".to_string(),
            api_base: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            max_iterations: 10,
            system_prompt: None,
            request_timeout: Duration::from_secs(60),
            cost_lookup: true,
            cost_grace: Duration::from_millis(2000),
        }
    }
}

impl AgentSettings {
    /// The configured cap clamped to `1..=MAX_ITERATION_CEILING`
    pub fn iteration_cap(&self) -> u32 {
        self.max_iterations.clamp(1, MAX_ITERATION_CEILING)
    }

    /// The API key from the config file or, failing that, the environment
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }

    /// The custom prompt, ignoring blank values
    pub fn custom_prompt(&self) -> Option<&str> {
        self.system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_cap_is_clamped() {
        let mut settings = AgentSettings::default();
        assert_eq!(settings.iteration_cap(), 10);
        settings.max_iterations = 0;
        assert_eq!(settings.iteration_cap(), 1);
        settings.max_iterations = 5000;
        assert_eq!(settings.iteration_cap(), MAX_ITERATION_CEILING);
    }

    #[test]
    fn test_config_key_wins_over_env() {
        let settings = AgentSettings {
            api_key: Some("sk-file".to_string()),
            api_key_env: "RT_TEST_UNSET_VARIABLE".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.resolve_api_key().as_deref(), Some("sk-file"));

        let blank = AgentSettings {
            api_key: Some("  ".to_string()),
            api_key_env: "RT_TEST_UNSET_VARIABLE".to_string(),
            ..Default::default()
        };
        assert_eq!(blank.resolve_api_key(), None);
    }

    #[test]
    fn test_blank_custom_prompt_is_ignored() {
        let settings = AgentSettings {
            system_prompt: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.custom_prompt(), None);
    }
}
