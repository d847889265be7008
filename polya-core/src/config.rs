//! Configuration types for Polya sessions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PolyaError, Result};

/// Main configuration for a Polya session
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolyaConfig {
    /// Engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Budgets, caps and stop phrases
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Event channel configuration
    #[serde(default)]
    pub events: EventConfig,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Model resource handed to the engine loader
    pub model_path: PathBuf,

    /// Base URL of a llama.cpp-compatible server
    pub server_url: String,

    /// Maximum tokens the server may predict per completion
    pub n_predict: usize,

    /// Timeout for a single server request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./models/google_gemma-3n-E2B-it-Q4_K_M.gguf"),
            server_url: "http://127.0.0.1:8080".to_string(),
            n_predict: 1024,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Prompt budgets and input caps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Hard cap on assembled prompt length, in characters
    pub max_prompt_chars: usize,

    /// Hard cap on a follow-up message, in characters
    pub max_input_chars: usize,

    /// Total token budget for history windowing
    pub token_budget: usize,

    /// Tokens held back from the budget
    pub token_reserve: usize,

    /// Step cap for one generation run
    pub max_steps: usize,

    /// Phrases that end the conversation when found in a follow-up
    pub stop_phrases: Vec<String>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_prompt_chars: 1855,
            max_input_chars: 500,
            token_budget: 2048,
            token_reserve: 300,
            max_steps: 1000,
            stop_phrases: ["stop", "enough", "thank you", "yes that's enough", "that's fine"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl LimitsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_prompt_chars(mut self, chars: usize) -> Self {
        self.max_prompt_chars = chars;
        self
    }

    pub fn with_max_input_chars(mut self, chars: usize) -> Self {
        self.max_input_chars = chars;
        self
    }

    pub fn with_token_budget(mut self, budget: usize, reserve: usize) -> Self {
        self.token_budget = budget;
        self.token_reserve = reserve;
        self
    }

    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps.max(1);
        self
    }

    pub fn with_stop_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_phrases = phrases.into_iter().map(Into::into).collect();
        self
    }

    /// Budget left for history after the reserve
    pub fn working_budget(&self) -> usize {
        self.token_budget.saturating_sub(self.token_reserve)
    }
}

/// Event channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Publish session events
    pub enabled: bool,

    /// Event buffer size
    pub buffer_size: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: 256,
        }
    }
}

impl PolyaConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. `polya.toml` in the working directory
    /// 3. File named by `POLYA_CONFIG_PATH`
    /// 4. `POLYA_` environment overrides (`POLYA_LIMITS__MAX_STEPS=200`)
    pub fn load() -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(PolyaConfig::default()))
            .merge(Toml::file("polya.toml"));

        if let Ok(path) = std::env::var("POLYA_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: PolyaConfig = figment
            .merge(Env::prefixed("POLYA_").ignore(&["CONFIG_PATH"]).split("__"))
            .extract()
            .map_err(|e| PolyaError::Configuration(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: PolyaConfig = Figment::from(Serialized::defaults(PolyaConfig::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| {
                PolyaError::Configuration(format!("Failed to load configuration file: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let limits = &self.limits;
        if limits.token_reserve >= limits.token_budget {
            return Err(PolyaError::Configuration(format!(
                "token_reserve ({}) must be smaller than token_budget ({})",
                limits.token_reserve, limits.token_budget
            )));
        }
        if limits.max_prompt_chars == 0 || limits.max_input_chars == 0 || limits.max_steps == 0 {
            return Err(PolyaError::Configuration(
                "prompt, input and step caps must be positive".to_string(),
            ));
        }
        if limits.stop_phrases.iter().any(|p| p.trim().is_empty()) {
            return Err(PolyaError::Configuration(
                "stop phrases must not be blank".to_string(),
            ));
        }
        if self.events.buffer_size == 0 {
            return Err(PolyaError::Configuration(
                "events.buffer_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PolyaConfig::default();
        assert_eq!(config.limits.max_prompt_chars, 1855);
        assert_eq!(config.limits.max_input_chars, 500);
        assert_eq!(config.limits.working_budget(), 1748);
        assert_eq!(config.limits.max_steps, 1000);
        assert_eq!(config.limits.stop_phrases.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_limits_builder() {
        let limits = LimitsConfig::new()
            .with_max_prompt_chars(900)
            .with_max_input_chars(100)
            .with_token_budget(512, 64)
            .with_max_steps(0)
            .with_stop_phrases(["halt"]);

        assert_eq!(limits.max_prompt_chars, 900);
        assert_eq!(limits.max_input_chars, 100);
        assert_eq!(limits.working_budget(), 448);
        assert_eq!(limits.max_steps, 1);
        assert_eq!(limits.stop_phrases, vec!["halt".to_string()]);
    }

    #[test]
    fn test_validate_rejects_reserve_over_budget() {
        let config = PolyaConfig {
            limits: LimitsConfig::new().with_token_budget(100, 100),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PolyaError::Configuration(_))));
    }

    #[test]
    fn test_from_file_partial_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[engine]
model_path = "/models/tiny.gguf"
server_url = "http://localhost:9000"
n_predict = 256
request_timeout = "30s"

[limits]
max_prompt_chars = 1200
max_input_chars = 300
token_budget = 1024
token_reserve = 100
max_steps = 50
stop_phrases = ["stop"]
"#
        )
        .unwrap();

        let config = PolyaConfig::from_file(file.path()).unwrap();
        assert_eq!(config.engine.model_path, PathBuf::from("/models/tiny.gguf"));
        assert_eq!(config.engine.request_timeout, Duration::from_secs(30));
        assert_eq!(config.limits.max_steps, 50);
        assert_eq!(config.events.buffer_size, 256);
    }
}
