//! Report configuration
//!
//! Defaults reproduce the stock behavior. An optional TOML file overrides
//! any subset of them:
//!
//! ```toml
//! require_visuals = true
//!
//! [generation]
//! model = "gpt-4o-mini"
//! max_retries = 5
//!
//! [compression]
//! size_threshold = 400
//!
//! [sandbox]
//! time_budget_ms = 5000
//! ```

use crate::error::ConfigError;
use autolysis_profile::CompressionPolicy;
use autolysis_sandbox::SandboxConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default chat-completions endpoint
pub const DEFAULT_ENDPOINT: &str = "http://aiproxy.sanand.workers.dev/openai/v1/chat/completions";

/// Default model name
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Environment variable holding the bearer token
pub const DEFAULT_TOKEN_ENV: &str = "AIPROXY_TOKEN";

/// Text service settings (`[generation]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationConfig {
    /// Chat-completions URL
    pub endpoint: String,
    /// Model name sent with every request
    pub model: String,
    /// Environment variable read for the bearer token
    pub token_env: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
    /// Base delay of the exponential backoff in milliseconds
    pub retry_backoff_ms: u64,
    /// Token limit for the question and detail prompts
    pub question_max_tokens: u32,
    /// Token limit for the story prompt
    pub story_max_tokens: u32,
    /// Number of responses kept by the response cache
    pub cache_capacity: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            request_timeout_secs: 120,
            max_retries: 3,
            retry_backoff_ms: 500,
            question_max_tokens: 1000,
            story_max_tokens: 2000,
            cache_capacity: 256,
        }
    }
}

impl GenerationConfig {
    /// Request timeout
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Delay before retry number `attempt` (0-based): `retry_backoff_ms * 2^attempt`
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// Configuration of one report run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    /// Fail the run when the narrative holds no code blocks
    pub require_visuals: bool,
    /// Title recorded in the profiling document
    pub title: String,
    /// Text service settings
    pub generation: GenerationConfig,
    /// Profile compression policy
    pub compression: CompressionPolicy,
    /// Snippet sandbox limits
    pub sandbox: SandboxConfig,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            require_visuals: false,
            title: "Pandas Profiling Report".to_string(),
            generation: GenerationConfig::default(),
            compression: CompressionPolicy::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl ReportConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// Invalid TOML, unknown keys or an invalid compression policy.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// Unreadable file or any [`Self::from_toml_str`] error.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Check values that serde cannot
    ///
    /// # Errors
    /// `Invalid` for an unusable compression policy or empty endpoint/model.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.compression
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.generation.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("generation.endpoint is empty".to_string()));
        }
        if self.generation.model.trim().is_empty() {
            return Err(ConfigError::Invalid("generation.model is empty".to_string()));
        }
        Ok(())
    }

    /// Set the empty-narrative policy
    #[must_use]
    pub fn with_require_visuals(mut self, require: bool) -> Self {
        self.require_visuals = require;
        self
    }

    /// Set the profiling document title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set text service settings
    #[must_use]
    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    /// Set the compression policy
    #[must_use]
    pub fn with_compression(mut self, compression: CompressionPolicy) -> Self {
        self.compression = compression;
        self
    }

    /// Set sandbox limits
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = sandbox;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = ReportConfig::default();
        let text = toml::to_string(&config).unwrap();
        assert_eq!(ReportConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn sections_override_defaults() {
        let config = ReportConfig::from_toml_str(
            "require_visuals = true\n\
             [generation]\nmax_retries = 1\n\
             [compression]\nsize_threshold = 40\n\
             [sandbox]\ntime_budget_ms = 250\n",
        )
        .unwrap();
        assert!(config.require_visuals);
        assert_eq!(config.generation.max_retries, 1);
        assert_eq!(config.generation.model, DEFAULT_MODEL);
        assert_eq!(config.compression.size_threshold, 40);
        assert_eq!(config.sandbox.time_budget(), Duration::from_millis(250));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            ReportConfig::from_toml_str("[generation]\nmodle = \"x\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn invalid_policy_is_rejected() {
        assert!(matches!(
            ReportConfig::from_toml_str("[compression]\nmax_depth = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn backoff_doubles() {
        let generation = GenerationConfig::default();
        assert_eq!(generation.backoff(0), Duration::from_millis(500));
        assert_eq!(generation.backoff(3), Duration::from_millis(4000));
        assert_eq!(generation.backoff(200), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn builders_set_fields() {
        let config = ReportConfig::new().with_require_visuals(true).with_title("Weather");
        assert!(config.require_visuals);
        assert_eq!(config.title, "Weather");
    }
}
