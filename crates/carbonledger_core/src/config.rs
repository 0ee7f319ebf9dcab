//! Runtime configuration for the certification core.
//!
//! # Responsibility
//! - Describe tunables of the verifier and the classifier adapter.
//! - Load them from JSON with every field defaulted.
//!
//! # Invariants
//! - Missing fields take documented defaults; unknown fields are rejected.
//! - The activity catalog is not configurable at runtime.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_FALLBACK_CONFIDENCE: u8 = 75;
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_MAX_TOKENS: u32 = 300;
const DEFAULT_TEMPERATURE: f32 = 0.1;

/// What the fallback verdict decides when the classifier cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Fallback verdict is valid; the submission is credited.
    #[default]
    Credit,
    /// Fallback verdict is invalid; the submission is rejected.
    Reject,
}

/// Evidence verifier tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifierConfig {
    /// Upper bound for one classifier call.
    pub timeout_ms: u64,
    pub fallback_confidence: u8,
    pub fallback_policy: FallbackPolicy,
}

impl VerifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            fallback_confidence: DEFAULT_FALLBACK_CONFIDENCE,
            fallback_policy: FallbackPolicy::Credit,
        }
    }
}

/// OpenAI-compatible classifier endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub verifier: VerifierConfig,
    pub classifier: ClassifierConfig,
    /// One of `trace|debug|info|warn|error`.
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            verifier: VerifierConfig::default(),
            classifier: ClassifierConfig::default(),
            log_level: crate::logging::default_log_level().to_string(),
        }
    }
}

impl CoreConfig {
    /// Parses a JSON configuration document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.verifier.timeout_ms == 0 {
            return Err(ConfigError::Invalid("verifier.timeout_ms must be positive"));
        }
        if self.verifier.fallback_confidence > 100 {
            return Err(ConfigError::Invalid(
                "verifier.fallback_confidence must be within 0..=100",
            ));
        }
        if self.classifier.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("classifier.base_url must not be empty"));
        }
        if self.classifier.model.trim().is_empty() {
            return Err(ConfigError::Invalid("classifier.model must not be empty"));
        }
        Ok(())
    }
}

/// Configuration load failure.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid configuration document: {err}"),
            Self::Invalid(message) => write!(f, "invalid configuration value: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}
