//! Reader configuration.
//!
//! Loaded from an optional YAML file, then overridden by `WEBREADER_*`
//! environment variables. Thresholds live here instead of as constants so
//! tests and deployments can tune them.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ReaderError, ReaderResult};

/// Intent classifier backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the Ollama-compatible endpoint.
    pub endpoint: String,
    /// Model name passed on every generate call.
    pub model: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Top-level configuration for a reader session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Minimum classification confidence when no page context is known.
    pub base_confidence_threshold: f64,
    /// Minimum classification confidence once page context is available.
    pub contextual_confidence_threshold: f64,
    /// Minimum confidence for accepting an `alternative` recovery strategy.
    pub alternative_confidence_threshold: f64,
    /// Failures tolerated before escalating to reflection.
    pub max_attempts_before_reflection: u32,
    /// Execution history records retained for diagnosis.
    pub history_cap: usize,
    /// Upper bound on page navigation, in milliseconds.
    pub navigation_timeout_ms: u64,
    /// Minimum text length for a heading to qualify as a headline.
    pub headline_min_chars: usize,
    /// Maximum headlines returned by one listing.
    pub headline_limit: usize,
    pub llm: LlmConfig,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            base_confidence_threshold: 0.7,
            contextual_confidence_threshold: 0.6,
            alternative_confidence_threshold: 0.7,
            max_attempts_before_reflection: 1,
            history_cap: 50,
            navigation_timeout_ms: 8_000,
            headline_min_chars: 20,
            headline_limit: 15,
            llm: LlmConfig::default(),
        }
    }
}

impl ReaderConfig {
    /// Load from a YAML file if one is given, then apply env overrides.
    pub fn load(path: Option<&Path>) -> ReaderResult<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p).map_err(|e| {
                    ReaderError::Config(format!("cannot read {}: {e}", p.display()))
                })?;
                serde_yaml::from_str(&raw)
                    .map_err(|e| ReaderError::Config(format!("invalid config: {e}")))?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Environment overrides take precedence over the file.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("WEBREADER_LLM_ENDPOINT") {
            self.llm.endpoint = v;
        }
        if let Ok(v) = std::env::var("WEBREADER_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("WEBREADER_CONFIDENCE_THRESHOLD") {
            if let Ok(parsed) = v.parse() {
                self.base_confidence_threshold = parsed;
            }
        }
        if let Ok(v) = std::env::var("WEBREADER_NAVIGATION_TIMEOUT_MS") {
            if let Ok(parsed) = v.parse() {
                self.navigation_timeout_ms = parsed;
            }
        }
    }

    fn validate(&self) -> ReaderResult<()> {
        for (name, value) in [
            ("base_confidence_threshold", self.base_confidence_threshold),
            (
                "contextual_confidence_threshold",
                self.contextual_confidence_threshold,
            ),
            (
                "alternative_confidence_threshold",
                self.alternative_confidence_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ReaderError::Config(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if self.history_cap == 0 {
            return Err(ReaderError::Config("history_cap must be positive".into()));
        }
        Ok(())
    }

    /// Active classification threshold given whether page context is known.
    pub fn confidence_threshold(&self, has_page_context: bool) -> f64 {
        if has_page_context {
            self.contextual_confidence_threshold
        } else {
            self.base_confidence_threshold
        }
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ReaderConfig::default();
        assert_eq!(config.base_confidence_threshold, 0.7);
        assert_eq!(config.contextual_confidence_threshold, 0.6);
        assert_eq!(config.history_cap, 50);
        assert_eq!(config.max_attempts_before_reflection, 1);
    }

    #[test]
    fn threshold_drops_with_page_context() {
        let config = ReaderConfig::default();
        assert!(config.confidence_threshold(true) < config.confidence_threshold(false));
    }

    #[test]
    fn yaml_roundtrip() {
        let config = ReaderConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: ReaderConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.history_cap, config.history_cap);
        assert_eq!(back.llm.model, config.llm.model);
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let config: ReaderConfig = serde_yaml::from_str("history_cap: 10").unwrap();
        assert_eq!(config.history_cap, 10);
        assert_eq!(config.base_confidence_threshold, 0.7);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = ReaderConfig::default();
        config.base_confidence_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
