//! Upstream AI provider configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Upstream provider configuration
///
/// A missing API key is not a load-time error: the relay reports it per
/// request as a stream-framed error so streaming-only clients get a clean
/// signal.
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    /// OpenAI-compatible API key
    pub api_key: Option<String>,

    /// Model to request upstream
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL for the upstream API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upstream request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl AiConfig {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check if an API key is configured
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_ref().is_some_and(|k| !k.is_empty())
    }

    /// Validate AI configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_secs == 0 || self.timeout_secs > 600 {
            return Err(ValidationError::InvalidTimeout);
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ValidationError::InvalidBaseUrl);
        }
        if self.model.is_empty() {
            return Err(ValidationError::EmptyModel);
        }
        Ok(())
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_model() -> String {
    "gpt-5-mini".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_without_key() {
        let config = AiConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.has_api_key());
    }

    #[test]
    fn empty_key_counts_as_missing() {
        let config = AiConfig {
            api_key: Some(String::new()),
            ..Default::default()
        };
        assert!(!config.has_api_key());
    }

    #[test]
    fn rejects_non_http_base_url() {
        let config = AiConfig {
            base_url: "ftp://example.com".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidBaseUrl)
        ));
    }
}
