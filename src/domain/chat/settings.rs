//! Generation settings shared by every send from the client.

use serde::{Deserialize, Serialize};

/// Lower bound for the sampling temperature.
pub const MIN_TEMPERATURE: f32 = 0.0;
/// Upper bound for the sampling temperature.
pub const MAX_TEMPERATURE: f32 = 2.0;
/// Lower bound for the completion token budget.
pub const MIN_MAX_TOKENS: u32 = 16;
/// Upper bound for the completion token budget.
pub const MAX_MAX_TOKENS: u32 = 4096;

/// Per-store generation settings, persisted with the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSettings {
    /// Sampling temperature in [0, 2].
    pub temperature: f32,
    /// Completion token budget in [16, 4096].
    pub max_tokens: u32,
    /// Upstream model identifier.
    pub model: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            model: "gpt-5-mini".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_request_defaults() {
        let settings = ChatSettings::default();
        assert_eq!(settings.temperature, 0.7);
        assert_eq!(settings.max_tokens, 1024);
        assert_eq!(settings.model, "gpt-5-mini");
    }

    #[test]
    fn serializes_max_tokens_camel_case() {
        let json = serde_json::to_string(&ChatSettings::default()).unwrap();
        assert!(json.contains("maxTokens"));
    }
}
