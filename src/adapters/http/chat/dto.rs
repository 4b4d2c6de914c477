//! Request/response DTOs and schema validation for the chat relay.
//!
//! Validation runs against the parsed JSON value rather than a typed
//! deserialize so violations surface as per-field errors
//! (`{"error":{"fieldErrors":{...}}}`) instead of a single opaque parse
//! failure. Unknown body fields are ignored.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::domain::chat::{MAX_MAX_TOKENS, MAX_TEMPERATURE, MIN_MAX_TOKENS, MIN_TEMPERATURE};
use crate::ports::{ChatMessage, MessageRole};

/// Default sampling temperature when the field is absent.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Default completion token budget when the field is absent.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// A validated chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Ordered message sequence, at least one item.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature in [0, 2].
    pub temperature: f32,
    /// Completion token budget in [16, 4096].
    pub max_tokens: u32,
    /// Optional system preamble, prepended as a synthetic leading message.
    pub system: Option<String>,
}

/// Structured validation failure, keyed by offending field.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrors {
    pub form_errors: Vec<String>,
    pub field_errors: BTreeMap<&'static str, Vec<String>>,
}

impl ValidationErrors {
    fn field(&mut self, field: &'static str, message: impl Into<String>) {
        self.field_errors.entry(field).or_default().push(message.into());
    }

    fn form(&mut self, message: impl Into<String>) {
        self.form_errors.push(message.into());
    }

    fn is_empty(&self) -> bool {
        self.form_errors.is_empty() && self.field_errors.is_empty()
    }
}

/// Validates a parsed JSON body against the chat request schema.
pub fn validate_chat_request(body: &Value) -> Result<ChatRequest, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let Some(object) = body.as_object() else {
        errors.form("request body must be a JSON object");
        return Err(errors);
    };

    let messages = match object.get("messages") {
        None => {
            errors.field("messages", "required");
            Vec::new()
        }
        Some(Value::Array(items)) => {
            if items.is_empty() {
                errors.field("messages", "must contain at least 1 message");
            }
            let mut messages = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                match validate_message(item) {
                    Ok(message) => messages.push(message),
                    Err(reason) => {
                        errors.field("messages", format!("message {index}: {reason}"));
                    }
                }
            }
            messages
        }
        Some(_) => {
            errors.field("messages", "must be an array");
            Vec::new()
        }
    };

    let temperature = match object.get("temperature") {
        None | Some(Value::Null) => DEFAULT_TEMPERATURE,
        Some(value) => match value.as_f64() {
            Some(t) if (MIN_TEMPERATURE as f64..=MAX_TEMPERATURE as f64).contains(&t) => t as f32,
            Some(_) => {
                errors.field(
                    "temperature",
                    format!("must be between {MIN_TEMPERATURE} and {MAX_TEMPERATURE}"),
                );
                DEFAULT_TEMPERATURE
            }
            None => {
                errors.field("temperature", "must be a number");
                DEFAULT_TEMPERATURE
            }
        },
    };

    let max_tokens = match object.get("max_tokens") {
        None | Some(Value::Null) => DEFAULT_MAX_TOKENS,
        Some(value) => match value.as_u64() {
            Some(n) if (MIN_MAX_TOKENS as u64..=MAX_MAX_TOKENS as u64).contains(&n) => n as u32,
            Some(_) => {
                errors.field(
                    "max_tokens",
                    format!("must be between {MIN_MAX_TOKENS} and {MAX_MAX_TOKENS}"),
                );
                DEFAULT_MAX_TOKENS
            }
            None => {
                errors.field("max_tokens", "must be an integer");
                DEFAULT_MAX_TOKENS
            }
        },
    };

    let system = match object.get("system") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.field("system", "must be a string");
            None
        }
    };

    if errors.is_empty() {
        Ok(ChatRequest {
            messages,
            temperature,
            max_tokens,
            system,
        })
    } else {
        Err(errors)
    }
}

fn validate_message(item: &Value) -> Result<ChatMessage, String> {
    let Some(object) = item.as_object() else {
        return Err("must be an object".to_string());
    };

    let role = match object.get("role").and_then(Value::as_str) {
        Some(role) => MessageRole::parse(role)
            .ok_or_else(|| format!("role must be one of system, user, assistant (got {role:?})"))?,
        None => return Err("role must be a string".to_string()),
    };

    let content = match object.get("content").and_then(Value::as_str) {
        Some(content) if !content.is_empty() => content.to_string(),
        Some(_) => return Err("content must be a non-empty string".to_string()),
        None => return Err("content must be a string".to_string()),
    };

    Ok(ChatMessage::new(role, content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_request_gets_defaults() {
        let body = json!({"messages": [{"role": "user", "content": "hi"}]});
        let request = validate_chat_request(&body).unwrap();
        assert_eq!(request.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(request.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(request.system.is_none());
        assert_eq!(request.messages.len(), 1);
    }

    #[test]
    fn empty_messages_array_is_rejected() {
        let body = json!({"messages": []});
        let errors = validate_chat_request(&body).unwrap_err();
        assert!(errors.field_errors.contains_key("messages"));
    }

    #[test]
    fn missing_messages_is_rejected() {
        let errors = validate_chat_request(&json!({})).unwrap_err();
        assert_eq!(errors.field_errors["messages"], vec!["required"]);
    }

    #[test]
    fn empty_content_is_rejected_with_index() {
        let body = json!({"messages": [
            {"role": "user", "content": "hi"},
            {"role": "assistant", "content": ""}
        ]});
        let errors = validate_chat_request(&body).unwrap_err();
        assert!(errors.field_errors["messages"][0].starts_with("message 1:"));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let body = json!({"messages": [{"role": "tool", "content": "x"}]});
        assert!(validate_chat_request(&body).is_err());
    }

    #[test]
    fn max_tokens_out_of_bounds_names_the_field() {
        let body = json!({
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 5000
        });
        let errors = validate_chat_request(&body).unwrap_err();
        assert!(errors.field_errors.contains_key("max_tokens"));
    }

    #[test]
    fn temperature_bounds_are_inclusive() {
        for t in [0.0, 2.0] {
            let body = json!({
                "messages": [{"role": "user", "content": "hi"}],
                "temperature": t
            });
            assert!(validate_chat_request(&body).is_ok(), "temperature {t}");
        }
        let body = json!({
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 2.1
        });
        assert!(validate_chat_request(&body).is_err());
    }

    #[test]
    fn fractional_max_tokens_is_rejected() {
        let body = json!({
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 99.5
        });
        let errors = validate_chat_request(&body).unwrap_err();
        assert!(errors.field_errors.contains_key("max_tokens"));
    }

    #[test]
    fn non_object_body_is_a_form_error() {
        let errors = validate_chat_request(&json!([1, 2])).unwrap_err();
        assert!(!errors.form_errors.is_empty());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let body = json!({
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true
        });
        assert!(validate_chat_request(&body).is_ok());
    }

    #[test]
    fn errors_serialize_with_field_errors_key() {
        let errors = validate_chat_request(&json!({})).unwrap_err();
        let json = serde_json::to_string(&errors).unwrap();
        assert!(json.contains("fieldErrors"));
        assert!(json.contains("messages"));
    }
}
