//! Redaction helpers for anything that might end up in a log line or diagnostic
//! message before it reaches the Tool Gateway.
//!
//! Mirrors the teacher's `masked()`/`masked_headers()` idiom: never log a credential
//! verbatim, even at debug level.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

const MASK: &str = "***redacted***";

/// Key names treated as sensitive when they appear in a step's resolved arguments.
const SENSITIVE_ARGUMENT_KEYS: &[&str] = &["token", "oauth_token", "authorization", "password", "secret"];

/// Replaces any sensitive key in `arguments` with a fixed sentinel, for logging.
///
/// The original map is left untouched; the Tool Gateway still receives the real
/// values. This only ever touches what gets written to a log or diagnostic.
pub fn mask_sensitive_arguments(arguments: &Map<String, Value>) -> Map<String, Value> {
    arguments
        .iter()
        .map(|(key, value)| {
            if SENSITIVE_ARGUMENT_KEYS.iter().any(|sensitive| key.eq_ignore_ascii_case(sensitive)) {
                (key.clone(), Value::String(MASK.to_string()))
            } else {
                (key.clone(), value.clone())
            }
        })
        .collect()
}

static BEARER_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)bearer\s+[A-Za-z0-9\-._~+/]+=*").expect("valid regex"));

/// Scrubs bearer tokens out of a free-form string (error messages, response bodies)
/// before it is logged.
pub fn redact_bearer_tokens(text: &str) -> String {
    BEARER_TOKEN.replace_all(text, "Bearer ***redacted***").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_token_key_case_insensitively() {
        let mut arguments = Map::new();
        arguments.insert("Token".into(), json!("abc123"));
        arguments.insert("recipient".into(), json!("team@example.com"));
        let masked = mask_sensitive_arguments(&arguments);
        assert_eq!(masked["Token"], json!(MASK));
        assert_eq!(masked["recipient"], json!("team@example.com"));
    }

    #[test]
    fn leaves_non_sensitive_arguments_untouched() {
        let mut arguments = Map::new();
        arguments.insert("channel".into(), json!("#general"));
        let masked = mask_sensitive_arguments(&arguments);
        assert_eq!(masked, arguments);
    }

    #[test]
    fn redacts_bearer_tokens_from_free_text() {
        let text = "request failed: Authorization: Bearer abc123.def-456 was rejected";
        let redacted = redact_bearer_tokens(text);
        assert!(!redacted.contains("abc123"));
        assert!(redacted.contains("***redacted***"));
    }
}
