//! Fingerprinting of provider error bodies that arrive in place of a completion.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static FINGERPRINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\berror 40[0134]\b|api key not valid|model not found|invalid model|unsupported model|model does not exist|\binvalid_argument\b|\bpermission_denied\b|\bnot_found\b",
    )
    .expect("fingerprint pattern should be valid")
});

/// Whether `text` looks like an upstream error rather than a model decision.
///
/// JSON objects with an `error` key, or with both `message` and `code`, are
/// errors. An object that declares a decision `type` is never one, whatever its
/// string content says. Anything else is matched against HTTP status phrases
/// and vendor error codes.
pub fn is_upstream_error(text: &str) -> bool {
    let text = text.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        if is_error_object(&map) {
            return true;
        }
        if declares_kind(&map) {
            return false;
        }
    }
    FINGERPRINT_RE.is_match(text)
}

/// Whether `text` is a JSON object carrying a decision `type` (or `kind`).
pub fn is_decision_object(text: &str) -> bool {
    matches!(
        serde_json::from_str::<Value>(text),
        Ok(Value::Object(map)) if declares_kind(&map)
    )
}

fn is_error_object(map: &Map<String, Value>) -> bool {
    map.contains_key("error") || (map.contains_key("message") && map.contains_key("code"))
}

fn declares_kind(map: &Map<String, Value>) -> bool {
    map.contains_key("type") || map.contains_key("kind")
}
