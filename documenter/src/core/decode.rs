//! Decoding of raw model replies into a [`Decision`].
//!
//! The pipeline repairs syntax only: fences, concatenated objects, chatter
//! around the object and trailing commas. Field values are never invented; a
//! missing `type`, `tool` or `confidence` is a decode error.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::json_scan::{
    is_json_object, scan_objects, split_concatenated, strip_trailing_commas,
};
use crate::core::types::{Decision, DecisionKind};
use crate::core::upstream::{is_decision_object, is_upstream_error};

/// Maximum number of characters of model text quoted in errors.
pub const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("provider returned an error instead of a completion: {preview}")]
    Upstream { preview: String },
    #[error("no JSON object found in response: {preview}")]
    NoObject { preview: String },
    #[error("response is not a valid decision envelope ({source}): {preview}")]
    Malformed {
        preview: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("decision is missing required field '{field}': {preview}")]
    MissingField { field: &'static str, preview: String },
    #[error("confidence {value} is outside [0, 1]: {preview}")]
    InvalidConfidence { value: f64, preview: String },
}

impl DecodeError {
    pub fn is_upstream(&self) -> bool {
        matches!(self, DecodeError::Upstream { .. })
    }
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type", alias = "kind", default)]
    kind: Option<String>,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    args: Option<Map<String, Value>>,
    #[serde(default)]
    manifest: Option<Map<String, Value>>,
    #[serde(default)]
    questions: Option<Vec<String>>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    rationale: String,
}

/// Decode one model reply into exactly one decision.
pub fn decode(raw: &str) -> Result<Decision, DecodeError> {
    let text = raw.trim();
    let body = strip_code_fence(text);
    let candidate = select_candidate(body).map(|candidate| strip_trailing_commas(&candidate));

    // A typed decision object is screened on its own; error words in its
    // string values do not make the reply an upstream error.
    let screened = candidate
        .as_deref()
        .filter(|candidate| is_decision_object(candidate))
        .unwrap_or(text);
    if is_upstream_error(screened) {
        return Err(DecodeError::Upstream {
            preview: preview(text),
        });
    }

    let repaired = candidate.ok_or_else(|| DecodeError::NoObject {
        preview: preview(body),
    })?;

    let envelope: RawEnvelope =
        serde_json::from_str(&repaired).map_err(|source| DecodeError::Malformed {
            preview: preview(&repaired),
            source,
        })?;
    into_decision(envelope, &repaired)
}

/// Remove one enclosing Markdown code fence (with optional language tag).
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`json`, `JSON`, ...) up to the first newline.
    let rest = match rest.find('\n') {
        Some(idx) if rest[..idx].chars().all(|c| c.is_ascii_alphanumeric()) => &rest[idx + 1..],
        _ => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Pick the first plausible object from the body.
///
/// Order: the whole body, then `}{`-split fragments, then the brace scanner.
fn select_candidate(body: &str) -> Option<String> {
    if is_json_object(body) {
        return Some(body.to_string());
    }
    if let Some(first) = split_concatenated(body).into_iter().next() {
        return Some(first);
    }
    scan_objects(body).into_iter().next()
}

fn into_decision(envelope: RawEnvelope, source_text: &str) -> Result<Decision, DecodeError> {
    let kind = envelope
        .kind
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| DecodeError::MissingField {
            field: "type",
            preview: preview(source_text),
        })?;
    let confidence = envelope
        .confidence
        .ok_or_else(|| DecodeError::MissingField {
            field: "confidence",
            preview: preview(source_text),
        })?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(DecodeError::InvalidConfidence {
            value: confidence,
            preview: preview(source_text),
        });
    }

    let kind = match kind.as_str() {
        "tool_call" => {
            let tool = envelope
                .tool
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| DecodeError::MissingField {
                    field: "tool",
                    preview: preview(source_text),
                })?;
            DecisionKind::ToolCall {
                tool,
                args: envelope.args.unwrap_or_default(),
            }
        }
        "final" => DecisionKind::Final {
            manifest: envelope.manifest.unwrap_or_default(),
        },
        "clarification" => DecisionKind::Clarification {
            questions: envelope.questions.unwrap_or_default(),
        },
        _ => DecisionKind::Unrecognized { kind },
    };

    Ok(Decision {
        kind,
        confidence,
        rationale: envelope.rationale,
    })
}

/// Bounded, char-boundary safe preview of model text.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
