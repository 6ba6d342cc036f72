//! Shared deterministic types for the conversation core.
//!
//! These types define the contracts between the decoder, the controller and the
//! dispatcher. They carry no I/O handles and serialize to stable JSON.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Speaker of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry of the conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The variant-specific part of a model decision.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionKind {
    /// Invoke a registered tool with the given arguments.
    ToolCall {
        tool: String,
        args: Map<String, Value>,
    },
    /// The model considers the documentation complete.
    Final { manifest: Map<String, Value> },
    /// The model cannot proceed without operator answers.
    Clarification { questions: Vec<String> },
    /// A `type` value this build does not know about.
    Unrecognized { kind: String },
}

/// A decoded model reply: exactly one decision plus its confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub kind: DecisionKind,
    /// Self-reported confidence in `[0, 1]`.
    pub confidence: f64,
    pub rationale: String,
}

impl Decision {
    /// Wire name of the decision kind (`tool_call`, `final`, ...).
    pub fn kind_name(&self) -> &str {
        match &self.kind {
            DecisionKind::ToolCall { .. } => "tool_call",
            DecisionKind::Final { .. } => "final",
            DecisionKind::Clarification { .. } => "clarification",
            DecisionKind::Unrecognized { kind } => kind,
        }
    }
}

/// Normalized outcome of one tool dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub succeeded: bool,
    pub payload: Value,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
    /// Extra guidance for the model; not part of the wire result.
    #[serde(skip)]
    pub hint: Option<String>,
}

impl ToolResult {
    pub fn success(payload: Value) -> Self {
        Self {
            succeeded: true,
            payload,
            error: String::new(),
            hint: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            payload: Value::Null,
            error: error.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Why a run stopped without completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailReason {
    /// The step counter reached `max_steps` without a terminal decision.
    BudgetExceeded { max_steps: u32 },
    /// The caller cancelled the run.
    Cancelled,
    /// The wall-clock run timeout elapsed.
    TimedOut,
    /// Provider transport or account failure.
    Upstream(String),
    /// Model output could not be repaired into a decision.
    Decode(String),
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::BudgetExceeded { .. } => write!(f, "budget exceeded"),
            FailReason::Cancelled => write!(f, "cancelled"),
            FailReason::TimedOut => write!(f, "run timed out"),
            FailReason::Upstream(msg) => write!(f, "upstream error: {msg}"),
            FailReason::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

/// Terminal result of a run. Exactly one is produced per invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Map<String, Value>),
    Failed(FailReason),
    ClarificationNeeded(Vec<String>),
    AbortedByFailureStreak { failures: u32, last_error: String },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_exceeded_displays_fixed_reason() {
        let reason = FailReason::BudgetExceeded { max_steps: 4 };
        assert_eq!(reason.to_string(), "budget exceeded");
    }

    #[test]
    fn tool_result_failure_serializes_error() {
        let result = ToolResult::failure("boom");
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["succeeded"], Value::Bool(false));
        assert_eq!(json["error"], Value::String("boom".to_string()));
    }

    #[test]
    fn unrecognized_kind_name_is_passed_through() {
        let decision = Decision {
            kind: DecisionKind::Unrecognized {
                kind: "plan".to_string(),
            },
            confidence: 1.0,
            rationale: String::new(),
        };
        assert_eq!(decision.kind_name(), "plan");
    }
}
