//! Per-run JSONL step log under the configured log directory.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::core::transcript::Transcript;
use crate::core::types::{Decision, DecisionKind, Turn};

const REDACTED: &str = "[redacted]";

/// One line of the run log.
#[derive(Debug, Serialize)]
struct LogRecord<'a> {
    timestamp: String,
    run_id: &'a str,
    step: u32,
    provider: &'a str,
    model: &'a str,
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rationale: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<&'a Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    manifest: Option<&'a Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transcript: Option<Vec<Turn>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<String>,
}

/// Step-level context for a log line.
#[derive(Debug, Clone, Copy)]
pub struct StepState<'a> {
    /// 1-based step number.
    pub step: u32,
    /// Conversation as sent to the model for this step.
    pub transcript: &'a Transcript,
}

/// Appends one JSON object per step to `<log_dir>/<run_id>.jsonl`.
///
/// Write failures are reported through tracing and never interrupt a run.
#[derive(Debug, Clone)]
pub struct RunLogger {
    path: PathBuf,
    run_id: String,
    provider: String,
    model: String,
    credential: String,
    verbose: bool,
}

impl RunLogger {
    pub fn new(
        log_dir: &Path,
        run_id: &str,
        provider: &str,
        model: &str,
        credential: &str,
        verbose: bool,
    ) -> Self {
        Self {
            path: log_path(log_dir, run_id),
            run_id: run_id.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            credential: credential.to_string(),
            verbose,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log a decoded decision. Tool call `args` should already be path-rewritten.
    pub fn record(&self, state: &StepState<'_>, raw: &str, decision: &Decision) {
        let (tool, args, manifest) = match &decision.kind {
            DecisionKind::ToolCall { tool, args } => (Some(tool.as_str()), Some(args), None),
            DecisionKind::Final { manifest } => (None, None, Some(manifest)),
            _ => (None, None, None),
        };
        let record = LogRecord {
            timestamp: Utc::now().to_rfc3339(),
            run_id: &self.run_id,
            step: state.step,
            provider: &self.provider,
            model: &self.model,
            kind: decision.kind_name(),
            confidence: Some(decision.confidence),
            rationale: Some(&decision.rationale),
            tool,
            args,
            manifest,
            error: None,
            transcript: self.verbose_transcript(state),
            response: self.verbose_response(raw),
        };
        self.append_or_warn(&record);
    }

    /// Log a step that produced no usable decision.
    pub fn record_failure(&self, state: &StepState<'_>, raw: &str, reason: &str) {
        let record = LogRecord {
            timestamp: Utc::now().to_rfc3339(),
            run_id: &self.run_id,
            step: state.step,
            provider: &self.provider,
            model: &self.model,
            kind: "error",
            confidence: None,
            rationale: None,
            tool: None,
            args: None,
            manifest: None,
            error: Some(reason),
            transcript: self.verbose_transcript(state),
            response: self.verbose_response(raw),
        };
        self.append_or_warn(&record);
    }

    fn verbose_transcript(&self, state: &StepState<'_>) -> Option<Vec<Turn>> {
        self.verbose.then(|| {
            state
                .transcript
                .turns()
                .iter()
                .map(|turn| Turn {
                    role: turn.role,
                    content: self.redact(&turn.content),
                })
                .collect()
        })
    }

    fn verbose_response(&self, raw: &str) -> Option<String> {
        self.verbose.then(|| self.redact(raw))
    }

    fn redact(&self, text: &str) -> String {
        if self.credential.is_empty() {
            return text.to_string();
        }
        text.replace(&self.credential, REDACTED)
    }

    fn append_or_warn(&self, record: &LogRecord<'_>) {
        if let Err(err) = self.append(record) {
            warn!(path = %self.path.display(), error = %format!("{err:#}"), "failed to write run log");
        }
    }

    fn append(&self, record: &LogRecord<'_>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(record).context("serialize log record")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", self.path.display()))?;
        Ok(())
    }
}

/// Step log location for `run_id`.
pub fn log_path(log_dir: &Path, run_id: &str) -> PathBuf {
    log_dir.join(format!("{run_id}.jsonl"))
}

/// Events file written by the `logEvent` tool for `run_id`.
pub fn events_path(log_dir: &Path, run_id: &str) -> PathBuf {
    log_dir.join(format!("{run_id}.events.jsonl"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn read_lines(path: &Path) -> Vec<Value> {
        fs::read_to_string(path)
            .expect("read log")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect()
    }

    fn tool_call() -> Decision {
        let mut args = Map::new();
        args.insert("path".to_string(), json!("/out/a.md"));
        Decision {
            kind: DecisionKind::ToolCall {
                tool: "writeFileContents".to_string(),
                args,
            },
            confidence: 0.95,
            rationale: "write".to_string(),
        }
    }

    #[test]
    fn record_writes_tool_fields() {
        let temp = tempfile::tempdir().expect("tempdir");
        let logger = RunLogger::new(temp.path(), "run-1", "openai", "gpt", "sk-secret", false);
        let transcript = Transcript::new();
        logger.record(
            &StepState {
                step: 1,
                transcript: &transcript,
            },
            "{}",
            &tool_call(),
        );

        let lines = read_lines(logger.path());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["kind"], json!("tool_call"));
        assert_eq!(lines[0]["tool"], json!("writeFileContents"));
        assert_eq!(lines[0]["args"]["path"], json!("/out/a.md"));
        assert_eq!(lines[0]["step"], json!(1));
        assert!(lines[0].get("transcript").is_none());
        assert!(lines[0].get("response").is_none());
    }

    #[test]
    fn verbose_mode_adds_redacted_transcript_and_response() {
        let temp = tempfile::tempdir().expect("tempdir");
        let logger = RunLogger::new(temp.path(), "run-2", "openai", "gpt", "sk-secret", true);
        let mut transcript = Transcript::new();
        transcript.push(Turn::user("key is sk-secret"));
        logger.record(
            &StepState {
                step: 3,
                transcript: &transcript,
            },
            "echo sk-secret",
            &tool_call(),
        );

        let lines = read_lines(logger.path());
        assert_eq!(lines[0]["transcript"][0]["content"], json!("key is [redacted]"));
        assert_eq!(lines[0]["response"], json!("echo [redacted]"));
    }

    #[test]
    fn failure_records_error_kind() {
        let temp = tempfile::tempdir().expect("tempdir");
        let logger = RunLogger::new(temp.path(), "run-3", "google", "gemini", "", false);
        let transcript = Transcript::new();
        logger.record_failure(
            &StepState {
                step: 2,
                transcript: &transcript,
            },
            "garbage",
            "decode error: no JSON object",
        );
        let lines = read_lines(logger.path());
        assert_eq!(lines[0]["kind"], json!("error"));
        assert_eq!(lines[0]["error"], json!("decode error: no JSON object"));
    }

    #[test]
    fn unwritable_log_does_not_panic() {
        let temp = tempfile::tempdir().expect("tempdir");
        let blocker = temp.path().join("file");
        fs::write(&blocker, "x").expect("write");
        let logger = RunLogger::new(&blocker, "run-4", "openai", "gpt", "", false);
        let transcript = Transcript::new();
        logger.record(
            &StepState {
                step: 1,
                transcript: &transcript,
            },
            "{}",
            &tool_call(),
        );
        assert!(!logger.path().exists());
    }
}
