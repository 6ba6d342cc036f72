//! Step-bounded conversation loop that drives one documentation run.
//!
//! Each iteration renders the transcript, asks the model for exactly one decision, logs it,
//! and then acts on it:
//!
//! - low-confidence decisions are never acted on; the model is asked to reconsider;
//! - confident tool calls are dispatched and their result is fed back;
//! - a confident `final` completes the run, a `clarification` stops it for the operator.
//!
//! The run ends with exactly one [`RunOutcome`]. Upstream and decode errors, the step budget,
//! the wall-clock deadline, cancellation, and a streak of tool failures are the only ways a
//! run stops without completing.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::budget::remaining_budget;
use crate::core::cancel::CancelToken;
use crate::core::decode::decode;
use crate::core::path_rewrite::rewrite_relative_paths;
use crate::core::policy::{ConfidenceGate, FailureStreak, StreakStatus};
use crate::core::transcript::Transcript;
use crate::core::types::{DecisionKind, FailReason, RunOutcome, ToolResult, Turn};
use crate::io::config::{AgentConfig, expand_home, home_dir};
use crate::io::operator::Operator;
use crate::io::prompt::{PromptInputs, render_system_prompt, task_message};
use crate::io::provider::{GenerateRequest, ModelProvider};
use crate::io::run_log::{RunLogger, StepState, events_path};
use crate::io::sandbox::Sandbox;
use crate::io::tools::{ToolContext, ToolRegistry};

const RECONSIDER_MESSAGE: &str = "Your confidence is below the threshold. Please provide clarification or reconsider your approach.";
const RETRY_MESSAGE: &str = "Please fix the issue and try again, or return a final manifest if you cannot resolve it. You MUST respond with a single valid JSON tool_call or final object.";

/// Everything one run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub provider: String,
    pub model: String,
    pub credential: String,
    pub max_steps: u32,
    /// Wall-clock budget for the whole run.
    pub timeout: Duration,
    pub confidence_threshold: f64,
    /// Relative path arguments are rewritten under this directory.
    pub output_dir: PathBuf,
    /// Active project root; an extra sandbox root when set.
    pub project_root: Option<PathBuf>,
    /// Private working area; the first sandbox root.
    pub work_dir: PathBuf,
    /// Run logs; tools may not read or write here.
    pub log_dir: PathBuf,
    /// Config file holding secrets; denied to tools when set.
    pub config_path: Option<PathBuf>,
    /// Record full transcripts and raw responses in the run log.
    pub verbose: bool,
    pub charge_low_confidence_steps: bool,
}

impl RunConfig {
    /// Build run settings from the loaded config, with `~` expanded against `home`.
    pub fn from_agent_config(cfg: &AgentConfig, home: &Path, credential: String) -> Self {
        Self {
            provider: cfg.provider.as_str().to_string(),
            model: cfg.model(),
            credential,
            max_steps: cfg.limits.max_steps,
            timeout: Duration::from_secs(cfg.limits.run_timeout_secs),
            confidence_threshold: cfg.confidence_threshold,
            output_dir: cfg.output_dir(home),
            project_root: cfg
                .project
                .as_ref()
                .map(|project| expand_home(&project.root_dir, home)),
            work_dir: expand_home(&cfg.work_dir, home),
            log_dir: expand_home(&cfg.log.dir, home),
            config_path: None,
            verbose: cfg.log.verbose,
            charge_low_confidence_steps: cfg.charge_low_confidence_steps,
        }
    }
}

/// What happened in one non-terminal iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    /// A confident tool call was dispatched.
    Dispatched { tool: String, result: ToolResult },
    /// The decision fell below the confidence threshold.
    Reconsider,
    /// The decision kind was not recognized.
    Nudged,
}

/// Progress report passed to the `on_step` callback.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// 1-based iteration number.
    pub step: u32,
    pub kind: String,
    pub confidence: f64,
    pub action: StepAction,
}

/// Result of [`Controller::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    /// Iterations that reached the model.
    pub steps_executed: u32,
    /// Tool dispatches performed.
    pub dispatches: u32,
    pub outcome: RunOutcome,
    pub log_path: PathBuf,
}

/// Drives the model/tool conversation for a single transcript.
pub struct Controller<'a> {
    provider: &'a dyn ModelProvider,
    registry: &'a ToolRegistry,
    operator: &'a dyn Operator,
    cancel: CancelToken,
}

impl<'a> Controller<'a> {
    pub fn new(
        provider: &'a dyn ModelProvider,
        registry: &'a ToolRegistry,
        operator: &'a dyn Operator,
    ) -> Self {
        Self {
            provider,
            registry,
            operator,
            cancel: CancelToken::new(),
        }
    }

    /// Use `token` to cancel the run from elsewhere.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run the loop until a terminal outcome.
    ///
    /// Errors are returned only for setup failures (directories, sandbox, prompt); once the
    /// loop starts, every stop is reported through [`RunSummary::outcome`].
    pub fn run<F: FnMut(&StepReport)>(
        &self,
        transcript_text: &str,
        config: &RunConfig,
        mut on_step: F,
    ) -> Result<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        let deadline = Instant::now() + config.timeout;

        for dir in [&config.work_dir, &config.output_dir, &config.log_dir] {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        let mut roots = vec![config.work_dir.clone()];
        if let Some(project_root) = &config.project_root {
            roots.push(project_root.clone());
        }
        let home = home_dir().unwrap_or_else(|_| config.work_dir.clone());
        let mut denied = vec![config.log_dir.clone()];
        denied.extend(config.config_path.iter().cloned());
        let sandbox = Sandbox::new(roots, home)?.with_denied(denied);
        // Relative arguments are anchored on the canonical output directory.
        let output_dir = config
            .output_dir
            .canonicalize()
            .with_context(|| format!("canonicalize {}", config.output_dir.display()))?;
        let events = events_path(&config.log_dir, &run_id);
        let logger = RunLogger::new(
            &config.log_dir,
            &run_id,
            &config.provider,
            &config.model,
            &config.credential,
            config.verbose,
        );

        let specs = self.registry.specs();
        let system_prompt = render_system_prompt(&PromptInputs {
            tools: &specs,
            provider: &config.provider,
            output_dir: &output_dir.display().to_string(),
            confidence_threshold: config.confidence_threshold,
        })?;
        let mut transcript = Transcript::new();
        transcript.push(Turn::system(system_prompt));
        transcript.push(Turn::user(task_message(transcript_text)));

        let ctx = ToolContext {
            run_id: &run_id,
            sandbox: &sandbox,
            operator: self.operator,
            output_dir: &output_dir,
            events_path: &events,
        };
        let gate = ConfidenceGate::new(config.confidence_threshold);
        let mut streak = FailureStreak::default();

        info!(run_id = %run_id, provider = %config.provider, model = %config.model, max_steps = config.max_steps, "run started");

        let mut charged = 0u32;
        let mut iteration = 0u32;
        let mut dispatches = 0u32;
        let outcome = loop {
            if charged >= config.max_steps {
                break RunOutcome::Failed(FailReason::BudgetExceeded {
                    max_steps: config.max_steps,
                });
            }
            if self.cancel.is_cancelled() {
                break RunOutcome::Failed(FailReason::Cancelled);
            }
            let Some(remaining) = remaining_budget(deadline) else {
                break RunOutcome::Failed(FailReason::TimedOut);
            };

            iteration += 1;
            let prompt = transcript.render();
            debug!(step = iteration, prompt_chars = prompt.len(), "calling model");
            let raw = match self.provider.generate(&GenerateRequest {
                prompt: &prompt,
                model: &config.model,
                credential: &config.credential,
                timeout: remaining,
            }) {
                Ok(raw) => raw,
                Err(err) => {
                    let reason = FailReason::Upstream(format!("{err:#}"));
                    logger.record_failure(&step_state(iteration, &transcript), "", &reason.to_string());
                    break RunOutcome::Failed(reason);
                }
            };

            let mut decision = match decode(&raw) {
                Ok(decision) => decision,
                Err(err) => {
                    let reason = if err.is_upstream() {
                        FailReason::Upstream(err.to_string())
                    } else {
                        FailReason::Decode(err.to_string())
                    };
                    logger.record_failure(&step_state(iteration, &transcript), &raw, &reason.to_string());
                    break RunOutcome::Failed(reason);
                }
            };

            let confident = gate.admits(decision.confidence);
            if confident && let DecisionKind::ToolCall { args, .. } = &mut decision.kind {
                *args = rewrite_relative_paths(args, &output_dir);
            }
            logger.record(&step_state(iteration, &transcript), &raw, &decision);
            debug!(step = iteration, kind = decision.kind_name(), confidence = decision.confidence, "decoded decision");

            let kind = decision.kind_name().to_string();
            let confidence = decision.confidence;
            let action = match decision.kind {
                DecisionKind::Unrecognized { kind } => {
                    warn!(step = iteration, kind = %kind, "unrecognized decision kind");
                    transcript.push(Turn::assistant(raw));
                    transcript.push(Turn::system(format!(
                        "Unrecognized decision type \"{kind}\". Respond with exactly one JSON object whose \"type\" is \"tool_call\", \"final\", or \"clarification\"."
                    )));
                    charged += 1;
                    StepAction::Nudged
                }
                DecisionKind::Clarification { questions } => {
                    self.operator.show_questions(&questions);
                    break RunOutcome::ClarificationNeeded(questions);
                }
                DecisionKind::ToolCall { .. } | DecisionKind::Final { .. } if !confident => {
                    transcript.push(Turn::assistant(raw));
                    transcript.push(Turn::system(RECONSIDER_MESSAGE));
                    if config.charge_low_confidence_steps {
                        charged += 1;
                    }
                    StepAction::Reconsider
                }
                DecisionKind::Final { manifest } => {
                    break RunOutcome::Completed(manifest);
                }
                DecisionKind::ToolCall { tool, args } => {
                    let args_json = serde_json::Value::Object(args).to_string();
                    let result = self.registry.dispatch(&tool, &args_json, &ctx);
                    dispatches += 1;
                    charged += 1;

                    let result_json = serde_json::to_string(&result)
                        .unwrap_or_else(|_| format!("{{\"succeeded\":{}}}", result.succeeded));
                    transcript.push(Turn::assistant(raw));
                    transcript.push(Turn::user(format!("Tool result: {result_json}")));

                    if result.succeeded {
                        streak.record_success();
                    } else {
                        match streak.record_failure() {
                            StreakStatus::Tripped { consecutive } => {
                                warn!(step = iteration, tool = %tool, failures = consecutive, "failure streak limit reached");
                                break RunOutcome::AbortedByFailureStreak {
                                    failures: consecutive,
                                    last_error: result.error,
                                };
                            }
                            StreakStatus::Continue { .. } => {
                                transcript.push(Turn::system(corrective_message(&result)));
                            }
                        }
                    }
                    StepAction::Dispatched { tool, result }
                }
            };

            on_step(&StepReport {
                step: iteration,
                kind,
                confidence,
                action,
            });
        };

        info!(run_id = %run_id, steps = iteration, dispatches, completed = outcome.is_completed(), "run finished");
        Ok(RunSummary {
            run_id,
            steps_executed: iteration,
            dispatches,
            outcome,
            log_path: logger.path().to_path_buf(),
        })
    }
}

fn step_state(step: u32, transcript: &Transcript) -> StepState<'_> {
    StepState { step, transcript }
}

fn corrective_message(result: &ToolResult) -> String {
    let mut message = format!("Tool execution failed: {}. ", result.error);
    if let Some(hint) = &result.hint {
        message.push_str(hint);
        message.push(' ');
    }
    message.push_str(RETRY_MESSAGE);
    message
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;

    use super::*;
    use crate::core::render_diagnostics::SYNTAX_HINT;
    use crate::test_support::{
        ScriptedOperator, ScriptedProvider, TestWorkspace, clarification, final_envelope,
        scripted_registry, tool_call,
    };

    fn write_call(path: &str, confidence: f64) -> String {
        tool_call(
            "writeFileContents",
            json!({"path": path, "content": "```mermaid\nflowchart TD\n  A-->B\n```\n"}),
            confidence,
        )
    }

    fn failing_call() -> String {
        tool_call("missingTool", json!({}), 0.95)
    }

    fn log_lines(path: &Path) -> Vec<serde_json::Value> {
        fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect()
    }

    #[test]
    fn run_config_expands_home_and_uses_project_output() {
        let mut cfg = AgentConfig::default();
        let config = RunConfig::from_agent_config(&cfg, Path::new("/home/ada"), "k".to_string());
        assert_eq!(config.work_dir, PathBuf::from("/home/ada/mermaid-agent-documenter"));
        assert_eq!(
            config.output_dir,
            PathBuf::from("/home/ada/mermaid-agent-documenter/output")
        );
        assert_eq!(config.max_steps, 25);
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert_eq!(config.project_root, None);

        cfg.project = Some(crate::io::config::ProjectConfig {
            name: "shop".to_string(),
            root_dir: "~/shop".to_string(),
        });
        let config = RunConfig::from_agent_config(&cfg, Path::new("/home/ada"), "k".to_string());
        assert_eq!(config.project_root, Some(PathBuf::from("/home/ada/shop")));
        assert_eq!(config.output_dir, PathBuf::from("/home/ada/shop/out"));
    }

    #[test]
    fn write_then_final_completes() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new([
            write_call("summary.md", 0.95),
            final_envelope(json!({"summary.md": "created"}), 0.95),
        ]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let controller = Controller::new(&provider, &registry, &operator);

        let mut reports = Vec::new();
        let summary = controller
            .run("User logs in.", &workspace.run_config(), |report| {
                reports.push(report.clone())
            })
            .expect("run");

        let mut manifest = serde_json::Map::new();
        manifest.insert("summary.md".to_string(), json!("created"));
        assert_eq!(summary.outcome, RunOutcome::Completed(manifest));
        assert_eq!(summary.steps_executed, 2);
        assert_eq!(summary.dispatches, 1);
        assert_eq!(reports.len(), 1);
        assert!(matches!(
            &reports[0].action,
            StepAction::Dispatched { tool, result } if tool == "writeFileContents" && result.succeeded
        ));
        assert!(workspace.output_dir().join("summary.md").exists());
    }

    #[test]
    fn relative_paths_are_rewritten_before_logging() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new([
            write_call("flows/a.md", 0.95),
            final_envelope(json!({}), 0.95),
        ]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let summary = Controller::new(&provider, &registry, &operator)
            .run("t", &workspace.run_config(), |_| {})
            .expect("run");

        let lines = log_lines(&summary.log_path);
        assert_eq!(lines.len(), 2);
        let expected = workspace.output_dir().join("flows/a.md");
        assert_eq!(lines[0]["args"]["path"], json!(expected.display().to_string()));
        assert_eq!(lines[1]["kind"], json!("final"));
    }

    #[test]
    fn low_confidence_tool_call_is_never_dispatched() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new([
            write_call("never.md", 0.5),
            final_envelope(json!({}), 0.95),
        ]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let summary = Controller::new(&provider, &registry, &operator)
            .run("t", &workspace.run_config(), |_| {})
            .expect("run");

        assert!(summary.outcome.is_completed());
        assert_eq!(summary.dispatches, 0);
        assert!(!workspace.output_dir().join("never.md").exists());
        assert!(provider.prompts()[1].contains(RECONSIDER_MESSAGE));
    }

    #[test]
    fn low_confidence_final_does_not_complete() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new([
            final_envelope(json!({"a": 1}), 0.2),
            final_envelope(json!({"b": 2}), 0.99),
        ]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let summary = Controller::new(&provider, &registry, &operator)
            .run("t", &workspace.run_config(), |_| {})
            .expect("run");

        let RunOutcome::Completed(manifest) = summary.outcome else {
            panic!("expected completion");
        };
        assert!(manifest.contains_key("b"));
        assert_eq!(summary.steps_executed, 2);
    }

    #[test]
    fn confidence_at_threshold_is_admitted() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new([final_envelope(json!({}), 0.9)]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let summary = Controller::new(&provider, &registry, &operator)
            .run("t", &workspace.run_config(), |_| {})
            .expect("run");
        assert!(summary.outcome.is_completed());
    }

    #[test]
    fn three_consecutive_failures_abort_before_a_fourth_dispatch() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new([
            failing_call(),
            failing_call(),
            failing_call(),
            failing_call(),
        ]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let summary = Controller::new(&provider, &registry, &operator)
            .run("t", &workspace.run_config(), |_| {})
            .expect("run");

        assert_eq!(
            summary.outcome,
            RunOutcome::AbortedByFailureStreak {
                failures: 3,
                last_error: "tool not found: missingTool".to_string(),
            }
        );
        assert_eq!(summary.dispatches, 3);
        assert_eq!(provider.calls(), 3);
    }

    #[test]
    fn success_between_failures_resets_the_streak() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new([
            failing_call(),
            failing_call(),
            write_call("ok.md", 0.95),
            failing_call(),
            failing_call(),
            final_envelope(json!({}), 0.95),
        ]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let summary = Controller::new(&provider, &registry, &operator)
            .run("t", &workspace.run_config(), |_| {})
            .expect("run");

        assert!(summary.outcome.is_completed());
        assert_eq!(summary.dispatches, 5);
    }

    #[test]
    fn streak_counts_only_consecutive_failures() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new([
            failing_call(),
            failing_call(),
            write_call("ok.md", 0.95),
            failing_call(),
            failing_call(),
            failing_call(),
            final_envelope(json!({}), 0.95),
        ]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let summary = Controller::new(&provider, &registry, &operator)
            .run("t", &workspace.run_config(), |_| {})
            .expect("run");

        assert!(matches!(
            summary.outcome,
            RunOutcome::AbortedByFailureStreak { failures: 3, .. }
        ));
        assert_eq!(provider.calls(), 6);
    }

    #[test]
    fn failure_appends_corrective_turn() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new([failing_call(), final_envelope(json!({}), 0.95)]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        Controller::new(&provider, &registry, &operator)
            .run("t", &workspace.run_config(), |_| {})
            .expect("run");

        let prompt = &provider.prompts()[1];
        assert!(prompt.contains("user: Tool result: {"));
        assert!(prompt.contains("system: Tool execution failed: tool not found: missingTool."));
        assert!(prompt.contains("fix the issue and try again"));
    }

    #[test]
    fn render_syntax_failure_adds_hint() {
        let result = ToolResult::failure("Mermaid syntax error on line 2: bad").with_hint(SYNTAX_HINT);
        let message = corrective_message(&result);
        assert!(message.contains(SYNTAX_HINT));
        assert!(message.ends_with(RETRY_MESSAGE));
    }

    #[test]
    fn budget_is_exhausted_without_terminal_decision() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new([
            write_call("a.md", 0.95),
            write_call("b.md", 0.95),
            write_call("c.md", 0.95),
            write_call("d.md", 0.95),
        ]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let mut config = workspace.run_config();
        config.max_steps = 3;
        let summary = Controller::new(&provider, &registry, &operator)
            .run("t", &config, |_| {})
            .expect("run");

        assert_eq!(
            summary.outcome,
            RunOutcome::Failed(FailReason::BudgetExceeded { max_steps: 3 })
        );
        assert_eq!(summary.dispatches, 3);
        assert_eq!(provider.calls(), 3);
    }

    #[test]
    fn low_confidence_steps_are_charged_by_default() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new([
            final_envelope(json!({}), 0.1),
            final_envelope(json!({}), 0.1),
            final_envelope(json!({}), 0.95),
        ]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let mut config = workspace.run_config();
        config.max_steps = 2;
        let summary = Controller::new(&provider, &registry, &operator)
            .run("t", &config, |_| {})
            .expect("run");
        assert!(matches!(
            summary.outcome,
            RunOutcome::Failed(FailReason::BudgetExceeded { .. })
        ));
    }

    #[test]
    fn uncharged_low_confidence_steps_leave_budget() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new([
            final_envelope(json!({}), 0.1),
            final_envelope(json!({}), 0.1),
            final_envelope(json!({}), 0.95),
        ]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let mut config = workspace.run_config();
        config.max_steps = 1;
        config.charge_low_confidence_steps = false;
        let summary = Controller::new(&provider, &registry, &operator)
            .run("t", &config, |_| {})
            .expect("run");
        assert!(summary.outcome.is_completed());
        assert_eq!(summary.steps_executed, 3);
    }

    #[test]
    fn unrecognized_kind_is_nudged_and_charged() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new([
            r#"{"type":"plan","confidence":0.99,"rationale":"thinking"}"#.to_string(),
            final_envelope(json!({}), 0.95),
        ]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let mut reports = Vec::new();
        let summary = Controller::new(&provider, &registry, &operator)
            .run("t", &workspace.run_config(), |report| {
                reports.push(report.clone())
            })
            .expect("run");

        assert!(summary.outcome.is_completed());
        assert_eq!(reports[0].action, StepAction::Nudged);
        assert_eq!(reports[0].kind, "plan");
        assert!(provider.prompts()[1].contains("Unrecognized decision type \"plan\""));
    }

    #[test]
    fn clarification_surfaces_questions() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new([clarification(["Which database?"], 0.3)]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let summary = Controller::new(&provider, &registry, &operator)
            .run("t", &workspace.run_config(), |_| {})
            .expect("run");

        assert_eq!(
            summary.outcome,
            RunOutcome::ClarificationNeeded(vec!["Which database?".to_string()])
        );
        assert_eq!(operator.shown(), vec![vec!["Which database?".to_string()]]);
    }

    #[test]
    fn upstream_reply_fails_and_is_logged() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new(["Error 401: API key not valid"]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let summary = Controller::new(&provider, &registry, &operator)
            .run("t", &workspace.run_config(), |_| {})
            .expect("run");

        assert!(matches!(
            summary.outcome,
            RunOutcome::Failed(FailReason::Upstream(_))
        ));
        let lines = log_lines(&summary.log_path);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["kind"], json!("error"));
    }

    #[test]
    fn provider_error_is_upstream() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::from_results([Err("connection refused".to_string())]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let summary = Controller::new(&provider, &registry, &operator)
            .run("t", &workspace.run_config(), |_| {})
            .expect("run");
        assert_eq!(
            summary.outcome,
            RunOutcome::Failed(FailReason::Upstream("connection refused".to_string()))
        );
    }

    #[test]
    fn undecodable_reply_fails_as_decode_error() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new(["I think we should draw a flowchart."]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let summary = Controller::new(&provider, &registry, &operator)
            .run("t", &workspace.run_config(), |_| {})
            .expect("run");
        assert!(matches!(
            summary.outcome,
            RunOutcome::Failed(FailReason::Decode(_))
        ));
        assert_eq!(log_lines(&summary.log_path)[0]["kind"], json!("error"));
    }

    #[test]
    fn cancellation_after_step_stops_before_next_model_call() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new([
            write_call("a.md", 0.95),
            write_call("b.md", 0.95),
            final_envelope(json!({}), 0.95),
        ]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let token = CancelToken::new();
        let trigger = token.clone();
        let seen = Cell::new(0u32);
        let summary = Controller::new(&provider, &registry, &operator)
            .with_cancel(token)
            .run("t", &workspace.run_config(), |report| {
                seen.set(report.step);
                if report.step == 1 {
                    trigger.cancel();
                }
            })
            .expect("run");

        assert_eq!(summary.outcome, RunOutcome::Failed(FailReason::Cancelled));
        assert_eq!(provider.calls(), 1);
        assert_eq!(seen.get(), 1);
        assert_eq!(log_lines(&summary.log_path).len(), 1);
        assert!(!workspace.output_dir().join("b.md").exists());
    }

    #[test]
    fn expired_deadline_times_out_before_calling_model() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new([final_envelope(json!({}), 0.95)]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let mut config = workspace.run_config();
        config.timeout = Duration::ZERO;
        let summary = Controller::new(&provider, &registry, &operator)
            .run("t", &config, |_| {})
            .expect("run");
        assert_eq!(summary.outcome, RunOutcome::Failed(FailReason::TimedOut));
        assert_eq!(provider.calls(), 0);
    }

    #[test]
    fn verbose_log_redacts_credential() {
        let workspace = TestWorkspace::new();
        let provider = ScriptedProvider::new([final_envelope(json!({}), 0.95)]);
        let registry = scripted_registry();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let mut config = workspace.run_config();
        config.verbose = true;
        config.credential = "sk-live-abc".to_string();
        let summary = Controller::new(&provider, &registry, &operator)
            .run("token sk-live-abc leaked", &config, |_| {})
            .expect("run");

        let contents = fs::read_to_string(&summary.log_path).expect("read log");
        assert!(!contents.contains("sk-live-abc"));
        assert!(contents.contains("[redacted]"));
    }
}
