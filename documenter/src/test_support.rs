//! Test-only fakes for the provider, operator, renderer, and docs seams.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::controller::RunConfig;
use crate::io::operator::Operator;
use crate::io::provider::{GenerateRequest, ModelProvider};
use crate::io::renderer::{RenderOutput, RenderRequest, Renderer};
use crate::io::run_log::events_path;
use crate::io::sandbox::Sandbox;
use crate::io::tools::fetch_docs::{DocFetcher, FetchedDoc};
use crate::io::tools::{ToolContext, ToolRegistry};

/// Provider that replays canned replies in order and records every prompt.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    replies: RefCell<VecDeque<Result<String, String>>>,
    prompts: RefCell<Vec<String>>,
    calls: Cell<u32>,
}

impl ScriptedProvider {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self::from_results(replies.into_iter().map(|reply| Ok(reply.into())))
    }

    /// Replies where `Err` simulates a transport failure.
    pub fn from_results(replies: impl IntoIterator<Item = Result<String, String>>) -> Self {
        Self {
            replies: RefCell::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(&self, request: &GenerateRequest<'_>) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        self.prompts.borrow_mut().push(request.prompt.to_string());
        match self.replies.borrow_mut().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted provider has no replies left")),
        }
    }
}

/// Operator with queued answers that records what it was asked and shown.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    answers: RefCell<VecDeque<String>>,
    asked: RefCell<Vec<String>>,
    shown: RefCell<Vec<Vec<String>>>,
    notices: RefCell<Vec<String>>,
}

impl ScriptedOperator {
    pub fn new<I>(answers: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            answers: RefCell::new(answers.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }

    pub fn shown(&self) -> Vec<Vec<String>> {
        self.shown.borrow().clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.borrow().clone()
    }
}

impl Operator for ScriptedOperator {
    fn ask(&self, prompt: &str) -> Result<String> {
        self.asked.borrow_mut().push(prompt.to_string());
        self.answers
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted answer left"))
    }

    fn notify(&self, message: &str) {
        self.notices.borrow_mut().push(message.to_string());
    }

    fn show_questions(&self, questions: &[String]) {
        self.shown.borrow_mut().push(questions.to_vec());
    }
}

#[derive(Debug, Clone)]
enum RenderBehavior {
    Succeed,
    Fail(String),
    MissingBinary,
    Silent,
}

/// Input and output paths of one render request.
pub type RenderCall = (PathBuf, PathBuf);

/// Renderer fake; shares its call log through [`ScriptedRenderer::calls`].
#[derive(Debug, Clone)]
pub struct ScriptedRenderer {
    behavior: RenderBehavior,
    calls: Rc<RefCell<Vec<RenderCall>>>,
}

impl ScriptedRenderer {
    fn with_behavior(behavior: RenderBehavior) -> Self {
        Self {
            behavior,
            calls: Rc::default(),
        }
    }

    /// Writes a placeholder image and reports success.
    pub fn succeeding() -> Self {
        Self::with_behavior(RenderBehavior::Succeed)
    }

    /// Exits unsuccessfully with `diagnostics`.
    pub fn failing(diagnostics: &str) -> Self {
        Self::with_behavior(RenderBehavior::Fail(diagnostics.to_string()))
    }

    /// Behaves like a renderer executable that is not installed.
    pub fn missing_binary() -> Self {
        Self::with_behavior(RenderBehavior::MissingBinary)
    }

    /// Reports success without writing the output file.
    pub fn silent() -> Self {
        Self::with_behavior(RenderBehavior::Silent)
    }

    pub fn calls(&self) -> Rc<RefCell<Vec<RenderCall>>> {
        Rc::clone(&self.calls)
    }
}

impl Renderer for ScriptedRenderer {
    fn render(&self, request: &RenderRequest<'_>) -> Result<RenderOutput> {
        self.calls
            .borrow_mut()
            .push((request.input.to_path_buf(), request.output.to_path_buf()));
        match &self.behavior {
            RenderBehavior::Succeed => {
                fs::write(request.output, "<svg/>")?;
                Ok(RenderOutput {
                    success: true,
                    diagnostics: String::new(),
                })
            }
            RenderBehavior::Fail(diagnostics) => Ok(RenderOutput {
                success: false,
                diagnostics: diagnostics.clone(),
            }),
            RenderBehavior::MissingBinary => Err(anyhow::Error::from(io::Error::new(
                io::ErrorKind::NotFound,
                "No such file or directory",
            ))),
            RenderBehavior::Silent => Ok(RenderOutput {
                success: true,
                diagnostics: String::new(),
            }),
        }
    }
}

/// Docs fetcher serving fixed pages; any other URL fails.
#[derive(Debug, Clone)]
pub struct ScriptedFetcher {
    base: String,
    pages: BTreeMap<String, String>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            base: "https://mermaid.example".to_string(),
            pages: BTreeMap::new(),
        }
    }

    pub fn with_base(mut self, base: &str) -> Self {
        self.base = base.to_string();
        self
    }

    pub fn page(mut self, url: impl Into<String>, content: impl Into<String>) -> Self {
        self.pages.insert(url.into(), content.into());
        self
    }
}

impl Default for ScriptedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl DocFetcher for ScriptedFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedDoc> {
        self.pages
            .get(url)
            .map(|content| FetchedDoc {
                content: content.clone(),
                truncated: false,
            })
            .ok_or_else(|| anyhow!("GET {url} returned 404 Not Found"))
    }

    fn base_url(&self) -> &str {
        &self.base
    }
}

/// Registry with every default tool over scripted renderer and docs.
pub fn scripted_registry() -> ToolRegistry {
    ToolRegistry::with_defaults(
        Box::new(ScriptedRenderer::succeeding()),
        Box::new(ScriptedFetcher::new()),
    )
    .expect("default registry")
}

/// Temporary sandbox root with an `out/` output directory.
pub struct TestWorkspace {
    _temp: TempDir,
    root: PathBuf,
    output_dir: PathBuf,
    events_path: PathBuf,
    sandbox: Sandbox,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().canonicalize().expect("canonical tempdir");
        let output_dir = root.join("out");
        fs::create_dir_all(&output_dir).expect("create out dir");
        let sandbox = Sandbox::new([root.clone()], root.clone()).expect("sandbox");
        let events_path = events_path(&root.join("logs"), Self::RUN_ID);
        Self {
            _temp: temp,
            root,
            output_dir,
            events_path,
            sandbox,
        }
    }

    pub const RUN_ID: &'static str = "test-run";

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    pub fn run_id(&self) -> &str {
        Self::RUN_ID
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Write `content` to `rel` under the root, creating parents.
    pub fn write(&self, rel: &str, content: &str) {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write file");
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root.join(rel)).expect("read file")
    }

    pub fn context<'a>(&'a self, operator: &'a dyn Operator) -> ToolContext<'a> {
        ToolContext {
            run_id: Self::RUN_ID,
            sandbox: &self.sandbox,
            operator,
            output_dir: &self.output_dir,
            events_path: &self.events_path,
        }
    }

    /// Run settings rooted in this workspace.
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            provider: "google".to_string(),
            model: "gemini-test".to_string(),
            credential: "test-key".to_string(),
            max_steps: 10,
            timeout: Duration::from_secs(60),
            confidence_threshold: 0.9,
            output_dir: self.output_dir.clone(),
            project_root: None,
            work_dir: self.root.clone(),
            log_dir: self.root.join("logs"),
            config_path: None,
            verbose: false,
            charge_low_confidence_steps: true,
        }
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Model reply requesting `tool` with `args`.
pub fn tool_call(tool: &str, args: Value, confidence: f64) -> String {
    json!({
        "type": "tool_call",
        "confidence": confidence,
        "rationale": format!("call {tool}"),
        "tool": tool,
        "args": args,
    })
    .to_string()
}

/// Model reply finishing the run with `manifest`.
pub fn final_envelope(manifest: Value, confidence: f64) -> String {
    json!({
        "type": "final",
        "confidence": confidence,
        "rationale": "documentation complete",
        "manifest": manifest,
    })
    .to_string()
}

/// Model reply asking the operator `questions`.
pub fn clarification<I>(questions: I, confidence: f64) -> String
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let questions: Vec<String> = questions.into_iter().map(Into::into).collect();
    json!({
        "type": "clarification",
        "confidence": confidence,
        "rationale": "need more detail",
        "questions": questions,
    })
    .to_string()
}
