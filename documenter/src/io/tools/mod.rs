//! Tool registry and dispatcher.
//!
//! Every capability the model may invoke is a [`Tool`] registered by wire name in a
//! [`ToolRegistry`]. Dispatch never fails outward: unknown tools, malformed arguments, sandbox
//! rejections and tool errors all come back as an unsuccessful [`ToolResult`].

mod args;
pub mod fetch_docs;
pub mod list_dir;
pub mod log_event;
pub mod read_file;
pub mod render_image;
pub mod user_input;
pub mod write_file;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub use args::parse_args;

use crate::core::render_diagnostics::{RenderFailure, SYNTAX_HINT};
use crate::core::types::ToolResult;
use crate::io::operator::Operator;
use crate::io::renderer::Renderer;
use crate::io::sandbox::{Sandbox, SandboxViolation};

use fetch_docs::{DocFetcher, FetchMermaidDocumentation};
use list_dir::ReadDirectories;
use log_event::LogEvent;
use read_file::ReadFileContents;
use render_image::GenerateMermaidImage;
use user_input::GetUserInput;
use write_file::WriteFileContents;

/// Typed failure reasons for a tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("invalid arguments: missing required field `{0}`")]
    MissingField(String),
    #[error("path rejected: {0}")]
    PathRejected(#[from] SandboxViolation),
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} already exists and overwrite is explicit")]
    AlreadyExists(String),
    #[error("http request failed: {0}")]
    Http(String),
    #[error("operator input failed: {0}")]
    Operator(String),
    #[error(
        "{program} is not installed; install it with: npm install -g @mermaid-js/mermaid-cli"
    )]
    SubprocessNotFound { program: String },
    #[error("subprocess failed: {0}")]
    SubprocessFailed(String),
    #[error(transparent)]
    Render(#[from] RenderFailure),
}

impl ToolError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        ToolError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Guidance for the model beyond the failure message itself.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ToolError::Render(failure) if failure.is_syntax_error() => Some(SYNTAX_HINT),
            _ => None,
        }
    }
}

/// Per-run state a tool may use.
#[derive(Clone, Copy)]
pub struct ToolContext<'a> {
    pub run_id: &'a str,
    pub sandbox: &'a Sandbox,
    pub operator: &'a dyn Operator,
    /// Directory relative image outputs resolve under.
    pub output_dir: &'a Path,
    /// JSONL file `logEvent` appends to.
    pub events_path: &'a Path,
}

/// A capability the model can invoke by name.
pub trait Tool {
    /// Wire name used in `tool_call` decisions.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON Schema (Draft 2020-12) of the arguments object.
    fn schema(&self) -> Value;

    /// Run the tool. `args` is always a JSON object.
    fn invoke(&self, args: &Value, ctx: &ToolContext<'_>) -> Result<Value, ToolError>;
}

/// Tool description as advertised to the model.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Named collection of tools; built once per process and shared by reference.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the seven built-in tools.
    pub fn with_defaults(renderer: Box<dyn Renderer>, fetcher: Box<dyn DocFetcher>) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Box::new(ReadDirectories))?;
        registry.register(Box::new(ReadFileContents))?;
        registry.register(Box::new(WriteFileContents))?;
        registry.register(Box::new(FetchMermaidDocumentation::new(fetcher)))?;
        registry.register(Box::new(LogEvent))?;
        registry.register(Box::new(GetUserInput))?;
        registry.register(Box::new(GenerateMermaidImage::new(renderer)))?;
        Ok(registry)
    }

    /// Add a tool. Names must be unique.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<()> {
        let name = tool.name();
        if self.tools.contains_key(name) {
            bail!("tool already registered: {name}");
        }
        debug!(tool = name, "registering tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Specs for every tool, sorted by name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.schema(),
            })
            .collect()
    }

    /// Invoke `name` with JSON-encoded arguments.
    pub fn dispatch(&self, name: &str, args_json: &str, ctx: &ToolContext<'_>) -> ToolResult {
        match self.try_dispatch(name, args_json, ctx) {
            Ok(payload) => ToolResult::success(payload),
            Err(err) => {
                warn!(tool = name, error = %err, "tool failed");
                let result = ToolResult::failure(err.to_string());
                match err.hint() {
                    Some(hint) => result.with_hint(hint),
                    None => result,
                }
            }
        }
    }

    fn try_dispatch(
        &self,
        name: &str,
        args_json: &str,
        ctx: &ToolContext<'_>,
    ) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let args: Value = serde_json::from_str(args_json)
            .map_err(|err| ToolError::InvalidArguments(err.to_string()))?;
        if !args.is_object() {
            return Err(ToolError::InvalidArguments(
                "arguments must be a JSON object".to_string(),
            ));
        }
        debug!(tool = name, "dispatching tool");
        tool.invoke(&args, ctx)
    }
}

/// Resolve a path argument through the sandbox.
pub(crate) fn sandboxed(ctx: &ToolContext<'_>, raw: &str) -> Result<PathBuf, ToolError> {
    Ok(ctx.sandbox.validate(raw)?)
}
