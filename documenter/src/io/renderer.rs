//! Mermaid rendering through an external CLI.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::io::config::RendererConfig;
use crate::io::process::run_command_with_timeout;

/// Image formats the renderer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Svg,
    Png,
    Pdf,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Svg => "svg",
            ImageFormat::Png => "png",
            ImageFormat::Pdf => "pdf",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub format: ImageFormat,
}

/// What the renderer printed, and whether it exited cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutput {
    pub success: bool,
    pub diagnostics: String,
}

/// Diagram renderer boundary.
///
/// Implementations return `Err` only when the renderer could not be run at all; a spawn
/// failure for a missing executable keeps its [`std::io::Error`] in the chain.
pub trait Renderer {
    fn render(&self, request: &RenderRequest<'_>) -> Result<RenderOutput>;
}

/// Runs the Mermaid CLI (`mmdc -i IN -o OUT`).
#[derive(Debug, Clone)]
pub struct MmdcRenderer {
    program: String,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl MmdcRenderer {
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            program: config.program.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl Renderer for MmdcRenderer {
    fn render(&self, request: &RenderRequest<'_>) -> Result<RenderOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-i")
            .arg(request.input)
            .arg("-o")
            .arg(request.output);
        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)?;
        let mut diagnostics = output.combined_text();
        if output.timed_out {
            diagnostics.push_str(&format!(
                "\nrenderer timed out after {}s",
                self.timeout.as_secs()
            ));
        }
        Ok(RenderOutput {
            success: output.success(),
            diagnostics,
        })
    }
}
