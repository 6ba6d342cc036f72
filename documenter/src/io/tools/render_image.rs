//! `generateMermaidImage`: render a Mermaid markdown file to an image.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::{Tool, ToolContext, ToolError, parse_args, sandboxed};
use crate::core::render_diagnostics::{RenderFailure, classify};
use crate::io::process::is_not_found;
use crate::io::renderer::{ImageFormat, RenderRequest, Renderer};

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Args {
    input_file: String,
    output_file: String,
    #[serde(default)]
    format: ImageFormat,
    #[serde(default = "default_true")]
    create_dirs: bool,
}

pub struct GenerateMermaidImage {
    renderer: Box<dyn Renderer>,
}

impl GenerateMermaidImage {
    pub fn new(renderer: Box<dyn Renderer>) -> Self {
        Self { renderer }
    }
}

/// Place a relative output under `output_dir` and ensure it ends in `.ext`.
fn resolve_output(raw: &str, output_dir: &Path, format: ImageFormat) -> String {
    let suffix = format!(".{}", format.extension());
    let mut name = raw.to_string();
    if !name.ends_with(&suffix) {
        name.push_str(&suffix);
    }
    if Path::new(&name).is_absolute() || name.starts_with('~') {
        name
    } else {
        output_dir.join(name).display().to_string()
    }
}

impl Tool for GenerateMermaidImage {
    fn name(&self) -> &'static str {
        "generateMermaidImage"
    }

    fn description(&self) -> &'static str {
        "Render a markdown file containing one Mermaid diagram to svg, png, or pdf."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "inputFile": { "type": "string", "description": "Markdown file with a ```mermaid block" },
                "outputFile": { "type": "string", "description": "Image path; relative paths land in the output directory" },
                "format": { "type": "string", "enum": ["svg", "png", "pdf"], "description": "Image format (default svg)" },
                "createDirs": { "type": "boolean", "description": "Create missing output directories (default true)" }
            },
            "required": ["inputFile", "outputFile"]
        })
    }

    fn invoke(&self, args: &Value, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        let args: Args = parse_args(&self.schema(), args)?;
        let input = sandboxed(ctx, &args.input_file)?;
        let output = sandboxed(
            ctx,
            &resolve_output(&args.output_file, ctx.output_dir, args.format),
        )?;

        if !input.is_file() {
            return Err(ToolError::io(
                &input,
                std::io::Error::new(std::io::ErrorKind::NotFound, "input file does not exist"),
            ));
        }
        if let Some(parent) = output.parent()
            && args.create_dirs
        {
            fs::create_dir_all(parent).map_err(|err| ToolError::io(parent, err))?;
        }

        let rendered = self
            .renderer
            .render(&RenderRequest {
                input: &input,
                output: &output,
                format: args.format,
            })
            .map_err(|err| {
                if is_not_found(&err) {
                    ToolError::SubprocessNotFound {
                        program: "Mermaid CLI (mmdc)".to_string(),
                    }
                } else {
                    ToolError::SubprocessFailed(format!("{err:#}"))
                }
            })?;

        let input_display = input.display().to_string();
        let output_display = output.display().to_string();
        if !rendered.success {
            return Err(classify(&rendered.diagnostics, &input_display, &output_display).into());
        }
        if !output.exists() {
            return Err(RenderFailure::OutputNotProduced {
                output: output_display,
            }
            .into());
        }
        info!(output = %output_display, "rendered diagram");

        Ok(json!({
            "inputFile": input_display,
            "outputFile": output_display,
            "format": args.format.extension(),
            "commandOutput": rendered.diagnostics,
        }))
    }
}
