//! System prompt and opening turn for a documentation run.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::io::tools::ToolSpec;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");

/// Tool entry as rendered into the prompt.
#[derive(Debug, Clone, Serialize)]
struct ToolContext {
    name: String,
    description: String,
    schema: String,
}

/// Inputs for the system prompt.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub tools: &'a [ToolSpec],
    pub provider: &'a str,
    pub output_dir: &'a str,
    pub confidence_threshold: f64,
}

/// Render the system prompt.
pub fn render_system_prompt(inputs: &PromptInputs<'_>) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("system", SYSTEM_TEMPLATE)
        .context("load system template")?;
    let tools: Vec<ToolContext> = inputs
        .tools
        .iter()
        .map(|spec| ToolContext {
            name: spec.name.clone(),
            description: spec.description.clone(),
            schema: spec.parameters.to_string(),
        })
        .collect();
    let template = env.get_template("system")?;
    let rendered = template
        .render(context! {
            tools => tools,
            provider => inputs.provider,
            output_dir => inputs.output_dir,
            threshold => format!("{:.2}", inputs.confidence_threshold),
        })
        .context("render system prompt")?;
    Ok(rendered)
}

/// Opening user turn carrying the transcript.
pub fn task_message(transcript: &str) -> String {
    format!(
        "Please analyze this application transcript and generate Mermaid documentation:\n\n{}",
        transcript.trim()
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn specs() -> Vec<ToolSpec> {
        vec![ToolSpec {
            name: "writeFileContents".to_string(),
            description: "Write a file".to_string(),
            parameters: json!({"type": "object", "required": ["path", "content"]}),
        }]
    }

    #[test]
    fn system_prompt_lists_tools_and_threshold() {
        let tools = specs();
        let prompt = render_system_prompt(&PromptInputs {
            tools: &tools,
            provider: "google",
            output_dir: "/work/out",
            confidence_threshold: 0.9,
        })
        .expect("render");
        assert!(prompt.contains("- writeFileContents: Write a file"));
        assert!(prompt.contains(r#""required":["path","content"]"#));
        assert!(prompt.contains("confidence 0.90"));
        assert!(prompt.contains("/work/out"));
        assert!(!prompt.contains("ORDERING:"));
    }

    #[test]
    fn openai_gets_ordering_rules() {
        let tools = specs();
        let prompt = render_system_prompt(&PromptInputs {
            tools: &tools,
            provider: "openai",
            output_dir: "/work/out",
            confidence_threshold: 0.9,
        })
        .expect("render");
        assert!(prompt.contains("ORDERING:"));
    }

    #[test]
    fn task_message_embeds_transcript() {
        let message = task_message("  User signs up.\n");
        assert!(message.ends_with("documentation:\n\nUser signs up."));
    }
}
