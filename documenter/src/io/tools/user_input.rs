//! `getUserInput`: ask the operator a question mid-run.

use serde::Deserialize;
use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolError, parse_args};

#[derive(Debug, Deserialize)]
struct Args {
    prompt: String,
}

pub struct GetUserInput;

impl Tool for GetUserInput {
    fn name(&self) -> &'static str {
        "getUserInput"
    }

    fn description(&self) -> &'static str {
        "Ask the operator a question and wait for a one-line answer."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string", "description": "Question to show the operator" }
            },
            "required": ["prompt"]
        })
    }

    fn invoke(&self, args: &Value, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        let args: Args = parse_args(&self.schema(), args)?;
        let answer = ctx
            .operator
            .ask(&args.prompt)
            .map_err(|err| ToolError::Operator(format!("{err:#}")))?;
        Ok(json!({ "answer": answer.trim() }))
    }
}
