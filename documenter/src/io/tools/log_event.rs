//! `logEvent`: append a model-authored event to the run's events file.

use std::fs::{self, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolError, parse_args};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Deserialize)]
struct Args {
    level: Level,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Serialize)]
struct EventRecord<'a> {
    timestamp: String,
    run_id: &'a str,
    level: Level,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Value>,
}

pub struct LogEvent;

impl Tool for LogEvent {
    fn name(&self) -> &'static str {
        "logEvent"
    }

    fn description(&self) -> &'static str {
        "Record a progress event in the run's event log."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "level": { "type": "string", "enum": ["debug", "info", "warn", "error"] },
                "message": { "type": "string" },
                "data": { "description": "Optional structured context" }
            },
            "required": ["level", "message"]
        })
    }

    fn invoke(&self, args: &Value, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        let args: Args = parse_args(&self.schema(), args)?;
        let record = EventRecord {
            timestamp: Utc::now().to_rfc3339(),
            run_id: ctx.run_id,
            level: args.level,
            message: &args.message,
            data: args.data.as_ref(),
        };
        let mut line = serde_json::to_string(&record)
            .map_err(|err| ToolError::InvalidArguments(err.to_string()))?;
        line.push('\n');

        let path = ctx.events_path;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| ToolError::io(parent, err))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| ToolError::io(path, err))?;
        file.write_all(line.as_bytes())
            .map_err(|err| ToolError::io(path, err))?;

        Ok(json!({ "logged": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedOperator, TestWorkspace};

    #[test]
    fn appends_one_line_per_event() {
        let workspace = TestWorkspace::new();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let ctx = workspace.context(&operator);
        LogEvent
            .invoke(&json!({"level": "info", "message": "started"}), &ctx)
            .expect("log");
        LogEvent
            .invoke(
                &json!({"level": "warn", "message": "odd", "data": {"step": 2}}),
                &ctx,
            )
            .expect("log");

        let contents = fs::read_to_string(workspace.events_path()).expect("read events");
        let lines: Vec<Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["level"], json!("info"));
        assert_eq!(lines[0]["run_id"], json!(workspace.run_id()));
        assert!(lines[0].get("data").is_none());
        assert_eq!(lines[1]["data"]["step"], json!(2));
    }

    #[test]
    fn invalid_level_is_rejected() {
        let workspace = TestWorkspace::new();
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let ctx = workspace.context(&operator);
        let err = LogEvent
            .invoke(&json!({"level": "fatal", "message": "x"}), &ctx)
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
