//! `readDirectories`: list one directory level.

use std::fs;

use serde::Deserialize;
use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolError, parse_args, sandboxed};

#[derive(Debug, Deserialize)]
struct Args {
    path: String,
}

pub struct ReadDirectories;

impl Tool for ReadDirectories {
    fn name(&self) -> &'static str {
        "readDirectories"
    }

    fn description(&self) -> &'static str {
        "List the subdirectories and files directly inside a directory."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to list" }
            },
            "required": ["path"]
        })
    }

    fn invoke(&self, args: &Value, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        let args: Args = parse_args(&self.schema(), args)?;
        let dir = sandboxed(ctx, &args.path)?;

        let mut directories = Vec::new();
        let mut files = Vec::new();
        let entries = fs::read_dir(&dir).map_err(|err| ToolError::io(&dir, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| ToolError::io(&dir, err))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_dir() {
                directories.push(name);
            } else {
                files.push(name);
            }
        }
        directories.sort();
        files.sort();

        Ok(json!({
            "path": dir.display().to_string(),
            "directories": directories,
            "files": files,
        }))
    }
}
