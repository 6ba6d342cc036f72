//! `readFileContents`: bounded text read.

use std::fs::File;
use std::io::Read;

use serde::Deserialize;
use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolError, parse_args, sandboxed};

/// Default read cap (1 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Args {
    path: String,
    max_bytes: Option<u64>,
}

pub struct ReadFileContents;

impl Tool for ReadFileContents {
    fn name(&self) -> &'static str {
        "readFileContents"
    }

    fn description(&self) -> &'static str {
        "Read a text file, truncated to maxBytes (default 1 MiB)."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File to read" },
                "maxBytes": { "type": "integer", "minimum": 1, "description": "Read at most this many bytes" }
            },
            "required": ["path"]
        })
    }

    fn invoke(&self, args: &Value, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        let args: Args = parse_args(&self.schema(), args)?;
        let path = sandboxed(ctx, &args.path)?;
        let max_bytes = args.max_bytes.unwrap_or(DEFAULT_MAX_BYTES);

        let file = File::open(&path).map_err(|err| ToolError::io(&path, err))?;
        let mut buf = Vec::new();
        file.take(max_bytes.saturating_add(1))
            .read_to_end(&mut buf)
            .map_err(|err| ToolError::io(&path, err))?;
        let limit = usize::try_from(max_bytes).unwrap_or(usize::MAX);
        let truncated = buf.len() > limit;
        buf.truncate(limit);

        Ok(json!({
            "path": path.display().to_string(),
            "content": String::from_utf8_lossy(&buf),
            "truncated": truncated,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedOperator, TestWorkspace};

    #[test]
    fn reads_whole_small_file() {
        let workspace = TestWorkspace::new();
        workspace.write("notes.md", "# Notes\n");
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let ctx = workspace.context(&operator);
        let payload = ReadFileContents
            .invoke(&json!({"path": "notes.md"}), &ctx)
            .expect("read");
        assert_eq!(payload["content"], json!("# Notes\n"));
        assert_eq!(payload["truncated"], json!(false));
    }

    #[test]
    fn truncates_at_max_bytes() {
        let workspace = TestWorkspace::new();
        workspace.write("long.md", "abcdefghij");
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let ctx = workspace.context(&operator);
        let payload = ReadFileContents
            .invoke(&json!({"path": "long.md", "maxBytes": 4}), &ctx)
            .expect("read");
        assert_eq!(payload["content"], json!("abcd"));
        assert_eq!(payload["truncated"], json!(true));
    }

    #[test]
    fn exact_size_is_not_truncated() {
        let workspace = TestWorkspace::new();
        workspace.write("four.md", "abcd");
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let ctx = workspace.context(&operator);
        let payload = ReadFileContents
            .invoke(&json!({"path": "four.md", "maxBytes": 4}), &ctx)
            .expect("read");
        assert_eq!(payload["truncated"], json!(false));
    }
}
