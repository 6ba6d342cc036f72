//! `writeFileContents`: atomic file write.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::{Tool, ToolContext, ToolError, parse_args, sandboxed};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Overwrite {
    /// Refuse to replace an existing file.
    Explicit,
    #[default]
    Allow,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Args {
    path: String,
    content: String,
    #[serde(default = "default_true")]
    create_dirs: bool,
    #[serde(default)]
    overwrite: Overwrite,
}

pub struct WriteFileContents;

impl Tool for WriteFileContents {
    fn name(&self) -> &'static str {
        "writeFileContents"
    }

    fn description(&self) -> &'static str {
        "Write text content to a file, creating parent directories by default."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File to write" },
                "content": { "type": "string", "description": "Full file content" },
                "createDirs": { "type": "boolean", "description": "Create missing parent directories (default true)" },
                "overwrite": { "type": "string", "enum": ["explicit", "allow"], "description": "'explicit' fails if the file exists; 'allow' replaces it (default)" }
            },
            "required": ["path", "content"]
        })
    }

    fn invoke(&self, args: &Value, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        let args: Args = parse_args(&self.schema(), args)?;
        let path = sandboxed(ctx, &args.path)?;

        if args.overwrite == Overwrite::Explicit && path.exists() {
            return Err(ToolError::AlreadyExists(path.display().to_string()));
        }
        if let Some(parent) = path.parent()
            && args.create_dirs
        {
            fs::create_dir_all(parent).map_err(|err| ToolError::io(parent, err))?;
        }

        write_atomic(&path, args.content.as_bytes())?;
        info!(path = %path.display(), bytes = args.content.len(), "wrote file");

        Ok(json!({
            "path": path.display().to_string(),
            "bytesWritten": args.content.len(),
        }))
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ToolError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| ToolError::InvalidArguments(format!("{} is not a file path", path.display())))?;
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));
    fs::write(&tmp_path, contents).map_err(|err| ToolError::io(&tmp_path, err))?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(ToolError::io(path, err));
    }
    Ok(())
}
