//! Rewriting of relative path arguments before dispatch.

use std::path::Path;

use serde_json::{Map, Value};

/// Argument keys that conventionally carry the tool's primary file path.
pub const PATH_ARGUMENT_KEYS: [&str; 2] = ["path", "inputFile"];

/// Return a copy of `args` with relative path arguments joined onto `output_dir`.
///
/// Absolute paths and `~`-prefixed paths are left untouched; the sandbox decides
/// whether they are acceptable. Non-string values are left as-is for the
/// dispatcher's schema check to reject.
pub fn rewrite_relative_paths(args: &Map<String, Value>, output_dir: &Path) -> Map<String, Value> {
    let mut rewritten = args.clone();
    for key in PATH_ARGUMENT_KEYS {
        let Some(Value::String(raw)) = args.get(key) else {
            continue;
        };
        if is_relative(raw) {
            let joined = output_dir.join(raw);
            rewritten.insert(key.to_string(), Value::String(joined.display().to_string()));
        }
    }
    rewritten
}

fn is_relative(raw: &str) -> bool {
    !raw.is_empty() && !raw.starts_with('~') && !Path::new(raw).is_absolute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn relative_path_is_prefixed() {
        let out = Path::new("/work/out");
        let rewritten = rewrite_relative_paths(
            &args(json!({"path": "summary.md", "content": "x"})),
            out,
        );
        assert_eq!(rewritten["path"], json!("/work/out/summary.md"));
        assert_eq!(rewritten["content"], json!("x"));
    }

    #[test]
    fn input_file_is_rewritten_but_output_file_is_not() {
        let out = Path::new("/work/out");
        let rewritten = rewrite_relative_paths(
            &args(json!({"inputFile": "a.md", "outputFile": "a"})),
            out,
        );
        assert_eq!(rewritten["inputFile"], json!("/work/out/a.md"));
        assert_eq!(rewritten["outputFile"], json!("a"));
    }

    #[test]
    fn absolute_and_home_paths_are_untouched() {
        let out = Path::new("/work/out");
        let original = args(json!({"path": "/etc/passwd", "inputFile": "~/notes.md"}));
        let rewritten = rewrite_relative_paths(&original, out);
        assert_eq!(rewritten, original);
    }

    #[test]
    fn non_string_path_is_left_for_validation() {
        let out = Path::new("/work/out");
        let original = args(json!({"path": 7}));
        assert_eq!(rewrite_relative_paths(&original, out), original);
    }
}
