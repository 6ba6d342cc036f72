//! Lexical repair passes for nearly-JSON model output.
//!
//! Each pass is string-literal aware: quoted content and escape sequences are
//! never rewritten, and braces inside strings never change the depth.

/// Split text that concatenates objects with no separator (`...}{...`).
///
/// Braces are reattached to each fragment and trailing commas are repaired.
/// Only fragments that then parse as a JSON object are returned, in input
/// order. When the first fragment is not an object on its own (chatter before
/// it, or a `}{` inside a string) nothing is returned.
pub fn split_concatenated(text: &str) -> Vec<String> {
    if !text.contains("}{") {
        return Vec::new();
    }
    let parts: Vec<&str> = text.split("}{").collect();
    let last = parts.len() - 1;
    let fragments: Vec<String> = parts
        .iter()
        .enumerate()
        .map(|(i, part)| match i {
            0 => format!("{part}}}"),
            i if i == last => format!("{{{part}"),
            _ => format!("{{{part}}}"),
        })
        .map(|fragment| strip_trailing_commas(&fragment))
        .collect();
    if !fragments.first().is_some_and(|first| is_json_object(first)) {
        return Vec::new();
    }
    fragments
        .into_iter()
        .filter(|candidate| is_json_object(candidate))
        .collect()
}

/// Extract every balanced top-level `{...}` span from `text`.
///
/// Text outside objects (chatter before, between or after) is skipped. The
/// spans are not validated; callers repair and parse them.
pub fn scan_objects(text: &str) -> Vec<String> {
    let mut objects = Vec::new();
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' if start.is_some() => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(idx);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0
                    && let Some(begin) = start.take()
                {
                    objects.push(text[begin..=idx].to_string());
                }
            }
            _ => {}
        }
    }

    objects
}

/// Remove commas that directly precede `}` or `]` (whitespace allowed between).
pub fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        if ch == '"' {
            in_string = true;
            out.push(ch);
            continue;
        }
        if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }

    out
}

/// Whether `text` parses as a single JSON object.
pub fn is_json_object(text: &str) -> bool {
    matches!(
        serde_json::from_str::<serde_json::Value>(text),
        Ok(serde_json::Value::Object(_))
    )
}
