//! Classification of Mermaid CLI diagnostics into actionable failures.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static CHART_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Found (\d+) mermaid charts").expect("chart count pattern should be valid")
});
static LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error on line (\d+)").expect("line pattern should be valid")
});

/// Why the renderer did not produce an image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderFailure {
    #[error(
        "no Mermaid diagrams found in {input}; wrap each diagram in a ```mermaid code block"
    )]
    DiagramNotFound { input: String },
    #[error(
        "{count} diagrams in {input} conflict; split them into one file per diagram type"
    )]
    MultipleDiagrams { input: String, count: u32 },
    #[error("{}", syntax_message(.line, .detail))]
    SyntaxError { line: Option<u32>, detail: String },
    #[error("renderer exited without producing {output}")]
    OutputNotProduced { output: String },
    #[error("renderer failed: {detail}")]
    Unclassified { detail: String },
}

/// Guidance appended to corrective turns after a syntax failure.
pub const SYNTAX_HINT: &str = "Check the diagram against the Mermaid syntax docs. ER attributes take plain names without types, and participant names must avoid special characters.";

impl RenderFailure {
    pub fn is_syntax_error(&self) -> bool {
        matches!(self, RenderFailure::SyntaxError { .. })
    }
}

fn syntax_message(line: &Option<u32>, detail: &str) -> String {
    let location = match line {
        Some(line) => format!("Mermaid syntax error on line {line}"),
        None => "Mermaid syntax error".to_string(),
    };
    format!("{location}: {detail}")
}

/// Classify combined renderer output for a failed invocation.
pub fn classify(diagnostics: &str, input: &str, output: &str) -> RenderFailure {
    let detail = diagnostics.trim().to_string();

    if diagnostics.contains("No diagram found") {
        return RenderFailure::DiagramNotFound {
            input: input.to_string(),
        };
    }
    if let Some(count) = CHART_COUNT_RE
        .captures(diagnostics)
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .filter(|count| *count > 1)
    {
        return RenderFailure::MultipleDiagrams {
            input: input.to_string(),
            count,
        };
    }
    if let Some(line) = LINE_RE
        .captures(diagnostics)
        .and_then(|caps| caps[1].parse::<u32>().ok())
    {
        return RenderFailure::SyntaxError {
            line: Some(line),
            detail,
        };
    }
    if diagnostics.contains("Syntax error") || diagnostics.contains("parseError") {
        return RenderFailure::SyntaxError { line: None, detail };
    }
    if diagnostics.contains("Output file was not created") {
        return RenderFailure::OutputNotProduced {
            output: output.to_string(),
        };
    }
    RenderFailure::Unclassified { detail }
}
