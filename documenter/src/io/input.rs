//! Transcript loading.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::io::config::{AgentConfig, expand_home};

/// Resolve the transcript argument to a file path.
///
/// With an active project, a bare file name (no path separator) refers to
/// `<project>/transcripts/<name>`.
pub fn resolve_transcript_path(raw: &str, cfg: &AgentConfig, home: &Path) -> PathBuf {
    if let Some(project) = &cfg.project
        && !raw.contains('/')
        && !raw.contains('\\')
    {
        return expand_home(&project.root_dir, home)
            .join("transcripts")
            .join(raw);
    }
    expand_home(raw, home)
}

/// Read and validate a transcript file.
pub fn read_transcript(path: &Path) -> Result<String> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read transcript {}", path.display()))?;
    if contents.trim().is_empty() {
        bail!("transcript {} is empty", path.display());
    }
    Ok(contents)
}
