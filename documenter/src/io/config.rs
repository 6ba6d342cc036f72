//! Agent configuration stored under `~/mermaid-agent-documenter/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the private working directory under the user's home.
pub const APP_DIR_NAME: &str = "mermaid-agent-documenter";

/// Subdirectories every project root carries.
pub const PROJECT_DIRS: [&str; 3] = ["transcripts", "out", "logs"];

/// Model providers with built-in HTTP clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Openai,
    Anthropic,
    Google,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Openai,
        ProviderKind::Anthropic,
        ProviderKind::Google,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Openai => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
        }
    }

    /// Environment variable consulted when no secret is configured.
    pub fn api_key_env(self) -> &'static str {
        match self {
            ProviderKind::Openai => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::Google => "GOOGLE_API_KEY",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Openai => "gpt-5-mini",
            ProviderKind::Anthropic => "claude-3-5-sonnet-latest",
            ProviderKind::Google => "gemini-2.5-flash",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid provider '{0}'; supported providers: openai, anthropic, google")]
pub struct UnknownProvider(String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| UnknownProvider(raw.to_string()))
    }
}

/// Agent configuration (TOML).
///
/// Missing fields default to the values of [`AgentConfig::default`]. Paths may
/// start with `~/`; they are expanded by [`expand_home`] when a run is planned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub provider: ProviderKind,

    /// Model id per provider.
    pub models: BTreeMap<ProviderKind, String>,

    /// Decisions below this confidence are never acted on.
    pub confidence_threshold: f64,

    /// Private working area; always a sandbox root.
    pub work_dir: String,

    /// Output directory used when no project is active.
    pub out_dir: String,

    /// Whether low-confidence iterations consume a unit of the step budget.
    pub charge_low_confidence_steps: bool,

    pub limits: LimitsConfig,
    pub log: LogConfig,
    pub renderer: RendererConfig,
    pub docs: DocsConfig,

    /// API keys per provider. Takes precedence over environment variables.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub secrets: BTreeMap<ProviderKind, String>,

    /// Active project; adds its root to the sandbox and redirects output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_steps: u32,
    pub run_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Directory holding per-run JSONL logs.
    pub dir: String,
    /// Also record the full transcript and raw response of every step.
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RendererConfig {
    /// Mermaid CLI executable.
    pub program: String,
    pub timeout_secs: u64,
    /// Truncate captured renderer output beyond this many bytes.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DocsConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    pub name: String,
    pub root_dir: String,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_steps: 25,
            run_timeout_secs: 300,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: format!("~/{APP_DIR_NAME}/logs"),
            verbose: false,
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            program: "mmdc".to_string(),
            timeout_secs: 120,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://mermaid.js.org".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Openai,
            models: ProviderKind::ALL
                .iter()
                .map(|kind| (*kind, kind.default_model().to_string()))
                .collect(),
            confidence_threshold: 0.90,
            work_dir: format!("~/{APP_DIR_NAME}"),
            out_dir: format!("~/{APP_DIR_NAME}/output"),
            charge_low_confidence_steps: true,
            limits: LimitsConfig::default(),
            log: LogConfig::default(),
            renderer: RendererConfig::default(),
            docs: DocsConfig::default(),
            secrets: BTreeMap::new(),
            project: None,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!("confidence_threshold must be within [0, 1]"));
        }
        if self.limits.max_steps == 0 {
            return Err(anyhow!("limits.max_steps must be > 0"));
        }
        if self.limits.run_timeout_secs == 0 {
            return Err(anyhow!("limits.run_timeout_secs must be > 0"));
        }
        if self.renderer.program.trim().is_empty() {
            return Err(anyhow!("renderer.program must be non-empty"));
        }
        if self.renderer.timeout_secs == 0 {
            return Err(anyhow!("renderer.timeout_secs must be > 0"));
        }
        if self.renderer.output_limit_bytes == 0 {
            return Err(anyhow!("renderer.output_limit_bytes must be > 0"));
        }
        if self.work_dir.trim().is_empty() {
            return Err(anyhow!("work_dir must be non-empty"));
        }
        if let Some(project) = &self.project
            && project.root_dir.trim().is_empty()
        {
            return Err(anyhow!("project.root_dir must be non-empty"));
        }
        Ok(())
    }

    /// Model id for the active provider.
    pub fn model(&self) -> String {
        self.model_for(self.provider)
    }

    /// Configured model for `provider`, else its built-in default.
    pub fn model_for(&self, provider: ProviderKind) -> String {
        self.models
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| provider.default_model().to_string())
    }

    /// API key for the active provider: configured secret, then environment.
    pub fn api_key(&self) -> Option<String> {
        if let Some(key) = self.secrets.get(&self.provider).filter(|k| !k.is_empty()) {
            return Some(key.clone());
        }
        std::env::var(self.provider.api_key_env())
            .ok()
            .filter(|k| !k.is_empty())
    }

    /// Output directory: `<project>/out` with an active project, else `out_dir`.
    pub fn output_dir(&self, home: &Path) -> PathBuf {
        match &self.project {
            Some(project) => expand_home(&project.root_dir, home).join("out"),
            None => expand_home(&self.out_dir, home),
        }
    }
}

/// Create `<parent>/<name>` with the standard project subdirectories.
pub fn init_project(parent: &Path, name: &str) -> Result<ProjectConfig> {
    let name = name.trim();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        bail!("invalid project name '{name}'");
    }
    let root = parent.join(name);
    for dir in PROJECT_DIRS {
        let path = root.join(dir);
        fs::create_dir_all(&path).with_context(|| format!("create {}", path.display()))?;
    }
    let root = root
        .canonicalize()
        .with_context(|| format!("canonicalize {}", root.display()))?;
    Ok(ProjectConfig {
        name: name.to_string(),
        root_dir: root.display().to_string(),
    })
}

/// Adopt an existing directory as the project; also returns the missing subdirectories.
pub fn open_project(dir: &Path) -> Result<(ProjectConfig, Vec<&'static str>)> {
    let root = dir
        .canonicalize()
        .with_context(|| format!("project directory {} does not exist", dir.display()))?;
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }
    let name = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{} has no directory name", root.display()))?;
    let missing = PROJECT_DIRS
        .into_iter()
        .filter(|sub| !root.join(sub).is_dir())
        .collect();
    Ok((
        ProjectConfig {
            name,
            root_dir: root.display().to_string(),
        },
        missing,
    ))
}

/// Mask a secret for display, keeping the first and last four characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "***hidden***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Expand a leading `~` or `~/` against `home`.
pub fn expand_home(raw: &str, home: &Path) -> PathBuf {
    if raw == "~" {
        return home.to_path_buf();
    }
    match raw.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None => PathBuf::from(raw),
    }
}

/// The current user's home directory.
pub fn home_dir() -> Result<PathBuf> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or_else(|| anyhow!("could not determine home directory"))
}

/// Default config location under the private working area.
pub fn default_config_path(home: &Path) -> PathBuf {
    home.join(APP_DIR_NAME).join("config.toml")
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AgentConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let mut cfg = AgentConfig::default();
        cfg.provider = ProviderKind::Anthropic;
        cfg.secrets
            .insert(ProviderKind::Anthropic, "sk-ant-123456789".to_string());
        cfg.project = Some(ProjectConfig {
            name: "billing".to_string(),
            root_dir: "/srv/billing".to_string(),
        });
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "provider = \"google\"\n[limits]\nmax_steps = 5\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.provider, ProviderKind::Google);
        assert_eq!(cfg.limits.max_steps, 5);
        assert_eq!(cfg.limits.run_timeout_secs, 300);
        assert_eq!(cfg.model(), "gemini-2.5-flash");
    }

    #[test]
    fn invalid_threshold_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "confidence_threshold = 1.5\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("confidence_threshold"));
    }

    #[test]
    fn configured_secret_wins() {
        let mut cfg = AgentConfig::default();
        cfg.secrets
            .insert(ProviderKind::Openai, "sk-configured".to_string());
        assert_eq!(cfg.api_key().as_deref(), Some("sk-configured"));
    }

    #[test]
    fn project_redirects_output_dir() {
        let home = Path::new("/home/ada");
        let mut cfg = AgentConfig::default();
        assert_eq!(
            cfg.output_dir(home),
            PathBuf::from("/home/ada/mermaid-agent-documenter/output")
        );
        cfg.project = Some(ProjectConfig {
            name: "p".to_string(),
            root_dir: "~/projects/p".to_string(),
        });
        assert_eq!(cfg.output_dir(home), PathBuf::from("/home/ada/projects/p/out"));
    }

    #[test]
    fn secrets_are_masked() {
        assert_eq!(mask_secret("sk-1234567890abcd"), "sk-1...abcd");
        assert_eq!(mask_secret("short"), "***hidden***");
    }

    #[test]
    fn provider_names_parse_case_insensitively() {
        assert_eq!("Anthropic".parse::<ProviderKind>(), Ok(ProviderKind::Anthropic));
        assert_eq!(" google ".parse::<ProviderKind>(), Ok(ProviderKind::Google));
        let err = "mistral".parse::<ProviderKind>().unwrap_err();
        assert!(err.to_string().contains("invalid provider 'mistral'"));
    }

    #[test]
    fn model_for_falls_back_per_provider() {
        let mut cfg = AgentConfig::default();
        cfg.models.insert(ProviderKind::Google, "gemini-exp".to_string());
        assert_eq!(cfg.model_for(ProviderKind::Google), "gemini-exp");
        assert_eq!(cfg.model_for(ProviderKind::Openai), "gpt-5-mini");
    }

    #[test]
    fn init_project_creates_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = init_project(temp.path(), "shop").expect("init");
        assert_eq!(project.name, "shop");
        let root = PathBuf::from(&project.root_dir);
        assert!(root.is_absolute());
        for dir in PROJECT_DIRS {
            assert!(root.join(dir).is_dir(), "missing {dir}");
        }
        assert!(init_project(temp.path(), "../escape").is_err());
        assert!(init_project(temp.path(), " ").is_err());
    }

    #[test]
    fn open_project_reports_missing_dirs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("billing");
        fs::create_dir_all(root.join("transcripts")).expect("mkdir");
        let (project, missing) = open_project(&root).expect("open");
        assert_eq!(project.name, "billing");
        assert_eq!(missing, vec!["out", "logs"]);
        assert!(open_project(&temp.path().join("absent")).is_err());
    }
}
