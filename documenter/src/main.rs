//! Mermaid documentation agent CLI.
//!
//! Reads a transcript, lets the configured model write diagram docs through sandboxed tools,
//! and exits with a code describing how the run ended.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use documenter::controller::{Controller, RunConfig, StepAction, StepReport};
use documenter::core::types::RunOutcome;
use documenter::exit_codes;
use documenter::io::config::{
    AgentConfig, ProviderKind, default_config_path, home_dir, init_project, load_config,
    mask_secret, open_project, write_config,
};
use documenter::io::input::{read_transcript, resolve_transcript_path};
use documenter::io::operator::{Operator, StdioOperator};
use documenter::io::provider::HttpProvider;
use documenter::io::renderer::MmdcRenderer;
use documenter::io::tools::ToolRegistry;
use documenter::io::tools::fetch_docs::HttpDocFetcher;
use documenter::logging;

#[derive(Parser)]
#[command(
    name = "documenter",
    version,
    about = "Generate Mermaid documentation from application transcripts"
)]
struct Cli {
    /// Config file (default: ~/mermaid-agent-documenter/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the agent on a transcript file.
    Run {
        /// Transcript path, or a file name under the active project's transcripts/.
        transcript: String,
        /// Print the planned run without calling the model.
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
        /// Override `limits.max_steps`.
        #[arg(long)]
        max_steps: Option<u32>,
        /// Record full transcripts and raw responses in the run log.
        #[arg(long)]
        verbose_log: bool,
    },
    /// Create a project with transcripts/, out/ and logs/ and make it current.
    Init {
        name: String,
        /// Parent directory (default: the current directory).
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// List the tools available to the model.
    Tools,
    /// Inspect or edit the config file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective config with secrets masked.
    Show,
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Provider API keys.
    Secrets {
        #[command(subcommand)]
        command: SecretsCommand,
    },
    /// The current project.
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },
    /// The default provider.
    Provider {
        #[command(subcommand)]
        command: ProviderCommand,
    },
    /// Model ids per provider.
    Model {
        #[command(subcommand)]
        command: ModelCommand,
    },
}

#[derive(Subcommand)]
enum SecretsCommand {
    /// Store the API key for a provider.
    Set { provider: ProviderKind, key: String },
    /// Show which providers have a key, masked.
    List,
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Make an existing directory the current project.
    Set { dir: PathBuf },
    /// Show the current project.
    List,
}

#[derive(Subcommand)]
enum ProviderCommand {
    /// Select the default provider.
    Set { provider: ProviderKind },
    /// List providers and mark the current one.
    List,
}

#[derive(Subcommand)]
enum ModelCommand {
    /// Set the model id for a provider.
    Set {
        model: String,
        /// Provider to configure (default: the current provider).
        #[arg(long)]
        provider: Option<ProviderKind>,
    },
    /// List the model id used for each provider.
    List,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            transcript,
            dry_run,
            yes,
            max_steps,
            verbose_log,
        } => cmd_run(
            cli.config.as_deref(),
            &RunArgs {
                transcript,
                dry_run,
                yes,
                max_steps,
                verbose_log,
            },
        ),
        Command::Init { name, dir } => cmd_init(cli.config.as_deref(), &name, dir),
        Command::Tools => cmd_tools(),
        Command::Config { command } => {
            let explicit = cli.config.as_deref();
            match command {
                ConfigCommand::Show => cmd_config_show(explicit),
                ConfigCommand::Init { force } => cmd_config_init(explicit, force),
                ConfigCommand::Secrets { command } => match command {
                    SecretsCommand::Set { provider, key } => {
                        cmd_secrets_set(explicit, provider, &key)
                    }
                    SecretsCommand::List => cmd_secrets_list(explicit),
                },
                ConfigCommand::Project { command } => match command {
                    ProjectCommand::Set { dir } => cmd_project_set(explicit, &dir),
                    ProjectCommand::List => cmd_project_list(explicit),
                },
                ConfigCommand::Provider { command } => match command {
                    ProviderCommand::Set { provider } => cmd_provider_set(explicit, provider),
                    ProviderCommand::List => cmd_provider_list(explicit),
                },
                ConfigCommand::Model { command } => match command {
                    ModelCommand::Set { model, provider } => {
                        cmd_model_set(explicit, &model, provider)
                    }
                    ModelCommand::List => cmd_model_list(explicit),
                },
            }
        }
    }
}

struct RunArgs {
    transcript: String,
    dry_run: bool,
    yes: bool,
    max_steps: Option<u32>,
    verbose_log: bool,
}

/// `--config` if given, else the default location under the home directory.
fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(default_config_path(&home_dir()?)),
    }
}

fn cmd_run(explicit_config: Option<&Path>, args: &RunArgs) -> Result<i32> {
    let home = home_dir()?;
    let path = config_path(explicit_config)?;
    let mut cfg = load_config(&path)?;
    if let Some(max_steps) = args.max_steps {
        if max_steps == 0 {
            bail!("--max-steps must be > 0");
        }
        cfg.limits.max_steps = max_steps;
    }
    if args.verbose_log {
        cfg.log.verbose = true;
    }

    let transcript_path = resolve_transcript_path(&args.transcript, &cfg, &home);
    let transcript = read_transcript(&transcript_path)?;
    let run_config = RunConfig::from_agent_config(&cfg, &home, String::new());

    if let Some(project) = &cfg.project {
        println!("Project: {}", project.name);
    }
    println!("Transcript: {}", transcript_path.display());
    println!("Provider: {}, Model: {}", run_config.provider, run_config.model);
    println!("Output directory: {}", run_config.output_dir.display());
    println!(
        "Max steps: {}, Timeout: {}s, Confidence threshold: {:.2}",
        run_config.max_steps,
        run_config.timeout.as_secs(),
        run_config.confidence_threshold
    );

    if args.dry_run {
        println!("Dry run: agent execution skipped.");
        return Ok(exit_codes::OK);
    }

    let credential = cfg.api_key().ok_or_else(|| {
        anyhow!(
            "API key for provider '{}' not found; set secrets.{} in the config or {}",
            cfg.provider.as_str(),
            cfg.provider.as_str(),
            cfg.provider.api_key_env()
        )
    })?;

    let operator = StdioOperator;
    if !args.yes {
        let answer = operator.ask("Proceed with agent execution? (y/N)")?;
        if !answer.eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(exit_codes::OK);
        }
    }

    let provider = HttpProvider::new(cfg.provider);
    let registry = default_registry(&cfg)?;
    let run_config = RunConfig {
        credential,
        config_path: Some(path),
        ..run_config
    };
    let summary = Controller::new(&provider, &registry, &operator).run(
        &transcript,
        &run_config,
        print_step,
    )?;

    println!("Run log: {}", summary.log_path.display());
    let code = match summary.outcome {
        RunOutcome::Completed(manifest) => {
            println!("Documentation complete after {} steps.", summary.steps_executed);
            for (path, status) in &manifest {
                match status.as_str() {
                    Some(status) => println!("  {path}: {status}"),
                    None => println!("  {path}: {status}"),
                }
            }
            exit_codes::OK
        }
        RunOutcome::ClarificationNeeded(_) => {
            println!("Run stopped: clarification needed. Update the transcript and run again.");
            exit_codes::CLARIFICATION
        }
        RunOutcome::AbortedByFailureStreak {
            failures,
            last_error,
        } => {
            eprintln!("Run aborted after {failures} consecutive tool failures: {last_error}");
            exit_codes::ABORTED
        }
        RunOutcome::Failed(reason) => {
            eprintln!("Run failed: {reason}");
            exit_codes::FAILED
        }
    };
    Ok(code)
}

fn default_registry(cfg: &AgentConfig) -> Result<ToolRegistry> {
    ToolRegistry::with_defaults(
        Box::new(MmdcRenderer::new(&cfg.renderer)),
        Box::new(HttpDocFetcher::new(&cfg.docs)),
    )
}

fn print_step(report: &StepReport) {
    match &report.action {
        StepAction::Dispatched { tool, result } if result.succeeded => {
            println!("[step {}] {tool}: ok", report.step);
        }
        StepAction::Dispatched { tool, result } => {
            println!("[step {}] {tool}: failed: {}", report.step, result.error);
        }
        StepAction::Reconsider => println!(
            "[step {}] {} below confidence threshold ({:.2}); asking the model to reconsider",
            report.step, report.kind, report.confidence
        ),
        StepAction::Nudged => println!(
            "[step {}] unrecognized decision type \"{}\"",
            report.step, report.kind
        ),
    }
}

fn cmd_tools() -> Result<i32> {
    let registry = default_registry(&AgentConfig::default())?;
    for spec in registry.specs() {
        println!("{}\t{}", spec.name, spec.description);
    }
    Ok(exit_codes::OK)
}

fn cmd_config_show(explicit_config: Option<&Path>) -> Result<i32> {
    let path = config_path(explicit_config)?;
    let mut cfg = load_config(&path)?;
    for secret in cfg.secrets.values_mut() {
        *secret = mask_secret(secret);
    }
    let rendered = toml::to_string_pretty(&cfg).context("serialize config")?;
    println!("# {}", path.display());
    print!("{rendered}");
    Ok(exit_codes::OK)
}

fn cmd_config_init(explicit_config: Option<&Path>, force: bool) -> Result<i32> {
    let path = config_path(explicit_config)?;
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(&path, &AgentConfig::default())?;
    println!("Wrote {}", path.display());
    Ok(exit_codes::OK)
}

/// Load the config, apply `edit`, and write it back atomically.
fn update_config<F>(explicit_config: Option<&Path>, edit: F) -> Result<(PathBuf, AgentConfig)>
where
    F: FnOnce(&mut AgentConfig) -> Result<()>,
{
    let path = config_path(explicit_config)?;
    let mut cfg = load_config(&path)?;
    edit(&mut cfg)?;
    write_config(&path, &cfg)?;
    Ok((path, cfg))
}

fn cmd_init(explicit_config: Option<&Path>, name: &str, dir: Option<PathBuf>) -> Result<i32> {
    let parent = match dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let project = init_project(&parent, name)?;
    let (path, _) = update_config(explicit_config, |cfg| {
        cfg.project = Some(project.clone());
        Ok(())
    })?;
    println!("Project '{}' initialized at {}", project.name, project.root_dir);
    println!("  transcripts/  place transcript files here");
    println!("  out/          generated docs and diagrams");
    println!("  logs/         run logs");
    println!("Set as current project in {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_secrets_set(explicit_config: Option<&Path>, provider: ProviderKind, key: &str) -> Result<i32> {
    let key = key.trim();
    if key.is_empty() {
        bail!("API key for '{}' must be non-empty", provider.as_str());
    }
    update_config(explicit_config, |cfg| {
        cfg.secrets.insert(provider, key.to_string());
        Ok(())
    })?;
    println!("API key for '{}' set", provider.as_str());
    Ok(exit_codes::OK)
}

fn cmd_secrets_list(explicit_config: Option<&Path>) -> Result<i32> {
    let cfg = load_config(&config_path(explicit_config)?)?;
    for provider in ProviderKind::ALL {
        match cfg.secrets.get(&provider).filter(|key| !key.is_empty()) {
            Some(key) => println!("{}: {}", provider.as_str(), mask_secret(key)),
            None => println!(
                "{}: not configured (falls back to {})",
                provider.as_str(),
                provider.api_key_env()
            ),
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_project_set(explicit_config: Option<&Path>, dir: &Path) -> Result<i32> {
    let (project, missing) = open_project(dir)?;
    for sub in &missing {
        eprintln!(
            "Warning: {}/{sub} not found; the project may not be initialized",
            project.root_dir
        );
    }
    update_config(explicit_config, |cfg| {
        cfg.project = Some(project.clone());
        Ok(())
    })?;
    println!("Current project set to: {} ({})", project.name, project.root_dir);
    Ok(exit_codes::OK)
}

fn cmd_project_list(explicit_config: Option<&Path>) -> Result<i32> {
    let cfg = load_config(&config_path(explicit_config)?)?;
    match &cfg.project {
        Some(project) => {
            println!("Current project: {}", project.name);
            println!("Project directory: {}", project.root_dir);
        }
        None => println!(
            "No current project; use 'documenter init <name>' or 'config project set <dir>'"
        ),
    }
    Ok(exit_codes::OK)
}

fn cmd_provider_set(explicit_config: Option<&Path>, provider: ProviderKind) -> Result<i32> {
    let (_, cfg) = update_config(explicit_config, |cfg| {
        cfg.provider = provider;
        Ok(())
    })?;
    if cfg.api_key().is_none() {
        eprintln!(
            "Warning: no API key configured for '{}'; use 'config secrets set {} <key>' or {}",
            provider.as_str(),
            provider.as_str(),
            provider.api_key_env()
        );
    }
    println!("Default provider set to: {}", provider.as_str());
    Ok(exit_codes::OK)
}

fn cmd_provider_list(explicit_config: Option<&Path>) -> Result<i32> {
    let cfg = load_config(&config_path(explicit_config)?)?;
    for provider in ProviderKind::ALL {
        let marker = if provider == cfg.provider { " (current)" } else { "" };
        println!("{}{marker}", provider.as_str());
    }
    Ok(exit_codes::OK)
}

fn cmd_model_set(
    explicit_config: Option<&Path>,
    model: &str,
    provider: Option<ProviderKind>,
) -> Result<i32> {
    let model = model.trim();
    if model.is_empty() {
        bail!("model id must be non-empty");
    }
    let (_, cfg) = update_config(explicit_config, |cfg| {
        cfg.models
            .insert(provider.unwrap_or(cfg.provider), model.to_string());
        Ok(())
    })?;
    let provider = provider.unwrap_or(cfg.provider);
    println!("Model for '{}' set to: {model}", provider.as_str());
    Ok(exit_codes::OK)
}

fn cmd_model_list(explicit_config: Option<&Path>) -> Result<i32> {
    let cfg = load_config(&config_path(explicit_config)?)?;
    for provider in ProviderKind::ALL {
        let marker = if provider == cfg.provider { " (current)" } else { "" };
        println!("{}: {}{marker}", provider.as_str(), cfg.model_for(provider));
    }
    Ok(exit_codes::OK)
}
