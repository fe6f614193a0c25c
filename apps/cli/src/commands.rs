//! CLI command definitions, routing, and tracing setup.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand, error::ErrorKind};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use vidkb_core::{
    ItemReport, PipelineOptions, ProgressReporter, RunSummary, StageSet, run_batch,
};
use vidkb_shared::{
    AppConfig, Item, ItemRecord, Stage, StageOutcome, init_config, load_config, load_config_from,
};
use vidkb_storage::{CheckpointStore, FileCheckpointStore};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// vidkb: turn short-video and post URLs into a searchable knowledge base.
#[derive(Parser)]
#[command(
    name = "vidkb",
    version,
    about = "Download, transcribe, summarize and archive short videos and posts.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log level for vidkb crates.
    #[arg(long, default_value = "info", global = true, env = "VIDKB_LOG")]
    pub log_level: LogLevel,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Config file (defaults to ~/.vidkb/vidkb.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log verbosity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Process URLs through download, transcription, summary and archive.
    Run {
        /// Video or post URLs.
        urls: Vec<String>,

        /// Read newline-delimited URLs from a file, or `-` for stdin.
        #[arg(short, long)]
        input: Option<String>,

        /// Archive without an LLM summary.
        #[arg(long)]
        skip_summary: bool,

        /// Archive without transcribing speech.
        #[arg(long)]
        skip_transcribe: bool,

        /// Keep downloaded media files.
        #[arg(long)]
        no_cleanup: bool,

        /// Ignore checkpoints and reprocess every stage.
        #[arg(long)]
        force: bool,

        /// Print per-item reports as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show checkpointed records (all when no URL is given).
    Status {
        urls: Vec<String>,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

const LOG_TARGETS: [&str; 8] = [
    "vidkb",
    "vidkb_core",
    "vidkb_shared",
    "vidkb_storage",
    "vidkb_downloader",
    "vidkb_transcriber",
    "vidkb_summarizer",
    "vidkb_archive",
];

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = cli.log_level.as_level();
    let directives = LOG_TARGETS
        .iter()
        .map(|t| format!("{t}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,{directives}")));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            urls,
            input,
            skip_summary,
            skip_transcribe,
            no_cleanup,
            force,
            json,
        } => {
            let options = PipelineOptions {
                force,
                skip_transcribe,
                skip_summary,
                retain_media: no_cleanup,
            };
            cmd_run(config_path, urls, input.as_deref(), options, json)
        }
        Command::Status { urls } => {
            cmd_status(config_path, &urls)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { action } => {
            match action {
                ConfigAction::Init => cmd_config_init(config_path)?,
                ConfigAction::Show => cmd_config_show(config_path)?,
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Keep non-blank lines that are not `#` comments.
fn parse_url_list(reader: impl BufRead) -> Result<Vec<String>> {
    let mut urls = Vec::new();
    for line in reader.lines() {
        let line = line.wrap_err("failed to read URL list")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        urls.push(trimmed.to_string());
    }
    Ok(urls)
}

fn read_url_input(input: &str) -> Result<Vec<String>> {
    if input == "-" {
        return parse_url_list(std::io::stdin().lock());
    }
    let file = std::fs::File::open(input).wrap_err_with(|| format!("cannot open {input}"))?;
    parse_url_list(BufReader::new(file))
}

fn cmd_run(
    config_path: Option<&Path>,
    mut urls: Vec<String>,
    input: Option<&str>,
    options: PipelineOptions,
    json: bool,
) -> Result<ExitCode> {
    if let Some(input) = input {
        urls.extend(read_url_input(input)?);
    }
    if urls.is_empty() {
        Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "no URLs given: pass them as arguments or with --input",
            )
            .exit();
    }

    let config = resolve_config(config_path)?;
    let items: Vec<Item> = urls.iter().map(|u| Item::new(u)).collect();
    let store = FileCheckpointStore::new(&config.paths.checkpoint_dir);
    let (mut stages, sink) = StageSet::from_config(&config)?;

    info!(
        items = items.len(),
        sink = %sink,
        force = options.force,
        skip_transcribe = options.skip_transcribe,
        skip_summary = options.skip_summary,
        "starting run"
    );

    let progress = CliProgress::new(!json);
    let summary = run_batch(&items, &store, &mut stages, options, &progress);
    progress.finish();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary.reports)?);
    } else {
        print_summary(&summary);
    }
    Ok(ExitCode::from(summary.exit_code()))
}

fn print_summary(summary: &RunSummary) {
    println!();
    for report in &summary.reports {
        println!("  {:<20} {}", report.status.as_str(), report.item.url);
        if let Some(message) = report.failure_message() {
            println!("  {:<20} {message}", "");
        }
    }
    println!();
    println!("  Completed: {}", summary.completed());
    println!("  Partial:   {}", summary.partial());
    println!("  Failed:    {}", summary.failed());
    println!("  Time:      {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
    verbose: bool,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner, verbose }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn item_started(&self, index: usize, total: usize, item: &Item) {
        self.spinner.set_prefix(format!("[{}/{total}]", index + 1));
        self.spinner.set_message(item.url.clone());
    }

    fn stage_started(&self, item: &Item, stage: Stage) {
        self.spinner.set_message(format!("{stage} {}", item.url));
    }

    fn stage_finished(&self, _item: &Item, stage: Stage, outcome: &StageOutcome, reused: bool) {
        if self.verbose {
            let label = if reused { "cached" } else { outcome.label() };
            self.spinner.println(format!("    {stage:<11} {label}"));
        }
    }

    fn item_finished(&self, report: &ItemReport) {
        if self.verbose {
            self.spinner.println(format!(
                "  {} {} ({:.1}s)",
                report.status,
                report.item.url,
                report.elapsed.as_secs_f64()
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

fn cmd_status(config_path: Option<&Path>, urls: &[String]) -> Result<()> {
    let config = resolve_config(config_path)?;
    let store = FileCheckpointStore::new(&config.paths.checkpoint_dir);

    let records: Vec<ItemRecord> = if urls.is_empty() {
        store.list()?
    } else {
        let mut found = Vec::new();
        for url in urls {
            let item = Item::new(url);
            match store.load(&item.id)? {
                Some(record) => found.push(record),
                None => println!("  {:<20} {url}", "not started"),
            }
        }
        found
    };

    if records.is_empty() && urls.is_empty() {
        println!("No checkpoints in {}", store.dir().display());
        return Ok(());
    }

    for record in &records {
        let stages: Vec<String> = Stage::ALL
            .iter()
            .map(|s| {
                let label = record.outcome(*s).map_or("-", StageOutcome::label);
                format!("{s}={label}")
            })
            .collect();
        println!("  {:<20} {}", record.status.as_str(), record.url);
        println!("  {:<20} {} {}", "", record.id, stages.join(" "));
        if let Some((stage, failure)) = record.failure() {
            println!("  {:<20} {stage}: {failure}", "");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = init_config(config_path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)
        .map_err(|e| eyre!("cannot render config: {e}"))?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_list_skips_blanks_and_comments() {
        let input = "https://a.example/1\n\n# comment\n  https://b.example/2  \n   \n#x\n";
        let urls = parse_url_list(input.as_bytes()).unwrap();
        assert_eq!(urls, vec!["https://a.example/1", "https://b.example/2"]);
    }

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "vidkb",
            "--log-level",
            "debug",
            "run",
            "https://v.douyin.com/abc/",
            "--skip-summary",
            "--no-cleanup",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.log_level, LogLevel::Debug);
        match cli.command {
            Command::Run {
                urls,
                skip_summary,
                no_cleanup,
                json,
                force,
                ..
            } => {
                assert_eq!(urls, vec!["https://v.douyin.com/abc/"]);
                assert!(skip_summary && no_cleanup && json);
                assert!(!force);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let err = Cli::try_parse_from(["vidkb", "--log-level", "verbose", "status"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
