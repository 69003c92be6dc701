//! tagx: decrypt extracted SWF tag payloads
//!
//! Commands:
//!   process <files..>   - run the hypothesis search on tag files, print JSON outcomes
//!   config show         - print the effective configuration as TOML
//!   history show        - print the recorded accepted keys

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tagx_core::{Tag, TagxConfig};
use tagx_engine::{BatchSummary, HistorySnapshot, KeyHistory, TagProcessor};
use tracing::info;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "tagx",
    version,
    about = "Layered tag decryption with statistical validation",
    long_about = "tagx: search XOR/RC4/substitution layer hypotheses over encrypted tag payloads"
)]
struct Cli {
    /// Path to tagx.toml configuration file
    #[arg(long, short = 'c', env = "TAGX_CONFIG", default_value = "tagx.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); defaults to the config's
    #[arg(long, env = "TAGX_LOG")]
    log: Option<String>,

    /// Log format (json, text); defaults to the config's
    #[arg(long, env = "TAGX_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decrypt tag files and print one JSON outcome per tag
    ///
    /// Files named `tag_<type>_<offset>.bin` carry their own type and offset;
    /// anything else needs --type (and optionally --offset).
    Process {
        /// Tag payload files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Tag type id for files whose name does not encode one
        #[arg(long = "type", short = 't')]
        type_id: Option<u16>,
        /// Tag offset for files whose name does not encode one
        #[arg(long, short = 'o')]
        offset: Option<u64>,
        /// Restrict marker detection to this variant
        #[arg(long)]
        marker: Option<String>,
        /// Append accepted keys to the key history
        #[arg(long)]
        record: bool,
        /// JSON-lines key history file (overrides config)
        #[arg(long, env = "TAGX_HISTORY")]
        history: Option<PathBuf>,
        /// Pretty-print each outcome
        #[arg(long)]
        pretty: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Key history inspection
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// Print every record, optionally for one tag type
    Show {
        #[arg(long = "type", short = 't')]
        type_id: Option<u16>,
        /// JSON-lines key history file (overrides config)
        #[arg(long, env = "TAGX_HISTORY")]
        history: Option<PathBuf>,
    },
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

// ── Entry point ────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_exists = cli.config.exists();
    let config = TagxConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match cli.log_format.clone() {
        Some(format) => format,
        None => match config.log.format.as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        },
    };
    init_logging(&level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        builtin = !config_exists,
        profiles = config.profiles.len(),
        "tagx starting"
    );

    match cli.command {
        Commands::Process {
            files,
            type_id,
            offset,
            marker,
            record,
            history,
            pretty,
        } => cmd_process(
            config,
            &files,
            type_id,
            offset,
            marker,
            record,
            history,
            pretty,
        ),
        Commands::Config {
            action: ConfigAction::Show,
        } => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Commands::History {
            action: HistoryAction::Show { type_id, history },
        } => cmd_history_show(&config, type_id, history),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the JSON outcomes, logs go to stderr
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Commands ───────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn cmd_process(
    mut config: TagxConfig,
    files: &[PathBuf],
    type_id: Option<u16>,
    offset: Option<u64>,
    marker: Option<String>,
    record: bool,
    history_path: Option<PathBuf>,
    pretty: bool,
) -> Result<()> {
    if record {
        config.history.record = true;
    }
    if history_path.is_some() {
        config.history.path = history_path;
    }
    let history = open_history(&config)?;

    let mut tags = Vec::with_capacity(files.len());
    for path in files {
        let (file_type, file_offset) = match parse_tag_filename(path) {
            Some((t, o)) => (Some(t), Some(o)),
            None => (None, None),
        };
        let Some(tag_type) = type_id.or(file_type) else {
            bail!(
                "{}: name is not tag_<type>_<offset>.bin and no --type given",
                path.display()
            );
        };
        let raw = std::fs::read(path)
            .with_context(|| format!("reading tag file: {}", path.display()))?;
        let mut tag = Tag::new(tag_type, offset.or(file_offset).unwrap_or(0), raw);
        if let Some(name) = &marker {
            tag = tag.with_marker(name.clone());
        }
        tags.push(tag);
    }

    let processor = TagProcessor::new(config, Arc::new(history));
    let outcomes = processor.process_batch(&tags)?;

    for outcome in &outcomes {
        let line = if pretty {
            serde_json::to_string_pretty(outcome)
        } else {
            serde_json::to_string(outcome)
        }
        .context("serializing outcome")?;
        println!("{line}");
    }

    let summary = BatchSummary::from_outcomes(&outcomes);
    eprintln!(
        "{} tag(s): {} accepted, {} failed",
        summary.total,
        summary.accepted,
        summary.total - summary.accepted
    );
    Ok(())
}

fn cmd_history_show(
    config: &TagxConfig,
    type_id: Option<u16>,
    history_path: Option<PathBuf>,
) -> Result<()> {
    let Some(path) = history_path.or_else(|| config.history.path.clone()) else {
        bail!("no key history configured: pass --history or set [history] path");
    };
    let history = KeyHistory::load(&path)?;
    for line in history_lines(&history.snapshot(), type_id)? {
        println!("{line}");
    }
    Ok(())
}

/// One JSON line per record, every recorded type unless `type_id` narrows it.
fn history_lines(snapshot: &HistorySnapshot, type_id: Option<u16>) -> Result<Vec<String>> {
    let types = match type_id {
        Some(t) => vec![t],
        None => snapshot.tag_types(),
    };
    let mut lines = Vec::new();
    for t in types {
        for record in snapshot.records(t) {
            lines.push(serde_json::to_string(record)?);
        }
    }
    Ok(lines)
}

fn open_history(config: &TagxConfig) -> Result<KeyHistory> {
    match &config.history.path {
        Some(path) => KeyHistory::open(path),
        None => Ok(KeyHistory::in_memory()),
    }
}

/// `tag_<type>_<offset>.bin` → `(type, offset)`. The offset may be decimal
/// or `0x`-prefixed hex.
fn parse_tag_filename(path: &Path) -> Option<(u16, u64)> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_prefix("tag_")?.strip_suffix(".bin")?;
    let (type_part, offset_part) = stem.split_once('_')?;
    let type_id = type_part.parse().ok()?;
    let offset = match offset_part.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None => offset_part.parse().ok()?,
    };
    Some((type_id, offset))
}
