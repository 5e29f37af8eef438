use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codec::DecoderConfig;
use entsync_tools::{format_inspect_pretty, format_replay_pretty, inspect_message, Replayer};
use glob::Pattern;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "entsync-tools",
    version,
    about = "entsync packet-entities inspection and replay tools"
)]
struct Cli {
    /// Decoder configuration JSON (wire widths, history capacity).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the header of a packet-entities message.
    Inspect {
        /// Path to the message bytes.
        message: PathBuf,
        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },
    /// Replay a directory of messages through a decoder.
    Replay {
        /// Directory of message files, processed in file name order.
        dir: PathBuf,
        /// Schema JSON describing the object classes.
        #[arg(long)]
        schema: PathBuf,
        /// Only replay files matching this glob.
        #[arg(long)]
        glob: Option<String>,
        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli
        .config
        .as_deref()
        .map(load_config)
        .transpose()
        .context("load config")?
        .unwrap_or_default();

    match cli.command {
        Command::Inspect { message, format } => {
            let bytes = fs::read(&message)
                .with_context(|| format!("read message {}", message.display()))?;
            let report = inspect_message(&bytes, &config.wire)?;
            match format {
                OutputFormat::Json => {
                    let json = serde_json::to_string_pretty(&report).context("serialize json")?;
                    println!("{json}");
                }
                OutputFormat::Pretty => println!("{}", format_inspect_pretty(&report)),
            }
        }
        Command::Replay {
            dir,
            schema,
            glob,
            format,
        } => {
            let schema = load_schema(&schema).context("load schema")?;
            let mut replayer = Replayer::new(schema, config)?;
            let paths = collect_messages(&dir, glob.as_deref())?;
            info!(dir = %dir.display(), messages = paths.len(), "replaying captured messages");
            for path in paths {
                let bytes =
                    fs::read(&path).with_context(|| format!("read message {}", path.display()))?;
                let name = path
                    .file_name()
                    .map_or_else(|| path.display().to_string(), |name| {
                        name.to_string_lossy().into_owned()
                    });
                replayer.replay(name, &bytes);
            }
            let report = replayer.finish();
            match format {
                OutputFormat::Json => {
                    let json = serde_json::to_string_pretty(&report).context("serialize json")?;
                    println!("{json}");
                }
                OutputFormat::Pretty => print!("{}", format_replay_pretty(&report)),
            }
        }
    }
    Ok(())
}

fn load_schema(path: &Path) -> Result<schema::Schema> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read schema {}", path.display()))?;
    let schema: schema::Schema = serde_json::from_str(&contents).context("parse schema json")?;
    schema
        .validate()
        .map_err(|err| anyhow::anyhow!("schema validation failed: {err}"))?;
    Ok(schema)
}

fn load_config(path: &Path) -> Result<DecoderConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    serde_json::from_str(&contents).context("parse config json")
}

fn collect_messages(dir: &Path, glob: Option<&str>) -> Result<Vec<PathBuf>> {
    let pattern = match glob {
        Some(value) => Some(Pattern::new(value).context("invalid glob pattern")?),
        None => None,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(pattern) = &pattern {
            let matches_path = pattern.matches_path(&path);
            let matches_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.matches(name));
            if !matches_path && !matches_name {
                continue;
            }
        }
        paths.push(path);
    }
    paths.sort();
    Ok(paths)
}
