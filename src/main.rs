use std::fs::{self, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use calltape::audit::{CallRecorder, Redactor};
use calltape::config::{AuditConfig, EXAMPLE_CONFIG};
use calltape::replay::{read_script, replay};
use calltape::util;
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "calltape", version, about = "Audit trail for model API calls")]
struct Cli {
    /// Data directory (default: ~/.calltape)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a JSON payload with its secrets masked. Reads stdin without FILE.
    Redact { file: Option<PathBuf> },

    /// Drive the recorder with a JSONL script of operations
    Replay {
        file: PathBuf,

        /// Treat the session as running with upstream response storage disabled
        #[arg(long, default_value_t = false)]
        no_store: bool,
    },

    /// Show where calltape reads and writes
    Paths,

    /// Print an example config file
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    util::init_data_dir(cli.data_dir);

    // Initialize logging to file (~/.calltape/logs/calltape.log)
    fs::create_dir_all(util::logs_dir())?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::log_file_path())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .init();

    match cli.cmd {
        Command::Redact { file } => redact_payload(file.as_deref()),
        Command::Replay { file, no_store } => replay_script(&file, no_store).await,
        Command::Paths => {
            println!("data:   {}", util::data_dir().display());
            println!("config: {}", util::config_path().display());
            println!("audit:  {}", AuditConfig::load().log_dir.display());
            println!("log:    {}", util::log_file_path().display());
            Ok(())
        }
        Command::Config => {
            print!("{EXAMPLE_CONFIG}");
            Ok(())
        }
    }
}

fn redact_payload(file: Option<&Path>) -> Result<()> {
    let raw = match file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    let payload: Value = serde_json::from_str(&raw).context("input is not valid JSON")?;
    let redacted = Redactor::default().redact(&payload);
    println!("{}", serde_json::to_string_pretty(&redacted)?);
    Ok(())
}

async fn replay_script(file: &Path, no_store: bool) -> Result<()> {
    let ops = read_script(file)?;

    let recorder = CallRecorder::new(&AuditConfig::load());
    if no_store {
        recorder.set_storage_disabled(true);
    }

    let summary = replay(&recorder, &ops);
    recorder.flush().await;
    tracing::info!(%summary, "Replayed script");

    println!("{summary}");
    match recorder.session() {
        Some(session) => println!("{}", session.log_path().display()),
        None => println!("audit disabled"),
    }
    Ok(())
}
