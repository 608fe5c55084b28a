use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use signalsearcher::config::Config;
use signalsearcher::report::ReportFormat;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "signalsearcher",
    about = "Finds year-long sustained drops in per-network download throughput",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (default: $SIGNALSEARCHER_CONFIG, then /etc/signalsearcher/signalsearcher.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search every series in the table and print incidents
    Scan {
        /// SQLite database holding the monthly rows
        #[arg(long)]
        db: Option<PathBuf>,

        /// Table to scan
        #[arg(long)]
        table: Option<String>,

        /// JSON-lines output instead of CSV
        #[arg(long)]
        json: bool,
    },

    /// Load a CSV file with an `asn,loc,date,count,download` header into the table
    Import {
        /// Input file
        #[arg(long)]
        input: PathBuf,

        /// SQLite database to write
        #[arg(long)]
        db: Option<PathBuf>,

        /// Table to write
        #[arg(long)]
        table: Option<String>,
    },
}

fn env_filter(fallback: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback))
}

/// Load the config under a temporary stderr subscriber, since the real one
/// depends on the config's logging section.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(env_filter("info"))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::with_default(bootstrap, || match path {
        Some(path) => Config::load(path),
        None => Ok(Config::load_or_default()),
    })
}

fn init_tracing(config: &Config) {
    let filter = env_filter(&config.logging.level);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    init_tracing(&config);

    match cli.command {
        Commands::Scan { db, table, json } => {
            if let Some(db) = db {
                config.source.db_path = db;
            }
            if let Some(table) = table {
                config.source.table = table;
            }
            if json {
                config.report.format = ReportFormat::Json;
            }

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, cancelling scan");
                    on_signal.cancel();
                }
            });

            let summary = signalsearcher::scan(&config, std::io::stdout().lock(), cancel).await?;
            if summary.malformed_counts > 0 {
                tracing::warn!(
                    malformed_counts = summary.malformed_counts,
                    "some count cells could not be parsed and were read as 0"
                );
            }
        }
        Commands::Import { input, db, table } => {
            if let Some(db) = db {
                config.source.db_path = db;
            }
            if let Some(table) = table {
                config.source.table = table;
            }
            config.validate()?;

            let file = std::fs::File::open(&input)
                .with_context(|| format!("failed to open {}", input.display()))?;
            let db_path = config.source.db_path.to_string_lossy();
            if let Some(parent) = config.source.db_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create {}", parent.display()))?;
                }
            }
            let pool = signalsearcher::storage::open_pool(&db_path, &config.source.table)?;
            let mut conn = pool.get()?;
            let rows = signalsearcher::storage::import_rows(
                &mut conn,
                &config.source.table,
                file,
            )?;
            println!("Imported {} rows into {}.", rows, config.source.table);
        }
    }

    Ok(())
}
