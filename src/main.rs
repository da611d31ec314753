//! Scanvault CLI
//!
//! Command-line interface for the scan-result history:
//! - Record scan results
//! - Page through the history
//! - Purge old buckets
//! - Check the store

use anyhow::Context;
use clap::{Parser, Subcommand};
use scanvault::config::{generate_default_config, Config, LoggingConfig};
use scanvault::history::{HistoryEntry, HistoryService, ScanResult};
use scanvault::store::TreeStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "scanvault")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Time-bucketed history of antivirus scan results")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the usual locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Store snapshot file, overrides the config
    #[arg(long, global = true)]
    pub data_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a scan result
    Record {
        /// Path of the scanned resource
        #[arg(long)]
        path: String,
        /// User that triggered the scan
        #[arg(long)]
        user: String,
        /// The scan found something
        #[arg(long)]
        infected: bool,
        /// Scanner output
        #[arg(long, default_value = "")]
        output: String,
    },

    /// Show the most recent entries, newest first
    History {
        /// Entries to skip
        #[arg(short, long, default_value = "0")]
        start: usize,
        /// Entries to show (default: history.page_size)
        #[arg(short = 'n', long)]
        count: Option<usize>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Delete buckets older than the retention period
    Purge {
        /// Days to keep (default: history.days_to_keep)
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Check that the store and the history root are reachable
    Check,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("Unable to write {:?}", path))?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(data_file) = &cli.data_file {
        config.store.data_file = data_file.to_string_lossy().to_string();
    }

    init_logging(&config.logging)?;
    tracing::debug!("Scanvault v{}", env!("CARGO_PKG_VERSION"));

    let store = TreeStore::open(&config.store.data_file, &config.store.root_path)
        .with_context(|| format!("Unable to open store {}", config.store.data_file))?;
    tracing::debug!("Using store snapshot {:?}", store.snapshot_path());
    let history = HistoryService::new(Arc::new(store), config.store.root_path.clone())
        .purge_batch_size(config.history.purge_batch_size);

    match cli.command {
        Commands::Record {
            path,
            user,
            infected,
            output,
        } => {
            let result = ScanResult::new(output, !infected)
                .with_path(path)
                .with_user_id(user);
            let entry = history.create_history_entry(&result).await?;
            println!("Recorded {}", entry.node_path);
        }

        Commands::History { start, count, json } => {
            let count = count.unwrap_or(config.history.page_size);
            let entries = history.get_history(start, count).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_table(&entries);
            }
        }

        Commands::Purge { days } => {
            let days = days.unwrap_or(config.history.days_to_keep);
            let report = history.purge_history(days).await?;
            for path in &report.deleted {
                println!("Deleted {}", path);
            }
            println!("{}", report);
        }

        Commands::Check => {
            let report = history.self_check().await;
            for message in &report.messages {
                println!("{}", message);
            }
            println!("Status: {}", report.status);
            if !report.is_ok() {
                std::process::exit(2);
            }
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("scanvault={}", logging.level)));

    // Logs never go to stdout, which carries command output
    let writer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Unable to open log file {}", path))?;
            BoxMakeWriter::new(Arc::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(writer))
            .init();
    }
    Ok(())
}

fn print_table(entries: &[HistoryEntry]) {
    if entries.is_empty() {
        println!("No history entries");
        return;
    }

    println!("{:<20} {:<9} {:<12} {:<30} {}", "TIME", "STATUS", "USER", "PATH", "OUTPUT");
    println!("{}", "-".repeat(90));
    for entry in entries {
        let time = entry
            .time
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S");
        let status = if entry.clean { "clean" } else { "infected" };
        println!(
            "{:<20} {:<9} {:<12} {:<30} {}",
            time, status, entry.user_id, entry.path, entry.output
        );
    }
}
