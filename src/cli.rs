use std::path::PathBuf;
use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "filewatch")]
#[command(version = "0.1.0")]
#[command(about = "Watch directory trees and keep a queryable log of file changes")]
#[command(long_about = "filewatch observes one or more directories, shows created, modified and deleted files as they happen, and records every change in a SQLite event log that can be filtered by event type, extension and time window, then exported as CSV.")]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE", help = "Configuration file")]
    pub config: Option<PathBuf>,

    /// Event database location
    #[arg(long, global = true, value_name = "PATH", help = "Event database file")]
    pub db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Watch directories and log changes until interrupted
    Watch(WatchArgs),
    /// Query the event log
    Query(QueryArgs),
    /// List the extension filter choices present in the log
    Extensions,
    /// Show event counts
    Stats,
    /// Delete a single event by id
    Delete {
        #[arg(value_name = "ID")]
        id: i64,
    },
    /// Clear the event log
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
    /// Send an exported report by email
    Email {
        #[arg(value_name = "RECIPIENT")]
        recipient: String,
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Directories to watch
    #[arg(value_name = "PATH", required = true, help = "Directories to watch")]
    pub paths: Vec<PathBuf>,

    /// Only admit files with this extension
    #[arg(long, value_name = "EXT", help = "Extension to admit (e.g. .txt), or All")]
    pub ext: Option<String>,

    /// Watch only the top-level directory
    #[arg(long, help = "Do not watch subdirectories")]
    pub no_recursive: bool,

    /// Output format
    #[arg(long, default_value = "text", help = "Output format")]
    pub output: OutputFormat,

    /// Disable colors in output
    #[arg(long, help = "Disable colored output")]
    pub no_color: bool,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Event type filter
    #[arg(long, default_value = "All", help = "created, modified, deleted or All")]
    pub event_type: String,

    /// Extension filter
    #[arg(long, default_value = "All", help = "Extension (e.g. .rs), (none) or All")]
    pub ext: String,

    /// Date window
    #[arg(long, default_value = "All", help = "All, Today, \"Last 7 days\" or \"Last 30 days\"")]
    pub range: String,

    /// Write results to a CSV file instead of printing them
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,

    /// Export every persisted column
    #[arg(long, requires = "export")]
    pub full: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    Text,
    /// JSON output for scripting
    Json,
    /// Compact single-line format
    Compact,
}

impl Cli {
    /// Resolve configuration: file, then environment, then command-line flags
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load_or_default(self.config.as_deref())?.with_env();

        if let Some(db) = &self.db {
            config.store.db_path = db.clone();
        }

        if let Command::Watch(args) = &self.command {
            if args.no_recursive {
                config.watcher.recursive = false;
            }
            if let Some(ext) = &args.ext {
                config.watcher.extension_filter = Some(ext.clone());
            }
        }

        Ok(config)
    }

    pub fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(std::io::stderr)
            .init();
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Command::Watch(args) = &self.command {
            for path in &args.paths {
                if !path.exists() {
                    return Err(format!("Path does not exist: {}", path.display()));
                }

                if !path.is_dir() {
                    return Err(format!("Path is not a directory: {}", path.display()));
                }
            }
        }

        Ok(())
    }
}
