//! 命令行参数

use crate::config::SyncConfig;
use crate::logging::LogConfig;
use clap::Parser;
use std::path::PathBuf;

/// dirsync - 单向目录树同步
#[derive(Debug, Parser)]
#[command(name = "dirsync")]
#[command(version)]
#[command(about = "One-shot directory tree synchronizer with optional content fingerprinting")]
#[command(long_about = None)]
pub struct Cli {
    /// Source directory
    #[arg(required = true)]
    pub source_dir: String,

    /// Destination directory (must already exist)
    #[arg(required = true)]
    pub destination_dir: String,

    /// Number of analyzer workers (1 = serial)
    #[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub workers: u32,

    /// Compare only size and modification time, skip MD5 fingerprints
    #[arg(long)]
    pub date_size_only: bool,

    /// Build inventories serially even when workers > 1
    #[arg(long)]
    pub no_parallel: bool,

    /// Report what would be copied without touching the destination
    #[arg(long)]
    pub dry_run: bool,

    /// Show debug output
    #[arg(short, long)]
    pub verbose: bool,

    /// Print both inventories and exit
    #[arg(long)]
    pub list: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn sync_config(&self) -> SyncConfig {
        let mut config = SyncConfig::new(&self.source_dir, &self.destination_dir)
            .with_workers(self.workers as usize)
            .with_fingerprint(!self.date_size_only)
            .with_parallel(!self.no_parallel)
            .with_dry_run(self.dry_run);
        config.verbose = self.verbose;
        config.log_file = self.log_file.clone();
        config
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig::new(self.verbose, self.log_file.clone())
    }
}
