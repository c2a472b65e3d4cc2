//! Command-line interface for voxqueue
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Offline speech recognition through a single-flight job queue
#[derive(Parser, Debug)]
#[command(name = "voxqueue", version, about = "Offline speech recognition queue")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress log output (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: job lifecycle, -vv: per-token trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcribe WAV files, printing results in submission order
    Transcribe {
        /// WAV files (any sample rate, mono or stereo, 16-bit or float)
        #[arg(required = true, value_name = "WAV")]
        files: Vec<PathBuf>,

        /// Model file (overrides config)
        #[arg(long, value_name = "PATH")]
        model: Option<PathBuf>,

        /// Language code or "auto" (overrides config)
        #[arg(long, value_name = "CODE")]
        language: Option<String>,

        /// Print results as JSON lines
        #[arg(long)]
        json: bool,

        /// Recognize one file at a time, waiting for each result
        #[arg(long)]
        sync: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration (file + environment overrides)
    Show,
    /// Print the configuration file path
    Path,
}
