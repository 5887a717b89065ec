//! Command-line interface for écoute
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Always-on French speech captioning with safety-keyword alerts
#[derive(Parser, Debug)]
#[command(name = "ecoute", version, about = "Always-on speech captioning with safety alerts")]
pub struct Cli {
    /// Subcommand to execute (default: listen)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress live display (transcripts are still stored)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Audio input device (see `ecoute devices`)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Recognition model directory
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Transcript database path
    #[arg(long, value_name = "PATH")]
    pub store: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture and caption continuously (the default)
    Listen {
        /// Read audio from a WAV file instead of the microphone
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,

        /// Disable the voice-activity gate
        #[arg(long)]
        no_vad: bool,

        /// Disable noise reduction
        #[arg(long)]
        no_noise: bool,

        /// Disable punctuation restoration
        #[arg(long)]
        no_punctuation: bool,

        /// Disable safety-keyword detection
        #[arg(long)]
        no_emergency: bool,
    },

    /// Show recent transcripts
    History {
        /// Maximum entries to show
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Show transcripts flagged as emergencies
    Emergencies {
        /// Maximum entries to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Search stored transcripts
    Search {
        /// Substring to look for
        query: String,

        /// Maximum entries to show
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Export transcripts to a text file
    Export {
        /// Output file path
        output: PathBuf,

        /// Restrict to one day (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        date: Option<String>,
    },

    /// Delete transcripts older than N days
    Purge {
        /// Age cutoff in days
        #[arg(long, default_value_t = 30)]
        days: u32,
    },

    /// Show store and system statistics
    Stats {
        /// Trailing window in days for store aggregates
        #[arg(long, default_value_t = 7)]
        days: u32,
    },

    /// List audio input devices
    #[cfg(feature = "cpal-audio")]
    Devices,
}
