//! CLI Module
//!
//! Command-line front end: mix WAV takes from disk and inspect the result.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Multitake - mix recorded takes into a single WAV file
#[derive(Parser, Debug)]
#[command(name = "multitake")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mix WAV takes into one 16-bit PCM WAV file
    #[command(name = "mix")]
    Mix {
        /// Take files, mixed in the order given
        inputs: Vec<PathBuf>,

        /// Directory to scan for .wav takes (sorted by path)
        #[arg(short, long, conflicts_with = "inputs")]
        dir: Option<PathBuf>,

        /// Gain per take, in take order (clamped to 0.0..=1.0)
        #[arg(short, long = "gain", value_name = "GAIN", allow_negative_numbers = true)]
        gains: Vec<f32>,

        /// Output file or directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Session config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the header of a mixed WAV file
    #[command(name = "inspect")]
    Inspect {
        /// Path to the WAV file
        path: PathBuf,
    },
}
