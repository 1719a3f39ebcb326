//! Command-line interface for funnel-progress.
//!
//! This module provides the CLI structure for the `funnelctl` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, FieldArg, ResetCommand, SetCommand, ShowCommand, WatchCommand,
};

use crate::logging::Verbosity;

/// funnelctl - Inspect and edit funnel progress
///
/// Reads and writes the funnel progress record shared by every context
/// using the configured storage, and watches it for changes.
#[derive(Debug, Parser)]
#[command(name = "funnelctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show recorded funnel progress
    Show(ShowCommand),

    /// Record an identifier
    Set(SetCommand),

    /// Delete all recorded progress
    Reset(ResetCommand),

    /// Print changes as they happen, until interrupted
    Watch(WatchCommand),

    /// List funnel steps and which ones have been recorded
    Steps,

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}
