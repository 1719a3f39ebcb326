//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::state::FunnelField;

/// Show command arguments.
#[derive(Debug, Args)]
pub struct ShowCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Set command arguments.
#[derive(Debug, Args)]
pub struct SetCommand {
    /// Which identifier to record
    #[arg(value_enum)]
    pub field: FieldArg,

    /// The identifier value
    pub id: String,
}

/// Reset command arguments.
#[derive(Debug, Args)]
pub struct ResetCommand {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Clear every key in the storage, not only the funnel's
    #[arg(long)]
    pub all: bool,
}

/// Watch command arguments.
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Poll interval in milliseconds (overrides configuration)
    #[arg(short, long, value_name = "MS")]
    pub interval: Option<u64>,

    /// Print each change as a JSON line
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Funnel field argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FieldArg {
    /// Chat session id
    Session,
    /// Registration id
    Registration,
    /// Booking id
    Booking,
}

impl From<FieldArg> for FunnelField {
    fn from(arg: FieldArg) -> Self {
        match arg {
            FieldArg::Session => Self::Session,
            FieldArg::Registration => Self::Registration,
            FieldArg::Booking => Self::Booking,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_arg_conversion() {
        assert_eq!(FunnelField::from(FieldArg::Session), FunnelField::Session);
        assert_eq!(
            FunnelField::from(FieldArg::Registration),
            FunnelField::Registration
        );
        assert_eq!(FunnelField::from(FieldArg::Booking), FunnelField::Booking);
    }

    #[test]
    fn test_set_command_debug() {
        let cmd = SetCommand {
            field: FieldArg::Booking,
            id: "b1".to_string(),
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Booking"));
        assert!(debug_str.contains("b1"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        assert!(format!("{cmd:?}").contains("Show"));
    }
}
