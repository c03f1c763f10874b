//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "abusefilter",
    version,
    about = "Resolve and execute the consequences of abuse filter hits",
    long_about = "Runs filter hits through consequence resolution and execution against a local \
                  SQLite-backed wiki state, keeps the abuse log, and reverts the blocks and group \
                  removals a filter caused."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/abusefilter/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Manage stored filters
    Filter {
        #[command(subcommand)]
        action: FilterAction,
    },

    /// Execute the consequences of a filter hit
    Run {
        /// JSON file describing the matched filters and the action context
        hit: PathBuf,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// List abuse log entries
    Log {
        /// Maximum number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Only show entries for this filter (e.g. "12" or "global-3")
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Revert the blocks and group removals a filter caused
    Revert {
        /// Filter key (e.g. "12" or "global-3")
        filter: String,

        /// How far back to look, in hours
        #[arg(long, default_value = "24")]
        hours: i64,

        /// Reason recorded with every revert
        #[arg(short, long, default_value = "Reverting filter actions")]
        reason: String,

        /// Account performing the revert
        #[arg(short, long, default_value = "Maintenance script")]
        performer: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum FilterAction {
    /// Add or replace filters from a TOML file of [[filter]] tables
    Add {
        file: PathBuf,
    },

    /// Show a stored filter
    Show {
        /// Filter key (e.g. "12" or "global-3")
        key: String,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_revert() {
        let cli = Cli::try_parse_from([
            "abusefilter",
            "revert",
            "global-3",
            "--hours",
            "6",
            "--performer",
            "Admin",
        ])
        .unwrap();
        match cli.command {
            Commands::Revert {
                filter,
                hours,
                performer,
                ..
            } => {
                assert_eq!(filter, "global-3");
                assert_eq!(hours, 6);
                assert_eq!(performer, "Admin");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
