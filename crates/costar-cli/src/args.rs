//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;
use costar_core::RunConfig;

/// Recommend GitHub repositories from stargazer co-occurrence
///
/// Finds the people who starred the same repositories as you and ranks
/// what else they starred, per repository you starred.
#[derive(Debug, Parser)]
#[command(name = "costar")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, searches for costar.toml in:
    /// 1. $COSTAR_CONFIG environment variable
    /// 2. Current directory
    /// 3. ~/.config/costar/costar.toml
    #[arg(short, long, value_name = "FILE", env = "COSTAR_CONFIG")]
    pub config: Option<PathBuf>,

    /// GitHub login to analyze (overrides user.login)
    #[arg(short, long, value_name = "LOGIN")]
    pub user: Option<String>,

    /// Directory receiving the output files (overrides output.directory)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Logging level
    ///
    /// Valid values: trace, debug, info, warn, error
    #[arg(short, long, default_value = "info", env = "COSTAR_LOG")]
    pub log_level: String,

    /// Output logs as JSON (for structured logging)
    #[arg(long, default_value = "false", env = "COSTAR_LOG_JSON")]
    pub log_json: bool,
}

impl Args {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply(&self, config: &mut RunConfig) {
        if let Some(user) = &self.user {
            config.user.login.clone_from(user);
        }
        if let Some(dir) = &self.output_dir {
            config.output.directory.clone_from(dir);
        }
    }
}
