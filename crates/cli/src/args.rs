//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// feedloom: follow accounts across platforms and collect their new content
#[derive(Parser, Debug)]
#[command(name = "feedloom")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Directory holding the database, lock and reports
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Subscribe to a source URL and fetch it once
    Add(AddArgs),

    /// Fetch all active subscriptions and write a report
    Update(UpdateArgs),

    /// List subscriptions
    List(ListArgs),

    /// Exclude a subscription from updates
    Deactivate(IdArgs),

    /// Include a subscription in updates again
    Activate(IdArgs),

    /// Show item and subscription counts
    Stats(OutputArgs),

    /// Print the report of the last update without fetching
    Status,

    /// Configuration management
    Config(ConfigArgs),

    /// Validate configuration and show status
    Doctor(OutputArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Account or channel URL
    pub url: String,

    /// Store the initial items without classifying them
    #[arg(long)]
    pub no_classify: bool,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Store new items under the default category
    #[arg(long)]
    pub no_classify: bool,

    /// Report the latest item per subscription instead of all new items
    #[arg(long)]
    pub digest: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Include inactive subscriptions
    #[arg(long)]
    pub all: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct IdArgs {
    /// Subscription id (see `feedloom list`)
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Init {
        /// Path to write config file
        #[arg(long, default_value = "./feedloom.toml")]
        path: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}
