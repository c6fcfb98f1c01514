use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "inventory-sync")]
#[command(about = "A CLI tool for syncing inventory batches with the inventory API")]
pub struct Cli {
    /// Path to a YAML config file (default: ~/.config/inventory-sync/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Inventory API base URL
    #[arg(short, long, global = true, env = "INVENTORY_SYNC_URL")]
    pub url: Option<String>,

    /// API username
    #[arg(long, global = true, env = "INVENTORY_SYNC_USERNAME")]
    pub username: Option<String>,

    /// API password
    #[arg(long, global = true, env = "INVENTORY_SYNC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and post an inventory batch
    Send {
        /// JSON file holding an array of inventory items
        #[arg(short, long, conflicts_with = "collect", required_unless_present = "collect")]
        file: Option<PathBuf>,

        /// Send a record describing this machine instead of a file
        #[arg(long)]
        collect: bool,

        /// Source tag for the batch (overrides the config file)
        #[arg(short, long)]
        source: Option<String>,

        /// Delete remote processing logs before sending
        #[arg(long)]
        clean_logs: bool,

        /// Wait for any running remote log cleanup to finish before sending
        #[arg(long)]
        wait_cleaning: bool,

        /// Output format (json, yaml, or pretty)
        #[arg(short = 'F', long, default_value = "pretty")]
        format: String,
    },

    /// Compute the checksum of an item file
    Checksum {
        /// JSON file holding an array of inventory items
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Verify an item file against an expected checksum
    Verify {
        /// JSON file holding an array of inventory items
        #[arg(short, long)]
        file: PathBuf,

        /// Expected SHA-256 checksum (hex)
        #[arg(long)]
        checksum: String,
    },

    /// Print items in the column layout of the remote table
    Normalize {
        /// JSON file holding an array of inventory items
        #[arg(short, long)]
        file: PathBuf,

        /// Output format (json, yaml, or pretty)
        #[arg(short = 'F', long, default_value = "pretty")]
        format: String,
    },

    /// Collect an inventory record for this machine
    Collect {
        /// Output format (json, yaml, or pretty)
        #[arg(short = 'F', long, default_value = "pretty")]
        format: String,
    },

    /// Check the login credentials
    Login,

    /// Show remote cleanup status, or the processing status of one batch
    Status {
        /// Batch identifier (e.g. SYNC_20250219144551)
        #[arg(short, long)]
        batch_id: Option<String>,

        /// Output format (json, yaml, or pretty)
        #[arg(short = 'F', long, default_value = "pretty")]
        format: String,
    },

    /// Remote processing log commands
    #[command(subcommand)]
    Logs(LogsCommands),
}

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show current processing logs
    Show {
        /// Output format (json, yaml, or pretty)
        #[arg(short = 'F', long, default_value = "pretty")]
        format: String,
    },
    /// Delete all processing logs
    Clean {
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}
