use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Watch listing pages and push new items to a webhook
#[derive(Parser)]
#[command(name = "pagewatch", version)]
#[command(about = "Scrape configured listing pages once and push new items", long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, env = "PAGEWATCH_CONFIG", default_value = "config.toml")]
    pub config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Visit every site once and push new items (default)
    Run,
    /// Render and extract one site without touching history or the webhook
    Check {
        /// Site name from the configuration
        site: String,
    },
    /// Show recently pushed links
    History {
        /// Only show this site
        #[arg(short, long)]
        site: Option<String>,
        /// Number of records to show
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },
}
