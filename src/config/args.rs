//! Command-line argument parsing

use clap::Parser;

/// WeWrite page-view aggregation service
#[derive(Debug, Clone, Parser)]
#[command(name = "wewrite-views", version, about)]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// Print a sample configuration file and exit
    #[arg(long = "generate-config")]
    pub generate_config: bool,
}
