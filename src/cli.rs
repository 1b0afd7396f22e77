use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI interface for `lazydb`
#[derive(Parser)]
#[command(name = "lazydb")]
#[command(version = crate::VERSION)]
#[command(about = "lazydb - Check a database connection and run statements through it")]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, value_name = "FILE", default_value = "lazydb.toml")]
    pub config: PathBuf,

    /// Connection URL, used instead of the configuration file
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print the connection descriptor (never includes credentials)
    Descriptor,
    /// Connect to the database and report the result
    Ping,
    /// Prepare and execute a statement, printing any rows as JSON
    Run {
        /// SQL text to run
        sql: String,
        /// Positional parameter; repeat for each placeholder
        #[arg(long = "param", value_name = "VALUE")]
        params: Vec<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    #[must_use]
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
