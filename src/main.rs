use lazydb::cli::{Cli, Commands};
use lazydb::commands;
use lazydb::{Config, Database, Driver, MySqlClient, PostgresClient};
use std::process;
use tracing_subscriber::EnvFilter;

// Allow println in main CLI binary
#[allow(clippy::disallowed_methods)]
fn main() {
    // Initialize comprehensive logging
    init_logging();

    let cli = Cli::parse();
    tracing::info!("lazydb CLI initialized");

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(dispatch(&config, cli.command)) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let config = match &cli.url {
        Some(url) => Config::from_url(url)?,
        None => Config::from_file(&cli.config).map_err(|e| {
            anyhow::anyhow!("Failed to load {}: {}", cli.config.display(), e)
        })?,
    };
    Ok(config)
}

async fn dispatch(config: &Config, command: Commands) -> anyhow::Result<()> {
    let connection = config.connection_config();
    match config.driver {
        Driver::MySql => {
            let db = Database::with_config(MySqlClient::new(), connection);
            commands::execute(&db, command).await
        }
        Driver::Postgres => {
            let db = Database::with_config(PostgresClient::new(), connection);
            commands::execute(&db, command).await
        }
    }
}

/// Initialize comprehensive logging based on environment variables
fn init_logging() {
    // Default to INFO level, can be overridden by RUST_LOG environment variable
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lazydb=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();
}
