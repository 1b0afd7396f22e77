use crate::cli::Commands;
use crate::client::DatabaseClient;
use crate::database::Database;
use anyhow::Result;

/// Descriptor command functionality
pub mod descriptor;
/// Ping command functionality
pub mod ping;
/// Run command functionality
pub mod run;

/// Dispatch a parsed command against a configured database
pub async fn execute<C: DatabaseClient>(db: &Database<C>, command: Commands) -> Result<()> {
    match command {
        Commands::Descriptor => {
            descriptor::handle_descriptor(db);
            Ok(())
        }
        Commands::Ping => ping::handle_ping(db).await,
        Commands::Run { sql, params } => run::handle_run(db, &sql, &params).await,
    }
}
