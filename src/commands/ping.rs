//! Ping command

use crate::client::DatabaseClient;
use crate::database::Database;
use anyhow::Result;
use std::time::Instant;
use tracing::{error, info};

/// Open the connection and report how long it took
pub async fn handle_ping<C: DatabaseClient>(db: &Database<C>) -> Result<()> {
    let descriptor = db.descriptor();
    println!("🧪 Connecting to {descriptor}...");

    let start = Instant::now();
    db.connection().await.map_err(|e| {
        error!("Connection to {} failed: {}", descriptor, e);
        println!("❌ Connection failed");
        anyhow::anyhow!("Connection test failed: {}", e)
    })?;

    let latency = start.elapsed().as_millis();
    info!("Connected to {} in {}ms", descriptor, latency);
    println!("✅ Connected in {latency}ms");
    Ok(())
}
