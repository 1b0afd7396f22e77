//! Descriptor command

use crate::client::DatabaseClient;
use crate::database::Database;

/// Print the descriptor the next connection attempt would use
pub fn handle_descriptor<C: DatabaseClient>(db: &Database<C>) {
    println!("{}", db.descriptor());
}
