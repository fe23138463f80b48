// Stepwise Infrastructure - SQLite Adapter
// Implements: SnapshotStore

mod connection;
mod error;
mod migration;
mod snapshot_store;

pub use connection::create_pool;
pub use migration::run_migrations;
pub use snapshot_store::SqliteSnapshotStore;
