// Relaymux Store — rusqlite-backed persistence for relays and config,
// wrapped the way the teacher wraps a `SessionStore`: a single
// `parking_lot::Mutex<Connection>` behind an `Arc`, opened once at
// startup with WAL mode for concurrent readers.

pub mod relays;
pub mod schema;
pub mod settings;

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::atoms::error::RelayResult;

pub use relays::Relay;
pub use settings::Config;

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> RelayResult<Self> {
        let conn = Connection::open(path)?;
        Self::configure_and_migrate(conn)
    }

    /// In-memory database for tests: same schema, same pragmas where they
    /// apply, no file on disk.
    pub fn open_in_memory() -> RelayResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_and_migrate(conn)
    }

    fn configure_and_migrate(conn: Connection) -> RelayResult<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        schema::run_migrations(&conn)?;
        Ok(Store { conn: Mutex::new(conn) })
    }

    pub fn load_relays(&self) -> RelayResult<Vec<Relay>> {
        relays::load_relays(&self.conn.lock())
    }

    pub fn create_relay(&self, url: &str) -> RelayResult<Option<Relay>> {
        relays::create_relay(&self.conn.lock(), url)
    }

    pub fn delete_relay(&self, url: &str) -> RelayResult<bool> {
        relays::delete_relay(&self.conn.lock(), url)
    }

    pub fn load_config(&self) -> RelayResult<Config> {
        settings::load_config(&self.conn.lock())
    }

    pub fn save_config(&self, config: Config) -> RelayResult<Config> {
        settings::save_config(&self.conn.lock(), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_runs_migrations_and_is_usable() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.load_relays().unwrap().is_empty());
        assert_eq!(store.load_config().unwrap(), Config::default());
    }

    #[test]
    fn relay_lifecycle_through_the_store_facade() {
        let store = Store::open_in_memory().unwrap();
        store.create_relay("wss://relay.example").unwrap();
        assert_eq!(store.load_relays().unwrap().len(), 1);
        assert!(store.delete_relay("wss://relay.example").unwrap());
        assert!(store.load_relays().unwrap().is_empty());
    }
}
