// Single-row settings persistence for `Config` (original source: the
// `extra` JSON column pattern in `crud.py`/`migrations.py`). Always
// keyed under owner_id "admin" — this crate has one admin principal, not
// per-tenant config.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::atoms::error::RelayResult;

const OWNER_ID: &str = "admin";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    pub private_ws: bool,
    pub public_ws: bool,
}

/// Load the persisted config, creating and persisting the default
/// (`{private_ws: false, public_ws: false}`) if no row exists yet.
pub fn load_config(conn: &Connection) -> RelayResult<Config> {
    let extra: Option<String> = conn
        .query_row("SELECT extra FROM config WHERE owner_id = ?1", params![OWNER_ID], |row| row.get(0))
        .optional()?;

    match extra {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => {
            let default = Config::default();
            save_config(conn, default)?;
            Ok(default)
        }
    }
}

pub fn save_config(conn: &Connection, config: Config) -> RelayResult<Config> {
    let json = serde_json::to_string(&config)?;
    conn.execute(
        "INSERT INTO config (owner_id, extra) VALUES (?1, ?2)
         ON CONFLICT(owner_id) DO UPDATE SET extra = excluded.extra",
        params![OWNER_ID, json],
    )?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::run_migrations;

    fn memory_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn load_creates_default_row_when_absent() {
        let conn = memory_conn();
        let config = load_config(&conn).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let conn = memory_conn();
        save_config(&conn, Config { private_ws: true, public_ws: false }).unwrap();
        let loaded = load_config(&conn).unwrap();
        assert_eq!(loaded, Config { private_ws: true, public_ws: false });
    }

    #[test]
    fn save_twice_overwrites_the_single_row() {
        let conn = memory_conn();
        save_config(&conn, Config { private_ws: true, public_ws: true }).unwrap();
        save_config(&conn, Config { private_ws: false, public_ws: false }).unwrap();
        let loaded = load_config(&conn).unwrap();
        assert_eq!(loaded, Config { private_ws: false, public_ws: false });
    }
}
