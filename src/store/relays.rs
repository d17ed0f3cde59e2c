// CRUD for the `relays` table (original source: `crud.py::get_relays`,
// `create_relay`, `delete_relay`).

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::atoms::error::RelayResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relay {
    pub id: String,
    pub url: String,
    pub active: bool,
}

pub fn load_relays(conn: &Connection) -> RelayResult<Vec<Relay>> {
    let mut stmt = conn.prepare("SELECT id, url, active FROM relays ORDER BY url")?;
    let rows = stmt.query_map([], |row| {
        Ok(Relay { id: row.get(0)?, url: row.get(1)?, active: row.get::<_, i64>(2)? != 0 })
    })?;
    let mut relays = Vec::new();
    for relay in rows {
        relays.push(relay?);
    }
    Ok(relays)
}

/// Insert a new relay row, id freshly generated. Returns `Ok(None)` if
/// the url already exists (caller maps that to a 400 at the admin layer)
/// rather than surfacing a raw unique-constraint error.
pub fn create_relay(conn: &Connection, url: &str) -> RelayResult<Option<Relay>> {
    let existing: bool =
        conn.prepare("SELECT 1 FROM relays WHERE url = ?1")?.exists(params![url])?;
    if existing {
        return Ok(None);
    }

    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO relays (id, url, active) VALUES (?1, ?2, 1)",
        params![id, url],
    )?;
    Ok(Some(Relay { id, url: url.to_string(), active: true }))
}

/// Returns whether a row was actually deleted.
pub fn delete_relay(conn: &Connection, url: &str) -> RelayResult<bool> {
    let affected = conn.execute("DELETE FROM relays WHERE url = ?1", params![url])?;
    Ok(affected > 0)
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
    fn create_then_load_round_trips() {
        let conn = memory_conn();
        let created = create_relay(&conn, "wss://relay.example").unwrap().unwrap();
        let relays = load_relays(&conn).unwrap();
        assert_eq!(relays, vec![created]);
    }

    #[test]
    fn create_duplicate_url_returns_none() {
        let conn = memory_conn();
        create_relay(&conn, "wss://relay.example").unwrap();
        let second = create_relay(&conn, "wss://relay.example").unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn delete_reports_whether_a_row_existed() {
        let conn = memory_conn();
        create_relay(&conn, "wss://relay.example").unwrap();
        assert!(delete_relay(&conn, "wss://relay.example").unwrap());
        assert!(!delete_relay(&conn, "wss://relay.example").unwrap());
    }
}
