// Append-only migrations. Never edit a shipped migration's SQL — add a new
// one instead, so every deployed database's upgrade path stays valid.

use rusqlite::Connection;

use crate::atoms::error::RelayResult;

pub fn run_migrations(conn: &Connection) -> RelayResult<()> {
    m001_relays(conn)?;
    m002_config(conn)?;
    m003_config_owner_and_extra(conn)?;
    Ok(())
}

fn m001_relays(conn: &Connection) -> RelayResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS relays (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL UNIQUE,
            active INTEGER NOT NULL DEFAULT 1
        );",
    )?;
    Ok(())
}

fn m002_config(conn: &Connection) -> RelayResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS config (
            data TEXT NOT NULL
        );",
    )?;
    Ok(())
}

/// Renames `config.data` to `config.extra` and adds `owner_id`, mirroring
/// the original source's settings table shape. SQLite can't `ALTER
/// COLUMN`, so this recreates the table when the old column is present;
/// a fresh database created by m002 above already has the right shape
/// once this runs, so the migration is a no-op there.
fn m003_config_owner_and_extra(conn: &Connection) -> RelayResult<()> {
    let has_legacy_column: bool = conn
        .prepare("SELECT 1 FROM pragma_table_info('config') WHERE name = 'data'")?
        .exists(())?;

    if has_legacy_column {
        conn.execute_batch(
            "ALTER TABLE config RENAME TO config_m002;
             CREATE TABLE config (
                 owner_id TEXT NOT NULL UNIQUE DEFAULT 'admin',
                 extra TEXT NOT NULL
             );
             INSERT INTO config (owner_id, extra) SELECT 'admin', data FROM config_m002;
             DROP TABLE config_m002;",
        )?;
    } else {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS config (
                owner_id TEXT NOT NULL UNIQUE DEFAULT 'admin',
                extra TEXT NOT NULL
            );",
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let relay_table_exists: bool = conn
            .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='relays'")
            .unwrap()
            .exists(())
            .unwrap();
        assert!(relay_table_exists);

        let config_has_extra: bool = conn
            .prepare("SELECT 1 FROM pragma_table_info('config') WHERE name = 'extra'")
            .unwrap()
            .exists(())
            .unwrap();
        assert!(config_has_extra);
    }
}
