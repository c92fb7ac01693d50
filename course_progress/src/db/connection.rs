//! SQLite connection helpers.
//!
//! [`connect_sqlite`] opens a connection and applies the PRAGMAs every
//! connection in this crate relies on: WAL journaling, foreign_keys=ON (the
//! catalog and progress tables use `ON DELETE CASCADE`), and a 5000ms
//! busy_timeout so concurrent writers wait instead of failing immediately.

use anyhow::bail;
use diesel::{Connection, RunQueryDsl, SqliteConnection, sql_query};

/// Strip an optional `sqlite:` / `sqlite://` scheme from a database URL.
///
/// Bare paths and `:memory:` pass through. Server URLs are rejected since only
/// SQLite is supported.
pub fn sqlite_path(database_url: &str) -> anyhow::Result<&str> {
    let url = database_url.trim();
    if url.starts_with("postgres://")
        || url.starts_with("postgresql://")
        || url.starts_with("mysql://")
    {
        bail!("Unsupported DATABASE_URL: {url} (only SQLite is supported)");
    }
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    if path.is_empty() {
        bail!("DATABASE_URL does not name a database file");
    }
    Ok(path)
}

/// Open a SQLite connection and apply connection-wide PRAGMAs.
pub fn connect_sqlite(database_url: &str) -> anyhow::Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(sqlite_path(database_url)?)?;

    sql_query("PRAGMA journal_mode=WAL;").execute(&mut conn)?;
    sql_query("PRAGMA foreign_keys=ON;").execute(&mut conn)?;
    sql_query("PRAGMA busy_timeout=5000;").execute(&mut conn)?;
    Ok(conn)
}
