//! Embedded schema migrations.

use anyhow::anyhow;
use diesel::{Connection, SqliteConnection, connection::SimpleConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use super::connection::sqlite_path;

/// Embedded Diesel migrations bundled with this crate.
///
/// These are applied by [`run_sqlite`] to bring the database schema up to date.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Runs pending Diesel migrations on a SQLite database at the given path.
///
/// Sets WAL journaling first (a persistent property of the file) and returns
/// an error on failure.
pub fn run_sqlite(path: &str) -> anyhow::Result<()> {
    let mut conn = SqliteConnection::establish(path)?;
    conn.batch_execute("PRAGMA journal_mode=WAL;")?;
    conn.run_pending_migrations(MIGRATIONS).map_err(|e| anyhow!(e))?;
    Ok(())
}

/// Runs pending migrations for a `DATABASE_URL` (bare path or `sqlite:` URL).
pub fn run_all(database_url: &str) -> anyhow::Result<()> {
    run_sqlite(sqlite_path(database_url)?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn migrations_apply_on_temp_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let path = temp.path().to_string_lossy().to_string();

        run_sqlite(&path).expect("migration run");
        // Second run is a no-op.
        run_all(&format!("sqlite:{path}")).expect("idempotent");

        let mut conn = SqliteConnection::establish(&path).unwrap();
        conn.batch_execute(
            "INSERT INTO course (slug, title, teacher_name) VALUES ('c', 'C', 'T');
             INSERT INTO chapter (course_id, title, position) VALUES (1, 'ch', 1);",
        )
        .unwrap();
    }
}
