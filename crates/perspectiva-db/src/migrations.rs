use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Highest migration applied so far; 0 for a fresh file.
pub fn current_version(conn: &Connection) -> Result<i64> {
    let version =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;
    Ok(version)
}

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version = current_version(conn)?;

    if version < 1 {
        info!("Running migration v1 (comments)");
        conn.execute_batch(
            "
            CREATE TABLE comments (
                id          TEXT PRIMARY KEY,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                user_email  TEXT NOT NULL,
                payload     TEXT NOT NULL,
                reply_of    TEXT REFERENCES comments(id) ON DELETE SET NULL,
                theme       TEXT NOT NULL
            );

            CREATE INDEX idx_comments_theme
                ON comments(theme, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
