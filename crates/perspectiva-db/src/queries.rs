use crate::Database;
use crate::models::CommentRow;
use anyhow::Result;
use rusqlite::{Connection, Row};

const COMMENT_COLUMNS: &str = "id, created_at, updated_at, user_email, payload, reply_of, theme";

/// Result of an insert. A `reply_of` that points outside the theme (or
/// nowhere) is refused before touching the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    UnknownParent,
}

impl Database {
    // -- Comments --

    /// All comments of a theme, oldest first.
    pub fn list_comments(&self, theme: &str) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| query_comments(conn, theme))
    }

    pub fn get_comment(&self, id: &str, theme: &str) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| query_comment(conn, id, theme))
    }

    pub fn insert_comment(&self, row: &CommentRow) -> Result<InsertOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if let Some(parent) = row.reply_of.as_deref() {
                if query_comment(&tx, parent, &row.theme)?.is_none() {
                    return Ok(InsertOutcome::UnknownParent);
                }
            }

            tx.execute(
                &format!("INSERT INTO comments ({COMMENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                rusqlite::params![
                    row.id,
                    row.created_at,
                    row.updated_at,
                    row.user_email,
                    row.payload,
                    row.reply_of,
                    row.theme,
                ],
            )?;
            tx.commit()?;
            Ok(InsertOutcome::Inserted)
        })
    }

    /// Replace the payload and bump `updated_at`. Returns the stored row, or
    /// `None` when no comment with that id exists in the theme.
    pub fn update_comment_payload(
        &self,
        id: &str,
        theme: &str,
        payload: &str,
        updated_at: &str,
    ) -> Result<Option<CommentRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE comments SET payload = ?1, updated_at = ?2 WHERE id = ?3 AND theme = ?4",
                rusqlite::params![payload, updated_at, id, theme],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let row = query_comment(&tx, id, theme)?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// Returns false when nothing matched.
    pub fn delete_comment(&self, id: &str, theme: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM comments WHERE id = ?1 AND theme = ?2",
                rusqlite::params![id, theme],
            )?;
            Ok(deleted > 0)
        })
    }
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
        user_email: row.get(3)?,
        payload: row.get(4)?,
        reply_of: row.get(5)?,
        theme: row.get(6)?,
    })
}

fn query_comment(conn: &Connection, id: &str, theme: &str) -> Result<Option<CommentRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1 AND theme = ?2"
    ))?;

    let row = stmt
        .query_row(rusqlite::params![id, theme], comment_from_row)
        .optional()?;

    Ok(row)
}

fn query_comments(conn: &Connection, theme: &str) -> Result<Vec<CommentRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COMMENT_COLUMNS} FROM comments
         WHERE theme = ?1
         ORDER BY created_at ASC, rowid ASC"
    ))?;

    let rows = stmt
        .query_map([theme], comment_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
