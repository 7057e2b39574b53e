use super::{RowHandle, Sink};
use crate::Result;
use crate::event::ChatRow;
use rusqlite::{Connection, params};
use std::path::Path;
use tracing::{debug, info};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS messages (
    timestamp TEXT,
    author TEXT,
    text TEXT,
    status TEXT NOT NULL DEFAULT '',
    moderator TEXT NOT NULL DEFAULT ''
)";

/// `messages` table in a SQLite database. Handles are rowids.
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        info!("Chat database → {}", path.display());
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Create the table, or add the moderation columns to a table written by an
/// older three-column layout.
fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(SCHEMA, [])?;

    let columns = {
        let mut stmt = conn.prepare("PRAGMA table_info(messages)")?;
        stmt.query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?
    };
    for column in ["status", "moderator"] {
        if !columns.iter().any(|c| c == column) {
            debug!("Adding column `{}` to messages", column);
            conn.execute(
                &format!("ALTER TABLE messages ADD COLUMN {column} TEXT NOT NULL DEFAULT ''"),
                [],
            )?;
        }
    }
    Ok(())
}

impl Sink for SqliteSink {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn append(&mut self, row: &ChatRow) -> Result<RowHandle> {
        self.conn.execute(
            "INSERT INTO messages(timestamp, author, text, status, moderator) VALUES(?1, ?2, ?3, ?4, ?5)",
            params![row.timestamp(), row.author, row.text, row.status, row.actor],
        )?;
        Ok(RowHandle(self.conn.last_insert_rowid() as u64))
    }

    fn update_status(&mut self, handle: RowHandle, status: &str, actor: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE messages SET status = ?1, moderator = ?2 WHERE rowid = ?3",
            params![status, actor, handle.0 as i64],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn row(author: &str, text: &str) -> ChatRow {
        ChatRow {
            observed_at: Local::now(),
            author: author.into(),
            text: text.into(),
            status: String::new(),
            actor: String::new(),
        }
    }

    type Stored = (String, String, String, String);

    fn stored(author: &str, text: &str, status: &str, moderator: &str) -> Stored {
        (author.into(), text.into(), status.into(), moderator.into())
    }

    fn all(conn: &Connection) -> Vec<Stored> {
        let mut stmt = conn
            .prepare("SELECT author, text, status, moderator FROM messages ORDER BY rowid")
            .unwrap();
        stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn update_only_touches_status_columns() {
        let mut sink = SqliteSink::in_memory().unwrap();
        let alice = sink.append(&row("alice", "hi")).unwrap();
        sink.append(&row("bob", "bye")).unwrap();
        sink.update_status(alice, "Deleted by mod", "mod1").unwrap();

        assert_eq!(
            all(sink.connection()),
            vec![
                stored("alice", "hi", "Deleted by mod", "mod1"),
                stored("bob", "bye", "", ""),
            ]
        );
    }

    #[test]
    fn migrates_three_column_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute("CREATE TABLE messages (timestamp TEXT, author TEXT, text TEXT)", [])
                .unwrap();
            conn.execute(
                "INSERT INTO messages VALUES('2024-01-01 00:00:00', 'old', 'row')",
                [],
            )
            .unwrap();
        }

        let mut sink = SqliteSink::open(&path).unwrap();
        let h = sink.append(&row("new", "row")).unwrap();
        sink.update_status(h, "Banned", "").unwrap();

        assert_eq!(
            all(sink.connection()),
            vec![
                stored("old", "row", "", ""),
                stored("new", "row", "Banned", ""),
            ]
        );
    }
}
