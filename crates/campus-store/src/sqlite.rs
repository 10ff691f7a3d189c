//! SQLite session store

use anyhow::{Context, Result};
use campus_core::types::Turn;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Session row
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<JsonValue>,
}

/// Sessions and their turns (thread-safe via Arc<Mutex>)
#[derive(Clone)]
pub struct SessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SessionStore {
    /// Open or create the database at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        info!("Initializing session database at {:?}", path);
        Self::init(conn)
    }

    /// Private database that disappears with the store
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                metadata TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                sender TEXT NOT NULL,
                text TEXT NOT NULL,
                meta TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, id)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` on the connection from the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(|poisoned| {
                warn!("Database mutex was poisoned, recovering");
                poisoned.into_inner()
            });
            f(&mut conn)
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    /// Create a session with a fresh v4 id
    pub async fn create_session(&self, metadata: Option<JsonValue>) -> Result<SessionInfo> {
        self.with_conn(move |conn| {
            let info = SessionInfo {
                id: Uuid::new_v4().to_string(),
                created_at: Utc::now(),
                metadata,
            };
            let metadata_json = info
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            conn.execute(
                "INSERT INTO sessions (id, created_at, metadata) VALUES (?1, ?2, ?3)",
                params![&info.id, info.created_at.to_rfc3339(), metadata_json],
            )?;

            debug!("Created session {}", info.id);
            Ok(info)
        })
        .await
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<SessionInfo>> {
        let id = id.to_owned();
        self.with_conn(move |conn| {
            let session = conn
                .query_row(
                    "SELECT id, created_at, metadata FROM sessions WHERE id = ?1",
                    params![&id],
                    |row| {
                        let metadata: Option<String> = row.get(2)?;
                        Ok(SessionInfo {
                            id: row.get(0)?,
                            created_at: parse_timestamp(&row.get::<_, String>(1)?),
                            metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
                        })
                    },
                )
                .optional()?;
            Ok(session)
        })
        .await
    }

    pub async fn session_exists(&self, id: &str) -> Result<bool> {
        Ok(self.get_session(id).await?.is_some())
    }

    pub async fn append_turn(&self, session_id: &str, turn: Turn) -> Result<()> {
        self.append_turns(session_id, vec![turn]).await
    }

    /// Append turns in order, all or nothing
    pub async fn append_turns(&self, session_id: &str, turns: Vec<Turn>) -> Result<()> {
        let session_id = session_id.to_owned();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO messages (session_id, sender, text, meta, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for turn in &turns {
                    let meta = if turn.meta.is_null() {
                        None
                    } else {
                        Some(serde_json::to_string(&turn.meta)?)
                    };
                    stmt.execute(params![
                        &session_id,
                        &turn.sender,
                        &turn.text,
                        meta,
                        turn.created_at.to_rfc3339(),
                    ])
                    .with_context(|| format!("Failed to append turn to session {}", session_id))?;
                }
            }
            tx.commit()?;
            debug!("Appended {} turn(s) to session {}", turns.len(), session_id);
            Ok(())
        })
        .await
    }

    /// All turns of a session, oldest first
    pub async fn history(&self, session_id: &str) -> Result<Vec<Turn>> {
        let session_id = session_id.to_owned();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT sender, text, meta, created_at
                 FROM messages
                 WHERE session_id = ?1
                 ORDER BY id ASC",
            )?;
            let turns = stmt
                .query_map(params![&session_id], row_to_turn)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(turns)
        })
        .await
    }

    /// Delete a session and its turns; false if it did not exist
    pub async fn delete_session(&self, id: &str) -> Result<bool> {
        let id = id.to_owned();
        self.with_conn(move |conn| {
            let deleted = conn.execute("DELETE FROM sessions WHERE id = ?1", params![&id])?;
            if deleted > 0 {
                debug!("Deleted session {}", id);
            }
            Ok(deleted > 0)
        })
        .await
    }

    pub async fn session_count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}

fn row_to_turn(row: &rusqlite::Row) -> rusqlite::Result<Turn> {
    let meta: Option<String> = row.get(2)?;
    let meta = meta
        .map(|m| serde_json::from_str(&m))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?
        .unwrap_or(JsonValue::Null);

    Ok(Turn {
        sender: row.get(0)?,
        text: row.get(1)?,
        meta,
        created_at: parse_timestamp(&row.get::<_, String>(3)?),
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|_| Utc::now())
}
