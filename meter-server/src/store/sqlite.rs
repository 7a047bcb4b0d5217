//! `rusqlite`-backed case store. Schema follows the original per-PC case
//! database's `sessions`/`transcript_entries` tables, simplified to the
//! fields the session engine actually produces.

use std::path::Path;

use async_trait::async_trait;
use meter_core::session::{SessionPhase, SessionSummary, Turn};
use meter_core::CaseStore;
use parking_lot::Mutex;
use rusqlite::{params, Connection};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                pc_id TEXT NOT NULL,
                phase TEXT NOT NULL DEFAULT 'setup',
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS transcript_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                turn_number INTEGER NOT NULL DEFAULT 0,
                speaker TEXT NOT NULL DEFAULT '',
                text TEXT NOT NULL DEFAULT '',
                needle_action TEXT DEFAULT NULL,
                tone_arm REAL DEFAULT NULL,
                timestamp TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id),
                UNIQUE (session_id, turn_number, speaker)
            );
            ",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "
            CREATE TABLE sessions (id TEXT PRIMARY KEY, pc_id TEXT NOT NULL, phase TEXT NOT NULL, updated_at TEXT NOT NULL);
            CREATE TABLE transcript_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                turn_number INTEGER NOT NULL,
                speaker TEXT NOT NULL,
                text TEXT NOT NULL,
                needle_action TEXT,
                tone_arm REAL,
                timestamp TEXT NOT NULL,
                UNIQUE (session_id, turn_number, speaker)
            );
            ",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

#[async_trait]
impl CaseStore for SqliteStore {
    async fn persist_turn(&self, session_id: &str, turn: &Turn) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO transcript_entries
                (session_id, turn_number, speaker, text, needle_action, tone_arm, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session_id,
                turn.turn_number,
                format!("{:?}", turn.speaker),
                turn.text,
                turn.needle_action,
                turn.tone_arm,
                turn.iso_timestamp,
            ],
        )?;
        Ok(())
    }

    async fn persist_session_header(&self, session_id: &str, pc_id: &str, phase: SessionPhase) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (id, pc_id, phase, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(id) DO UPDATE SET phase = excluded.phase, updated_at = excluded.updated_at",
            params![session_id, pc_id, format!("{:?}", phase)],
        )?;
        Ok(())
    }

    async fn list_sessions(&self) -> anyhow::Result<Vec<SessionSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, pc_id, phase, updated_at FROM sessions ORDER BY updated_at DESC")?;
        let rows = stmt.query_map([], |row| {
            Ok(SessionSummary {
                session_id: row.get(0)?,
                pc_id: row.get(1)?,
                phase: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_core::session::Speaker;

    #[tokio::test]
    async fn persists_turn_and_header() {
        let store = SqliteStore::in_memory().unwrap();
        store.persist_session_header("sess-1", "pc-1", SessionPhase::StartRudiments).await.unwrap();
        let turn = Turn {
            turn_number: 1,
            speaker: Speaker::Auditor,
            text: "hello".into(),
            needle_action: None,
            tone_arm: None,
            iso_timestamp: "0.000".into(),
        };
        store.persist_turn("sess-1", &turn).await.unwrap();

        let conn = store.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM transcript_entries", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn persisting_turn_twice_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        store.persist_session_header("sess-1", "pc-1", SessionPhase::Processing).await.unwrap();
        let turn = Turn {
            turn_number: 1,
            speaker: Speaker::Pc,
            text: "hi".into(),
            needle_action: None,
            tone_arm: None,
            iso_timestamp: "0.000".into(),
        };
        store.persist_turn("sess-1", &turn).await.unwrap();
        store.persist_turn("sess-1", &turn).await.unwrap();

        let conn = store.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM transcript_entries", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn list_sessions_returns_persisted_headers() {
        let store = SqliteStore::in_memory().unwrap();
        store.persist_session_header("sess-1", "pc-1", SessionPhase::StartRudiments).await.unwrap();
        store.persist_session_header("sess-2", "pc-2", SessionPhase::Processing).await.unwrap();

        let sessions = store.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().any(|s| s.session_id == "sess-1" && s.pc_id == "pc-1"));
    }
}
