//! Store - SQLite-backed persistence
//!
//! A single database file (`phasestore.db`) inside the store directory.
//! Schema migrations are versioned through the `schema_version` table.

use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::now_ms;
use crate::records::{NewMessage, StoredAnalysis, StoredMessage, StoredPhaseRecord};

/// Schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// Database file name inside the store directory
const DB_FILE: &str = "phasestore.db";

/// How long a writer waits on a lock held by another process
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store for messages, phase records and analyses
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) the store in the given directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        debug!(dir = %dir.display(), "Store::open: called");
        std::fs::create_dir_all(dir).context("Failed to create store directory")?;

        let path = dir.join(DB_FILE);
        let conn = Connection::open(&path).context(format!("Failed to open database {}", path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let store = Self { conn, path: Some(path) };
        store.migrate()?;
        info!(path = ?store.path, "Store opened");
        Ok(store)
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> Result<Self> {
        debug!("Store::open_in_memory: called");
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self { conn, path: None };
        store.migrate()?;
        Ok(store)
    }

    /// Path of the database file (None for in-memory stores)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn migrate(&self) -> Result<()> {
        debug!("Store::migrate: called");
        self.conn
            .execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)", [])?;

        let current: i32 = self
            .conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))?;

        if current < 1 {
            info!("Store::migrate: applying schema v1");
            self.conn
                .execute_batch(
                    r#"
                    CREATE TABLE IF NOT EXISTS messages (
                        seq INTEGER PRIMARY KEY AUTOINCREMENT,
                        id TEXT NOT NULL UNIQUE,
                        project TEXT NOT NULL,
                        agent TEXT NOT NULL,
                        role TEXT NOT NULL,
                        content TEXT NOT NULL,
                        created_at INTEGER NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_messages_project_agent ON messages(project, agent, seq);

                    CREATE TABLE IF NOT EXISTS phase_records (
                        project TEXT NOT NULL,
                        phase_type TEXT NOT NULL,
                        content TEXT NOT NULL,
                        completed INTEGER NOT NULL DEFAULT 0,
                        created_at INTEGER NOT NULL,
                        updated_at INTEGER NOT NULL,
                        UNIQUE(project, phase_type)
                    );

                    CREATE TABLE IF NOT EXISTS analysis_records (
                        project TEXT NOT NULL,
                        agent TEXT NOT NULL,
                        analysis_id TEXT NOT NULL,
                        content TEXT NOT NULL,
                        completed INTEGER NOT NULL DEFAULT 0,
                        updated_at INTEGER NOT NULL,
                        UNIQUE(project, agent, analysis_id)
                    );
                    "#,
                )
                .context("Failed to apply schema v1")?;
            self.conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    // === Messages ===

    /// Append a message; the store assigns its sequence number
    pub fn append_message(&mut self, message: NewMessage) -> Result<StoredMessage> {
        debug!(project = %message.project, agent = %message.agent, role = %message.role, "Store::append_message: called");
        self.conn
            .execute(
                "INSERT INTO messages (id, project, agent, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id,
                    message.project,
                    message.agent,
                    message.role,
                    message.content,
                    message.created_at
                ],
            )
            .context("Failed to insert message")?;

        let seq = self.conn.last_insert_rowid();
        Ok(StoredMessage {
            seq,
            id: message.id,
            project: message.project,
            agent: message.agent,
            role: message.role,
            content: message.content,
            created_at: message.created_at,
        })
    }

    /// All messages of a project in sequence order
    pub fn list_messages(&self, project: &str) -> Result<Vec<StoredMessage>> {
        debug!(%project, "Store::list_messages: called");
        let mut stmt = self.conn.prepare(
            "SELECT seq, id, project, agent, role, content, created_at
             FROM messages WHERE project = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![project], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Messages of one (project, agent) transcript in sequence order
    pub fn list_messages_for_agent(&self, project: &str, agent: &str) -> Result<Vec<StoredMessage>> {
        debug!(%project, %agent, "Store::list_messages_for_agent: called");
        let mut stmt = self.conn.prepare(
            "SELECT seq, id, project, agent, role, content, created_at
             FROM messages WHERE project = ?1 AND agent = ?2 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![project, agent], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Number of messages in one (project, agent) transcript
    pub fn count_messages(&self, project: &str, agent: &str) -> Result<u64> {
        debug!(%project, %agent, "Store::count_messages: called");
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE project = ?1 AND agent = ?2",
            params![project, agent],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Delete a whole (project, agent) transcript, returning how many rows went
    pub fn delete_messages(&mut self, project: &str, agent: &str) -> Result<usize> {
        debug!(%project, %agent, "Store::delete_messages: called");
        let deleted = self
            .conn
            .execute(
                "DELETE FROM messages WHERE project = ?1 AND agent = ?2",
                params![project, agent],
            )
            .context("Failed to delete messages")?;
        info!(%project, %agent, deleted, "Deleted transcript");
        Ok(deleted)
    }

    // === Phase records ===

    /// Insert or update the deliverable for (project, phase_type)
    ///
    /// `completed` only ever moves from false to true.
    pub fn upsert_phase_record(
        &mut self,
        project: &str,
        phase_type: &str,
        content: &str,
        completed: bool,
    ) -> Result<StoredPhaseRecord> {
        debug!(%project, %phase_type, %completed, "Store::upsert_phase_record: called");
        let now = now_ms();
        self.conn
            .execute(
                "INSERT INTO phase_records (project, phase_type, content, completed, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(project, phase_type) DO UPDATE SET
                    content = excluded.content,
                    completed = MAX(phase_records.completed, excluded.completed),
                    updated_at = excluded.updated_at",
                params![project, phase_type, content, completed, now],
            )
            .context("Failed to upsert phase record")?;

        self.get_phase_record(project, phase_type)?
            .ok_or_else(|| eyre::eyre!("Phase record {}/{} missing after upsert", project, phase_type))
    }

    /// Get the deliverable for (project, phase_type)
    pub fn get_phase_record(&self, project: &str, phase_type: &str) -> Result<Option<StoredPhaseRecord>> {
        debug!(%project, %phase_type, "Store::get_phase_record: called");
        let record = self
            .conn
            .query_row(
                "SELECT project, phase_type, content, completed, created_at, updated_at
                 FROM phase_records WHERE project = ?1 AND phase_type = ?2",
                params![project, phase_type],
                phase_record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// All deliverables of a project
    pub fn list_phase_records(&self, project: &str) -> Result<Vec<StoredPhaseRecord>> {
        debug!(%project, "Store::list_phase_records: called");
        let mut stmt = self.conn.prepare(
            "SELECT project, phase_type, content, completed, created_at, updated_at
             FROM phase_records WHERE project = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![project], phase_record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // === Analysis records ===

    /// Insert or update the analysis for (project, agent, analysis_id)
    pub fn upsert_analysis(
        &mut self,
        project: &str,
        agent: &str,
        analysis_id: &str,
        content: &str,
        completed: bool,
    ) -> Result<StoredAnalysis> {
        debug!(%project, %agent, %analysis_id, %completed, "Store::upsert_analysis: called");
        let now = now_ms();
        self.conn
            .execute(
                "INSERT INTO analysis_records (project, agent, analysis_id, content, completed, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(project, agent, analysis_id) DO UPDATE SET
                    content = excluded.content,
                    completed = MAX(analysis_records.completed, excluded.completed),
                    updated_at = excluded.updated_at",
                params![project, agent, analysis_id, content, completed, now],
            )
            .context("Failed to upsert analysis")?;

        let record = self.conn.query_row(
            "SELECT project, agent, analysis_id, content, completed, updated_at
             FROM analysis_records WHERE project = ?1 AND agent = ?2 AND analysis_id = ?3",
            params![project, agent, analysis_id],
            analysis_from_row,
        )?;
        Ok(record)
    }

    /// All analyses for one (project, agent)
    pub fn list_analyses(&self, project: &str, agent: &str) -> Result<Vec<StoredAnalysis>> {
        debug!(%project, %agent, "Store::list_analyses: called");
        let mut stmt = self.conn.prepare(
            "SELECT project, agent, analysis_id, content, completed, updated_at
             FROM analysis_records WHERE project = ?1 AND agent = ?2 ORDER BY analysis_id ASC",
        )?;
        let rows = stmt
            .query_map(params![project, agent], analysis_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<StoredMessage> {
    Ok(StoredMessage {
        seq: row.get(0)?,
        id: row.get(1)?,
        project: row.get(2)?,
        agent: row.get(3)?,
        role: row.get(4)?,
        content: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn phase_record_from_row(row: &Row<'_>) -> rusqlite::Result<StoredPhaseRecord> {
    Ok(StoredPhaseRecord {
        project: row.get(0)?,
        phase_type: row.get(1)?,
        content: row.get(2)?,
        completed: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn analysis_from_row(row: &Row<'_>) -> rusqlite::Result<StoredAnalysis> {
    Ok(StoredAnalysis {
        project: row.get(0)?,
        agent: row.get(1)?,
        analysis_id: row.get(2)?,
        content: row.get(3)?,
        completed: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn message(id: &str, project: &str, agent: &str, role: &str, content: &str) -> NewMessage {
        NewMessage {
            id: id.to_string(),
            project: project.to_string(),
            agent: agent.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: now_ms(),
        }
    }

    #[test]
    fn test_append_assigns_increasing_seq() {
        let mut store = Store::open_in_memory().unwrap();
        let a = store.append_message(message("m1", "p1", "ba", "user", "hi")).unwrap();
        let b = store.append_message(message("m2", "p1", "ba", "assistant", "hello")).unwrap();
        assert!(b.seq > a.seq);

        let all = store.list_messages("p1").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "m1");
        assert_eq!(all[1].id, "m2");
    }

    #[test]
    fn test_messages_partitioned_by_project_and_agent() {
        let mut store = Store::open_in_memory().unwrap();
        store.append_message(message("m1", "p1", "ba", "user", "a")).unwrap();
        store.append_message(message("m2", "p1", "pm", "user", "b")).unwrap();
        store.append_message(message("m3", "p2", "ba", "user", "c")).unwrap();

        assert_eq!(store.list_messages("p1").unwrap().len(), 2);
        assert_eq!(store.list_messages_for_agent("p1", "ba").unwrap().len(), 1);
        assert_eq!(store.count_messages("p1", "pm").unwrap(), 1);
        assert_eq!(store.count_messages("p2", "pm").unwrap(), 0);
    }

    #[test]
    fn test_delete_messages_only_touches_one_agent() {
        let mut store = Store::open_in_memory().unwrap();
        store.append_message(message("m1", "p1", "sm", "user", "a")).unwrap();
        store.append_message(message("m2", "p1", "sm", "assistant", "b")).unwrap();
        store.append_message(message("m3", "p1", "ba", "user", "c")).unwrap();

        let deleted = store.delete_messages("p1", "sm").unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count_messages("p1", "sm").unwrap(), 0);
        assert_eq!(store.count_messages("p1", "ba").unwrap(), 1);
    }

    #[test]
    fn test_phase_record_completed_is_sticky() {
        let mut store = Store::open_in_memory().unwrap();
        let first = store.upsert_phase_record("p1", "prd", "{\"v\":1}", true).unwrap();
        assert!(first.completed);

        let second = store.upsert_phase_record("p1", "prd", "{\"v\":2}", false).unwrap();
        assert!(second.completed);
        assert_eq!(second.content, "{\"v\":2}");
        assert_eq!(store.list_phase_records("p1").unwrap().len(), 1);
    }

    #[test]
    fn test_get_missing_phase_record() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_phase_record("p1", "prd").unwrap().is_none());
    }

    #[test]
    fn test_upsert_analysis_replaces_content() {
        let mut store = Store::open_in_memory().unwrap();
        store.upsert_analysis("p1", "ba", "pain-points", "first", true).unwrap();
        let updated = store.upsert_analysis("p1", "ba", "pain-points", "second", true).unwrap();
        assert_eq!(updated.content, "second");

        let all = store.list_analyses("p1", "ba").unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].completed);
    }

    #[test]
    fn test_reopen_preserves_data() {
        let temp = tempdir().unwrap();
        {
            let mut store = Store::open(temp.path()).unwrap();
            store.append_message(message("m1", "p1", "ba", "user", "persist me")).unwrap();
            store.upsert_phase_record("p1", "project-brief", "{}", true).unwrap();
        }

        let store = Store::open(temp.path()).unwrap();
        let messages = store.list_messages("p1").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "persist me");
        assert!(store.get_phase_record("p1", "project-brief").unwrap().unwrap().completed);
        assert!(store.path().is_some());
    }
}
