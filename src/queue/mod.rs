//! Offline mutation queue.
//!
//! When a store cannot be reached, the mutation lands here instead of being
//! lost. Only the latest intent per (note, kind) is kept, and entries replay
//! in timestamp order on reconnect or during the periodic online sweep.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entity::{MutationPayload, NoteSource, Owner, QueuedMutation};
use crate::error::{QuillError, Result};
use crate::store::NoteStore;

const QUEUE_DB: &str = "queue.db";

/// Oldest entries are evicted past this bound.
pub const QUEUE_CAPACITY: usize = 500;

/// Outcome of one replay pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
    pub replayed: usize,
    pub remaining: usize,
}

pub struct MutationQueue {
    conn: Mutex<Connection>,
    #[allow(dead_code)]
    path: Option<PathBuf>,
    capacity: usize,
}

impl MutationQueue {
    /// Open or create the queue database inside the client directory.
    pub fn open(quill_dir: &Path) -> Result<Self> {
        let path = quill_dir.join(QUEUE_DB);
        let conn = Connection::open(&path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
            capacity: QUEUE_CAPACITY,
        })
    }

    /// In-process queue for tests.
    pub fn in_memory() -> Result<Self> {
        Self::in_memory_with_capacity(QUEUE_CAPACITY)
    }

    pub fn in_memory_with_capacity(capacity: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
            capacity,
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS pending_mutations (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                note_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                queued_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_pending_note_kind
             ON pending_mutations(note_id, kind)",
            [],
        )?;

        Ok(())
    }

    /// Append an intent, replacing any queued entry for the same (note, kind).
    pub async fn enqueue(&self, mutation: &QueuedMutation) -> Result<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            "DELETE FROM pending_mutations WHERE note_id = ?1 AND kind = ?2",
            params![mutation.note_id.to_string(), mutation.kind.as_str()],
        )?;

        conn.execute(
            "INSERT INTO pending_mutations (id, kind, note_id, payload, queued_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                mutation.id.to_string(),
                mutation.kind.as_str(),
                mutation.note_id.to_string(),
                serde_json::to_string(&mutation.payload)?,
                mutation.queued_at,
            ],
        )?;

        // Size-bounded: evict oldest entries beyond capacity.
        conn.execute(
            "DELETE FROM pending_mutations WHERE id IN (
                 SELECT id FROM pending_mutations
                 ORDER BY queued_at DESC, id DESC
                 LIMIT -1 OFFSET ?1
             )",
            params![self.capacity as i64],
        )?;

        debug!(note_id = %mutation.note_id, kind = %mutation.kind, "queued offline mutation");
        Ok(())
    }

    pub async fn len(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM pending_mutations", [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// All queued entries in ascending timestamp order.
    pub async fn entries(&self) -> Result<Vec<QueuedMutation>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, kind, note_id, payload, queued_at FROM pending_mutations
             ORDER BY queued_at ASC, id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let kind: String = row.get(1)?;
            let note_id: String = row.get(2)?;
            let payload: String = row.get(3)?;
            let queued_at: i64 = row.get(4)?;
            Ok((id, kind, note_id, payload, queued_at))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, kind, note_id, payload, queued_at) = row?;
            entries.push(QueuedMutation {
                id: id
                    .parse()
                    .map_err(|_| QuillError::Storage(format!("bad queue id {id}")))?,
                kind: kind.parse()?,
                note_id: note_id
                    .parse()
                    .map_err(|_| QuillError::Storage(format!("bad note id {note_id}")))?,
                payload: serde_json::from_str(&payload)?,
                queued_at,
            });
        }
        Ok(entries)
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM pending_mutations WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }

    /// Replay queued entries in timestamp order against the store each one
    /// recorded. Successes are removed; failures stay queued for the next
    /// pass. A note that no longer exists makes its queued intents moot, so
    /// NotFound also clears the entry.
    pub async fn replay(
        &self,
        owner: &Owner,
        cache: &dyn NoteStore,
        durable: &dyn NoteStore,
    ) -> Result<ReplayReport> {
        let entries = self.entries().await?;
        let mut replayed = 0;

        for entry in entries {
            let store = match entry.payload.source() {
                NoteSource::Cache => cache,
                NoteSource::Durable => durable,
            };

            let result = match &entry.payload {
                MutationPayload::Create { note } => store.create(owner, note).await,
                MutationPayload::Update { field, .. } => {
                    store.update_field(owner, entry.note_id, field.clone()).await
                }
                MutationPayload::Delete { .. } => store.delete(owner, entry.note_id).await,
            };

            match result {
                Ok(()) => {
                    self.remove(entry.id).await?;
                    replayed += 1;
                }
                // Already applied or target gone: nothing left to replay.
                Err(QuillError::Conflict(_)) | Err(QuillError::NotFound(_)) => {
                    self.remove(entry.id).await?;
                    replayed += 1;
                }
                Err(err) => {
                    warn!(%err, note_id = %entry.note_id, kind = %entry.kind, "replay failed, keeping entry");
                }
            }
        }

        let remaining = self.len().await?;
        Ok(ReplayReport { replayed, remaining })
    }
}
