//! Ephemeral TTL-bound store adapter.
//!
//! The backing store has no partial-update primitive, so the owner's whole
//! collection lives as one JSON value under one key and every mutation is a
//! full read-modify-write that renews the TTL. O(n) per write and non-atomic
//! across concurrent writers; cross-writer races are resolved by the engine's
//! reconciling reload, not by locking.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::NoteStore;
use crate::entity::{now_ms, Note, NoteField, NoteSource, OrderUpdate, Owner};
use crate::error::{QuillError, Result};

const CACHE_DB: &str = "cache.db";

/// Collection time-to-live: two months, renewed on every write.
pub const CACHE_TTL_MS: i64 = 60 * 24 * 60 * 60 * 1000;

pub struct CacheStore {
    conn: Mutex<Connection>,
    #[allow(dead_code)]
    path: PathBuf,
    ttl_ms: i64,
}

impl CacheStore {
    /// Open or create the cache database inside the client directory.
    pub fn open(quill_dir: &Path) -> Result<Self> {
        Self::open_with_ttl(quill_dir, CACHE_TTL_MS)
    }

    pub fn open_with_ttl(quill_dir: &Path, ttl_ms: i64) -> Result<Self> {
        let path = quill_dir.join(CACHE_DB);
        let conn = Connection::open(&path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
            ttl_ms,
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn key(owner: &Owner) -> String {
        format!("notes:{}", owner.device_id)
    }

    /// Read the owner's full collection. An expired or missing entry reads as
    /// empty.
    fn read_collection(conn: &Connection, key: &str) -> Result<Vec<Note>> {
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT value, expires_at FROM kv WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((value, expires_at)) if expires_at > now_ms() => {
                let notes: Vec<Note> = serde_json::from_str(&value)?;
                Ok(notes)
            }
            _ => Ok(Vec::new()),
        }
    }

    fn write_collection(&self, conn: &Connection, key: &str, notes: &[Note]) -> Result<()> {
        let value = serde_json::to_string(notes)?;
        let expires_at = now_ms() + self.ttl_ms;
        conn.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, expires_at = ?3",
            params![key, value, expires_at],
        )?;
        Ok(())
    }

    /// Read-modify-write template shared by every mutation.
    async fn modify<F>(&self, owner: &Owner, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Note>) -> Result<()>,
    {
        let conn = self.conn.lock().await;
        let key = Self::key(owner);
        let mut notes = Self::read_collection(&conn, &key)?;
        apply(&mut notes)?;
        self.write_collection(&conn, &key, &notes)
    }
}

#[async_trait]
impl NoteStore for CacheStore {
    fn source(&self) -> NoteSource {
        NoteSource::Cache
    }

    async fn get_all(&self, owner: &Owner) -> Result<Vec<Note>> {
        let conn = self.conn.lock().await;
        Self::read_collection(&conn, &Self::key(owner))
    }

    async fn create(&self, owner: &Owner, note: &Note) -> Result<()> {
        let note = note.clone();
        self.modify(owner, move |notes| {
            if notes.iter().any(|n| n.id == note.id) {
                return Err(QuillError::Conflict(note.id.to_string()));
            }
            notes.push(note);
            Ok(())
        })
        .await
    }

    async fn update_field(&self, owner: &Owner, id: Uuid, field: NoteField) -> Result<()> {
        self.modify(owner, move |notes| {
            let note = notes
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or_else(|| QuillError::NotFound(id.to_string()))?;
            note.apply(&field);
            Ok(())
        })
        .await
    }

    async fn delete(&self, owner: &Owner, id: Uuid) -> Result<()> {
        self.modify(owner, move |notes| {
            let before = notes.len();
            notes.retain(|n| n.id != id);
            if notes.len() == before {
                return Err(QuillError::NotFound(id.to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn batch_update_order(&self, owner: &Owner, updates: &[OrderUpdate]) -> Result<()> {
        let updates = updates.to_vec();
        self.modify(owner, move |notes| {
            for update in &updates {
                if let Some(note) = notes.iter_mut().find(|n| n.id == update.note_id) {
                    note.order = update.order;
                    note.touch();
                }
            }
            Ok(())
        })
        .await
    }
}
