//! Durable relational store adapter.
//!
//! Rows are scoped by the authenticated user id in every statement, so
//! ownership enforcement lives in the store itself. Unlike the cache side this
//! store supports per-row partial updates and server-side ordering on read.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params, Connection, Row};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::NoteStore;
use crate::entity::{now_ms, Note, NoteField, NoteSource, OrderUpdate, Owner};
use crate::error::{QuillError, Result};

const NOTES_DB: &str = "notes.db";

pub struct DurableStore {
    conn: Mutex<Connection>,
    #[allow(dead_code)]
    path: PathBuf,
}

impl DurableStore {
    /// Open or create the durable database inside the client directory.
    pub fn open(quill_dir: &Path) -> Result<Self> {
        let path = quill_dir.join(NOTES_DB);
        let conn = Connection::open(&path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS notes (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                pinned INTEGER NOT NULL DEFAULT 0,
                is_private INTEGER NOT NULL DEFAULT 0,
                is_collapsed INTEGER NOT NULL DEFAULT 0,
                display_order INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                goal INTEGER,
                goal_type TEXT NOT NULL DEFAULT 'none'
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_notes_owner ON notes(owner_id)",
            [],
        )?;

        Ok(())
    }

    fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
        let id: String = row.get("id")?;
        let goal_type: String = row.get("goal_type")?;
        Ok(Note {
            id: id.parse().unwrap_or_default(),
            source: NoteSource::Durable,
            title: row.get("title")?,
            content: row.get("content")?,
            pinned: row.get("pinned")?,
            is_private: row.get("is_private")?,
            is_collapsed: row.get("is_collapsed")?,
            order: row.get("display_order")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            goal: row.get("goal")?,
            goal_type: goal_type.parse().unwrap_or_default(),
        })
    }
}

#[async_trait]
impl NoteStore for DurableStore {
    fn source(&self) -> NoteSource {
        NoteSource::Durable
    }

    async fn get_all(&self, owner: &Owner) -> Result<Vec<Note>> {
        let user = owner.user_id()?;
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare(
            "SELECT * FROM notes WHERE owner_id = ?1
             ORDER BY display_order ASC, updated_at DESC",
        )?;
        let notes = stmt
            .query_map(params![user], Self::note_from_row)?
            .collect::<rusqlite::Result<Vec<Note>>>()?;
        Ok(notes)
    }

    async fn create(&self, owner: &Owner, note: &Note) -> Result<()> {
        let user = owner.user_id()?;
        let conn = self.conn.lock().await;

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO notes
             (id, owner_id, title, content, pinned, is_private, is_collapsed,
              display_order, created_at, updated_at, goal, goal_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                note.id.to_string(),
                user,
                note.title,
                note.content,
                note.pinned,
                note.is_private,
                note.is_collapsed,
                note.order,
                note.created_at,
                note.updated_at,
                note.goal,
                note.goal_type.as_str(),
            ],
        )?;
        if inserted == 0 {
            return Err(QuillError::Conflict(note.id.to_string()));
        }
        Ok(())
    }

    async fn update_field(&self, owner: &Owner, id: Uuid, field: NoteField) -> Result<()> {
        let user = owner.user_id()?;
        let conn = self.conn.lock().await;

        let (column, value): (&str, rusqlite::types::Value) = match &field {
            NoteField::Title(v) => ("title", v.clone().into()),
            NoteField::Content(v) => ("content", v.clone().into()),
            NoteField::Pinned(v) => ("pinned", (*v).into()),
            NoteField::Private(v) => ("is_private", (*v).into()),
            NoteField::Collapsed(v) => ("is_collapsed", (*v).into()),
            NoteField::Order(v) => ("display_order", (*v).into()),
            NoteField::Goal(v) => ("goal", v.map(i64::from).into()),
            NoteField::GoalType(v) => ("goal_type", v.as_str().to_string().into()),
        };

        let updated = conn.execute(
            &format!(
                "UPDATE notes SET {column} = ?1, updated_at = ?2 WHERE id = ?3 AND owner_id = ?4"
            ),
            params![value, now_ms(), id.to_string(), user],
        )?;
        if updated == 0 {
            return Err(QuillError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, owner: &Owner, id: Uuid) -> Result<()> {
        let user = owner.user_id()?;
        let conn = self.conn.lock().await;

        let deleted = conn.execute(
            "DELETE FROM notes WHERE id = ?1 AND owner_id = ?2",
            params![id.to_string(), user],
        )?;
        if deleted == 0 {
            return Err(QuillError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn batch_update_order(&self, owner: &Owner, updates: &[OrderUpdate]) -> Result<()> {
        let user = owner.user_id()?;
        let mut conn = self.conn.lock().await;

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE notes SET display_order = ?1, updated_at = ?2
                 WHERE id = ?3 AND owner_id = ?4",
            )?;
            for update in updates {
                stmt.execute(params![
                    update.order,
                    now_ms(),
                    update.note_id.to_string(),
                    user
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
