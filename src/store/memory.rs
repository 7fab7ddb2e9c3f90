//! HashMap-backed store used by engine and queue tests. Supports injecting
//! transient failures and simulating an unreachable backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::NoteStore;
use crate::entity::{Note, NoteField, NoteSource, OrderUpdate, Owner};
use crate::error::{QuillError, Result};

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Vec<Note>>,
    fail_next: u32,
    fail_next_delete: u32,
    offline: bool,
    update_calls: u32,
    delay: Option<std::time::Duration>,
}

pub struct MemoryStore {
    source: NoteSource,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(source: NoteSource) -> Self {
        Self {
            source,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Make the next `n` calls fail with a transient Storage error.
    pub async fn fail_next(&self, n: u32) {
        self.inner.lock().await.fail_next = n;
    }

    /// Make only the next `n` delete calls fail.
    pub async fn fail_next_delete(&self, n: u32) {
        self.inner.lock().await.fail_next_delete = n;
    }

    /// Simulate connectivity loss: every call fails with Unavailable.
    pub async fn set_offline(&self, offline: bool) {
        self.inner.lock().await.offline = offline;
    }

    /// Add artificial latency to every call.
    pub async fn set_delay(&self, delay: std::time::Duration) {
        self.inner.lock().await.delay = Some(delay);
    }

    async fn simulate_latency(&self) {
        let delay = self.inner.lock().await.delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Seed a note directly, bypassing fault injection.
    pub async fn insert(&self, owner: &Owner, note: Note) {
        let mut inner = self.inner.lock().await;
        let key = self.key_unchecked(owner);
        inner.collections.entry(key).or_default().push(note);
    }

    /// How many `update_field` calls reached this store.
    pub async fn update_calls(&self) -> u32 {
        self.inner.lock().await.update_calls
    }

    pub async fn count(&self, owner: &Owner) -> usize {
        let inner = self.inner.lock().await;
        inner
            .collections
            .get(&self.key_unchecked(owner))
            .map_or(0, Vec::len)
    }

    fn key_unchecked(&self, owner: &Owner) -> String {
        match self.source {
            NoteSource::Cache => owner.device_id.clone(),
            NoteSource::Durable => owner.user_id.clone().unwrap_or_default(),
        }
    }

    fn key(&self, owner: &Owner) -> Result<String> {
        match self.source {
            NoteSource::Cache => Ok(owner.device_id.clone()),
            NoteSource::Durable => Ok(owner.user_id()?.to_string()),
        }
    }

    fn check_faults(inner: &mut Inner) -> Result<()> {
        if inner.offline {
            return Err(QuillError::Unavailable("store offline".to_string()));
        }
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(QuillError::Storage("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl NoteStore for MemoryStore {
    fn source(&self) -> NoteSource {
        self.source
    }

    async fn get_all(&self, owner: &Owner) -> Result<Vec<Note>> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().await;
        Self::check_faults(&mut inner)?;
        let key = self.key(owner)?;
        Ok(inner.collections.get(&key).cloned().unwrap_or_default())
    }

    async fn create(&self, owner: &Owner, note: &Note) -> Result<()> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().await;
        Self::check_faults(&mut inner)?;
        let key = self.key(owner)?;
        let notes = inner.collections.entry(key).or_default();
        if notes.iter().any(|n| n.id == note.id) {
            return Err(QuillError::Conflict(note.id.to_string()));
        }
        notes.push(note.clone());
        Ok(())
    }

    async fn update_field(&self, owner: &Owner, id: Uuid, field: NoteField) -> Result<()> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().await;
        Self::check_faults(&mut inner)?;
        inner.update_calls += 1;
        let key = self.key(owner)?;
        let note = inner
            .collections
            .entry(key)
            .or_default()
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| QuillError::NotFound(id.to_string()))?;
        note.apply(&field);
        Ok(())
    }

    async fn delete(&self, owner: &Owner, id: Uuid) -> Result<()> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().await;
        Self::check_faults(&mut inner)?;
        if inner.fail_next_delete > 0 {
            inner.fail_next_delete -= 1;
            return Err(QuillError::Storage("injected delete failure".to_string()));
        }
        let key = self.key(owner)?;
        let notes = inner.collections.entry(key).or_default();
        let before = notes.len();
        notes.retain(|n| n.id != id);
        if notes.len() == before {
            return Err(QuillError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn batch_update_order(&self, owner: &Owner, updates: &[OrderUpdate]) -> Result<()> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().await;
        Self::check_faults(&mut inner)?;
        let key = self.key(owner)?;
        let notes = inner.collections.entry(key).or_default();
        for update in updates {
            if let Some(note) = notes.iter_mut().find(|n| n.id == update.note_id) {
                note.order = update.order;
                note.touch();
            }
        }
        Ok(())
    }
}
