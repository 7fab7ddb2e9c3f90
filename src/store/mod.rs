//! Store adapters. Both backing stores implement the same contract so the
//! sync engine stays store-agnostic; a note's `source` field decides which
//! adapter owns its persisted copy.

mod cache;
mod durable;
mod memory;
mod retry;

pub use cache::{CacheStore, CACHE_TTL_MS};
pub use durable::DurableStore;
pub use memory::MemoryStore;
pub use retry::RetryStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::entity::{Note, NoteField, NoteSource, OrderUpdate, Owner};
use crate::error::Result;

/// Uniform CRUD contract over a backing note store.
///
/// Errors follow the engine taxonomy: `Validation` is rejected synchronously,
/// `NotFound` means the note is absent in this store, `Storage` is transient
/// I/O, `Unavailable` means the store could not be reached at all, and `Auth`
/// means the operation needs a signed-in identity.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Which side of the partition this store is.
    fn source(&self) -> NoteSource;

    /// Every note the owner has in this store.
    async fn get_all(&self, owner: &Owner) -> Result<Vec<Note>>;

    /// Persist a new note. Fails with `Conflict` when the id already exists.
    async fn create(&self, owner: &Owner, note: &Note) -> Result<()>;

    /// Apply a single field change to an existing note.
    async fn update_field(&self, owner: &Owner, id: Uuid, field: NoteField) -> Result<()>;

    /// Remove a note.
    async fn delete(&self, owner: &Owner, id: Uuid) -> Result<()>;

    /// Persist a batch of `order` assignments in one pass.
    async fn batch_update_order(&self, owner: &Owner, updates: &[OrderUpdate]) -> Result<()>;
}
