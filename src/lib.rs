pub mod cli;
pub mod entity;
pub mod error;
pub mod ordering;
pub mod queue;
pub mod store;
pub mod sync;

pub use entity::{Note, NoteSource, Owner};
pub use error::{QuillError, Result};
pub use store::{CacheStore, DurableStore, NoteStore};
pub use sync::{SyncConfig, SyncEngine};
