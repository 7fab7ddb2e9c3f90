//! Bounded-retry decorator over any store.
//!
//! Individual store calls are cheap and user-facing latency matters, so the
//! policy is a fixed inter-attempt delay and a fixed attempt count rather
//! than exponential backoff. Only transient failures are retried; Validation,
//! NotFound, Auth and Unavailable pass straight through (the offline queue
//! owns Unavailable).

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::warn;
use uuid::Uuid;

use super::NoteStore;
use crate::entity::{Note, NoteField, NoteSource, OrderUpdate, Owner};
use crate::error::Result;

pub const RETRY_ATTEMPTS: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_millis(300);

pub struct RetryStore<S> {
    inner: S,
    attempts: u32,
    delay: Duration,
}

impl<S> RetryStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_policy(inner, RETRY_ATTEMPTS, RETRY_DELAY)
    }

    pub fn with_policy(inner: S, attempts: u32, delay: Duration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            delay,
        }
    }

    async fn run<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    warn!(%err, attempt, what, "store call failed, retrying");
                    sleep(self.delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl<S: NoteStore> NoteStore for RetryStore<S> {
    fn source(&self) -> NoteSource {
        self.inner.source()
    }

    async fn get_all(&self, owner: &Owner) -> Result<Vec<Note>> {
        self.run("get_all", || self.inner.get_all(owner)).await
    }

    async fn create(&self, owner: &Owner, note: &Note) -> Result<()> {
        self.run("create", || self.inner.create(owner, note)).await
    }

    async fn update_field(&self, owner: &Owner, id: Uuid, field: NoteField) -> Result<()> {
        self.run("update_field", || {
            self.inner.update_field(owner, id, field.clone())
        })
        .await
    }

    async fn delete(&self, owner: &Owner, id: Uuid) -> Result<()> {
        self.run("delete", || self.inner.delete(owner, id)).await
    }

    async fn batch_update_order(&self, owner: &Owner, updates: &[OrderUpdate]) -> Result<()> {
        self.run("batch_update_order", || {
            self.inner.batch_update_order(owner, updates)
        })
        .await
    }
}
