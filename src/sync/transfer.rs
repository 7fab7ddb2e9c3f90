//! Cross-store transfer coordinator.
//!
//! Moving a note between stores is two-phase: create the copy in the target
//! store first, delete the original only after the create succeeded. A failed
//! delete leaves both copies in place and surfaces the inconsistency for the
//! next reconciling reload.

use tracing::{info, warn};
use uuid::Uuid;

use super::SyncEngine;
use crate::entity::{now_ms, Note, NoteSource};
use crate::error::{QuillError, Result};

/// How a transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Copy created and original deleted.
    Complete,
    /// Copy created but the original could not be deleted; both copies exist
    /// until a later reconciliation pass.
    SourceDeleteFailed,
}

impl SyncEngine {
    /// Move a note to the other store, preserving `title` and `content`
    /// exactly. Transfers into the durable store require a signed-in user.
    pub async fn transfer(&self, id: Uuid, target: NoteSource) -> Result<TransferOutcome> {
        let source = {
            let state = self.state.lock().await;
            state
                .notes
                .iter()
                .find(|n| n.id == id)
                .map(|n| n.source)
                .ok_or_else(|| QuillError::NotFound(id.to_string()))?
        };
        if source == target {
            return Ok(TransferOutcome::Complete);
        }
        if target == NoteSource::Durable {
            self.owner.user_id()?;
        }

        // Never trust stale in-memory state for the payload being moved:
        // re-fetch the authoritative copy from the current store.
        let original = self
            .store_for(source)
            .get_all(&self.owner)
            .await?
            .into_iter()
            .find(|n| n.id == id)
            .ok_or_else(|| QuillError::NotFound(id.to_string()))?;

        let mut copy = Note {
            id: Uuid::new_v4(),
            source: target,
            updated_at: now_ms().max(original.updated_at),
            ..original.clone()
        };

        // The copy must carry the payload byte for byte; re-copy any field a
        // construction step altered.
        if copy.title != original.title {
            copy.title = original.title.clone();
        }
        if copy.content != original.content {
            copy.content = original.content.clone();
        }

        self.store_for(target).create(&self.owner, &copy).await?;

        let outcome = match self.store_for(source).delete(&self.owner, id).await {
            Ok(()) => {
                info!(note = %id, from = %source, to = %target, "transfer complete");
                TransferOutcome::Complete
            }
            Err(err) => {
                warn!(%err, note = %id, "transfer delete failed, duplicate left in place");
                self.set_notice("Note was copied but the original could not be removed")
                    .await;
                TransferOutcome::SourceDeleteFailed
            }
        };

        let _ = self.reload().await;
        Ok(outcome)
    }
}
