//! Synchronization orchestrator.
//!
//! `SyncEngine` owns the merged in-memory note list and is the only writer to
//! it. Every mutation follows one template: locate the note, apply the change
//! locally (optimistic), dispatch to the store named by the note's `source`,
//! and on failure either queue the intent (store unreachable) or reconcile by
//! reloading the full list from both adapters. Observers watch display-sorted
//! snapshots through a `watch` channel; the engine has no rendering concerns.

mod scheduler;
mod transfer;

pub use scheduler::Scheduler;
pub use transfer::TransferOutcome;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::entity::{
    now_ms, GoalType, MutationKind, MutationPayload, Note, NoteField, NoteSource, Owner,
    QueuedMutation,
};
use crate::error::{QuillError, Result};
use crate::ordering;
use crate::queue::{MutationQueue, ReplayReport};
use crate::store::NoteStore;

const STARTER_TITLE: &str = "Welcome";
const STARTER_CONTENT: &str = "Start writing, or create a new note.";

/// Tuning knobs for the engine. Defaults match interactive use; tests shrink
/// the intervals and drive them with tokio's virtual clock.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Period of the background reconciling reload.
    pub refresh_interval: Duration,
    /// Reloads are skipped while the last confirmed mutation is this recent.
    pub activity_threshold: Duration,
    /// Quiet period that coalesces rapid privacy/collapse toggles.
    pub debounce_quiet: Duration,
    /// How long after `end_editing` a note keeps its reload suppression.
    pub edit_quiet: Duration,
    /// Hard bound on the initial load before partial data is shown.
    pub init_timeout: Duration,
    /// Period of the offline-queue sweep while online.
    pub sweep_interval: Duration,
    /// Lifetime of transient user notices.
    pub notice_ttl: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            activity_threshold: Duration::from_secs(10),
            debounce_quiet: Duration::from_millis(500),
            edit_quiet: Duration::from_secs(2),
            init_timeout: Duration::from_secs(8),
            sweep_interval: Duration::from_secs(60),
            notice_ttl: Duration::from_secs(5),
        }
    }
}

/// What observers see: the display-sorted list plus engine status.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub notes: Vec<Note>,
    pub loading: bool,
    pub queued: usize,
    pub notice: Option<String>,
    pub last_synced_at: Option<i64>,
}

/// Swap direction for `reorder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl FromStr for Direction {
    type Err = QuillError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(QuillError::Validation(format!(
                "unknown direction '{}' (expected 'up' or 'down')",
                other
            ))),
        }
    }
}

#[derive(Default)]
struct EngineState {
    /// Merged list, kept in display order.
    notes: Vec<Note>,
    /// Notes the user is actively typing in, with a generation counter so a
    /// stale quiet-period task cannot clear a newer editing session.
    editing: HashMap<Uuid, u64>,
    /// Generation per (note, kind) for pending debounced dispatches.
    debounce: HashMap<(Uuid, MutationKind), u64>,
    last_mutation_at: Option<Instant>,
    loading: bool,
    last_synced_at: Option<i64>,
    notice: Option<String>,
    notice_gen: u64,
}

#[derive(Clone)]
pub struct SyncEngine {
    owner: Owner,
    cache: Arc<dyn NoteStore>,
    durable: Arc<dyn NoteStore>,
    queue: Arc<MutationQueue>,
    config: SyncConfig,
    state: Arc<Mutex<EngineState>>,
    snapshot: Arc<watch::Sender<Snapshot>>,
    shutdown: Arc<watch::Sender<bool>>,
    refresh_timer: Arc<Scheduler>,
    sweep_timer: Arc<Scheduler>,
}

impl SyncEngine {
    pub fn new(
        owner: Owner,
        cache: Arc<dyn NoteStore>,
        durable: Arc<dyn NoteStore>,
        queue: Arc<MutationQueue>,
        config: SyncConfig,
    ) -> Self {
        let (snapshot, _) = watch::channel(Snapshot {
            loading: true,
            ..Default::default()
        });
        let (shutdown, _) = watch::channel(false);

        Self {
            refresh_timer: Arc::new(Scheduler::new(config.refresh_interval)),
            sweep_timer: Arc::new(Scheduler::new(config.sweep_interval)),
            owner,
            cache,
            durable,
            queue,
            config,
            state: Arc::new(Mutex::new(EngineState {
                loading: true,
                ..Default::default()
            })),
            snapshot: Arc::new(snapshot),
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn queue(&self) -> &Arc<MutationQueue> {
        &self.queue
    }

    /// Observe display-sorted snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    /// Current merged list in display order.
    pub async fn notes(&self) -> Vec<Note> {
        self.state.lock().await.notes.clone()
    }

    pub(crate) fn store_for(&self, source: NoteSource) -> &Arc<dyn NoteStore> {
        match source {
            NoteSource::Cache => &self.cache,
            NoteSource::Durable => &self.durable,
        }
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn publish(&self) {
        let queued = self.queue.len().await.unwrap_or(0);
        let state = self.state.lock().await;
        let _ = self.snapshot.send(Snapshot {
            notes: state.notes.clone(),
            loading: state.loading,
            queued,
            notice: state.notice.clone(),
            last_synced_at: state.last_synced_at,
        });
    }

    async fn mark_activity(&self) {
        self.state.lock().await.last_mutation_at = Some(Instant::now());
    }

    async fn recently_active(&self) -> bool {
        let state = self.state.lock().await;
        state
            .last_mutation_at
            .is_some_and(|at| at.elapsed() < self.config.activity_threshold)
    }

    /// Initial load, bounded by the init timeout: if the stores have not
    /// answered in time, loading completes with whatever arrived.
    pub async fn load(&self) -> Result<()> {
        {
            self.state.lock().await.loading = true;
        }
        self.publish().await;

        match tokio::time::timeout(self.config.init_timeout, self.reload()).await {
            Ok(result) => result,
            Err(_) => {
                warn!("initial load timed out, showing partial data");
                self.state.lock().await.loading = false;
                self.publish().await;
                Ok(())
            }
        }
    }

    /// Reconciling reload: re-derive truth from both adapters, re-assign
    /// stable order values, and publish. Notes flagged as being edited keep
    /// their local copy so a reload cannot clobber in-flight typing.
    pub async fn reload(&self) -> Result<()> {
        let durable_side = async {
            if self.owner.is_signed_in() {
                self.durable.get_all(&self.owner).await
            } else {
                Ok(Vec::new())
            }
        };
        let (cache_result, durable_result) = tokio::join!(self.cache.get_all(&self.owner), durable_side);

        let mut merged = Vec::new();
        let mut failed_sides = 0;
        match cache_result {
            Ok(mut notes) => merged.append(&mut notes),
            Err(err) => {
                warn!(%err, "cache load failed");
                failed_sides += 1;
            }
        }
        match durable_result {
            Ok(mut notes) => merged.append(&mut notes),
            Err(err) => {
                warn!(%err, "durable load failed");
                failed_sides += 1;
            }
        }
        if failed_sides == 2 {
            self.state.lock().await.loading = false;
            self.publish().await;
            return Err(QuillError::Storage("both stores failed to load".to_string()));
        }

        // A user always has at least one note.
        if merged.is_empty() {
            let starter = Note::new(STARTER_TITLE, STARTER_CONTENT, self.owner.default_source());
            if let Err(err) = self
                .store_for(starter.source)
                .create(&self.owner, &starter)
                .await
            {
                warn!(%err, "could not persist starter note");
            }
            merged.push(starter);
        }

        // Assign stable order values and write back whatever changed.
        let normalized = ordering::normalized(&merged);
        for (source, updates) in ordering::order_changes(&merged, &normalized) {
            if let Err(err) = self
                .store_for(source)
                .batch_update_order(&self.owner, &updates)
                .await
            {
                warn!(%err, store = %source, "order normalization write failed");
            }
        }

        let mut notes = normalized;
        {
            let mut state = self.state.lock().await;
            for id in state.editing.keys().copied().collect::<Vec<_>>() {
                let Some(local) = state.notes.iter().find(|n| n.id == id).cloned() else {
                    continue;
                };
                match notes.iter_mut().find(|n| n.id == id) {
                    Some(fresh) => *fresh = local,
                    None => notes.push(local),
                }
            }
            ordering::sort_for_display(&mut notes);
            state.notes = notes;
            state.loading = false;
            state.last_synced_at = Some(now_ms());
        }
        self.publish().await;

        debug!("reload complete");
        Ok(())
    }

    /// Background refresh tick: skipped while the user is mid-burst so the
    /// reload cannot clobber rapid edits.
    pub async fn refresh_if_idle(&self) {
        if self.recently_active().await {
            debug!("skipping background refresh, recent activity");
            return;
        }
        if let Err(err) = self.reload().await {
            warn!(%err, "background refresh failed");
        }
    }

    // -- mutation template ---------------------------------------------------

    async fn apply_local(&self, id: Uuid, field: &NoteField) -> Result<NoteSource> {
        let mut state = self.state.lock().await;
        let note = state
            .notes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| QuillError::NotFound(id.to_string()))?;
        note.apply(field);
        let source = note.source;
        if matches!(field, NoteField::Pinned(_) | NoteField::Order(_)) {
            ordering::sort_for_display(&mut state.notes);
        }
        Ok(source)
    }

    async fn dispatch_update(&self, source: NoteSource, id: Uuid, field: NoteField) -> Result<()> {
        match self
            .store_for(source)
            .update_field(&self.owner, id, field.clone())
            .await
        {
            Ok(()) => {
                self.mark_activity().await;
                Ok(())
            }
            Err(err) if err.is_offline() => {
                self.queue
                    .enqueue(&QueuedMutation::new(
                        field.kind(),
                        id,
                        MutationPayload::Update { source, field },
                    ))
                    .await?;
                self.mark_activity().await;
                self.publish().await;
                Ok(())
            }
            Err(err) => {
                error!(%err, note = %id, "store write failed, reconciling");
                let _ = self.reload().await;
                Err(err)
            }
        }
    }

    async fn mutate(&self, id: Uuid, field: NoteField) -> Result<()> {
        let source = self.apply_local(id, &field).await?;
        self.publish().await;
        self.dispatch_update(source, id, field).await
    }

    /// Debounced variant: local state updates per call, the store write fires
    /// once after a quiet period with whatever value is current by then.
    async fn mutate_debounced(&self, id: Uuid, field: NoteField) -> Result<()> {
        let kind = field.kind();
        let generation = {
            let mut state = self.state.lock().await;
            let note = state
                .notes
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or_else(|| QuillError::NotFound(id.to_string()))?;
            note.apply(&field);
            let generation = state.debounce.entry((id, kind)).or_insert(0);
            *generation += 1;
            *generation
        };
        self.publish().await;

        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(engine.config.debounce_quiet).await;
            if engine.is_shutdown() {
                return;
            }
            let pending = {
                let mut state = engine.state.lock().await;
                if state.debounce.get(&(id, kind)) != Some(&generation) {
                    return;
                }
                state.debounce.remove(&(id, kind));
                state
                    .notes
                    .iter()
                    .find(|n| n.id == id)
                    .and_then(|note| Some((note.source, current_field(note, kind)?)))
            };
            let Some((source, field)) = pending else {
                return;
            };
            if let Err(err) = engine.dispatch_update(source, id, field).await {
                warn!(%err, note = %id, "debounced write failed");
            }
        });
        Ok(())
    }

    /// Dispatch every pending debounced write now instead of waiting out the
    /// quiet period. The timed tasks find their generation gone and back off.
    pub async fn flush_pending(&self) {
        let pending: Vec<(Uuid, MutationKind)> = {
            let mut state = self.state.lock().await;
            let keys = state.debounce.keys().copied().collect();
            state.debounce.clear();
            keys
        };
        for (id, kind) in pending {
            let current = {
                let state = self.state.lock().await;
                state
                    .notes
                    .iter()
                    .find(|n| n.id == id)
                    .and_then(|note| Some((note.source, current_field(note, kind)?)))
            };
            if let Some((source, field)) = current {
                if let Err(err) = self.dispatch_update(source, id, field).await {
                    warn!(%err, note = %id, "flush failed");
                }
            }
        }
    }

    // -- operations ----------------------------------------------------------

    /// Create a note in the owner's default store: durable when signed in,
    /// cache otherwise.
    pub async fn create_note(&self, title: &str, content: &str) -> Result<Note> {
        let title = title.trim();
        if title.is_empty() {
            return Err(QuillError::Validation("title cannot be empty".to_string()));
        }

        let note = Note::new(title, content, self.owner.default_source());
        {
            let mut state = self.state.lock().await;
            state.notes.insert(0, note.clone());
            ordering::sort_for_display(&mut state.notes);
        }
        self.publish().await;

        match self.store_for(note.source).create(&self.owner, &note).await {
            Ok(()) => {
                self.mark_activity().await;
                Ok(note)
            }
            Err(err) if err.is_offline() => {
                self.queue
                    .enqueue(&QueuedMutation::new(
                        MutationKind::Create,
                        note.id,
                        MutationPayload::Create { note: note.clone() },
                    ))
                    .await?;
                self.mark_activity().await;
                self.publish().await;
                Ok(note)
            }
            Err(err) => {
                error!(%err, "create failed");
                {
                    let mut state = self.state.lock().await;
                    state.notes.retain(|n| n.id != note.id);
                }
                self.set_notice("Could not save the new note").await;
                Err(err)
            }
        }
    }

    pub async fn update_title(&self, id: Uuid, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(QuillError::Validation("title cannot be empty".to_string()));
        }
        self.mutate(id, NoteField::Title(title.to_string())).await
    }

    pub async fn update_content(&self, id: Uuid, content: &str) -> Result<()> {
        self.mutate(id, NoteField::Content(content.to_string()))
            .await
    }

    pub async fn update_pin(&self, id: Uuid, pinned: bool) -> Result<()> {
        self.mutate(id, NoteField::Pinned(pinned)).await
    }

    pub async fn update_privacy(&self, id: Uuid, is_private: bool) -> Result<()> {
        self.mutate_debounced(id, NoteField::Private(is_private))
            .await
    }

    pub async fn update_collapsed(&self, id: Uuid, is_collapsed: bool) -> Result<()> {
        self.mutate_debounced(id, NoteField::Collapsed(is_collapsed))
            .await
    }

    pub async fn update_goal(&self, id: Uuid, goal: Option<u32>, goal_type: GoalType) -> Result<()> {
        self.mutate(id, NoteField::Goal(goal)).await?;
        self.mutate(id, NoteField::GoalType(goal_type)).await
    }

    /// Swap a note with its display-order neighbor inside the same pin group.
    /// No neighbor means no-op. The two order writes go out concurrently,
    /// each against the store owning its note.
    pub async fn reorder(&self, id: Uuid, direction: Direction) -> Result<()> {
        let swap = {
            let mut state = self.state.lock().await;
            let Some(position) = state.notes.iter().position(|n| n.id == id) else {
                return Err(QuillError::NotFound(id.to_string()));
            };
            let pinned = state.notes[position].pinned;

            let group: Vec<usize> = state
                .notes
                .iter()
                .enumerate()
                .filter(|(_, n)| n.pinned == pinned)
                .map(|(i, _)| i)
                .collect();
            let in_group = group.iter().position(|&i| i == position).unwrap();

            let neighbor = match direction {
                Direction::Up => in_group.checked_sub(1).map(|i| group[i]),
                Direction::Down => group.get(in_group + 1).copied(),
            };
            let Some(other) = neighbor else {
                return Ok(());
            };

            let this_order = state.notes[position].order;
            let other_order = state.notes[other].order;
            state.notes[position].order = other_order;
            state.notes[other].order = this_order;
            state.notes[position].touch();
            state.notes[other].touch();

            let a = (
                state.notes[position].source,
                state.notes[position].id,
                state.notes[position].order,
            );
            let b = (
                state.notes[other].source,
                state.notes[other].id,
                state.notes[other].order,
            );
            ordering::sort_for_display(&mut state.notes);
            (a, b)
        };
        self.publish().await;

        let ((a_source, a_id, a_order), (b_source, b_id, b_order)) = swap;
        let (first, second) = tokio::join!(
            self.dispatch_update(a_source, a_id, NoteField::Order(a_order)),
            self.dispatch_update(b_source, b_id, NoteField::Order(b_order)),
        );
        first.and(second)
    }

    /// Remove a note, optimistically. Deleting the sole remaining note is
    /// rejected so the list never reaches zero.
    pub async fn delete_note(&self, id: Uuid) -> Result<()> {
        let source = {
            let mut state = self.state.lock().await;
            if state.notes.len() <= 1 {
                return Err(QuillError::Validation(
                    "the last note cannot be deleted".to_string(),
                ));
            }
            let position = state
                .notes
                .iter()
                .position(|n| n.id == id)
                .ok_or_else(|| QuillError::NotFound(id.to_string()))?;
            state.notes.remove(position).source
        };
        self.publish().await;

        match self.store_for(source).delete(&self.owner, id).await {
            Ok(()) => {
                self.mark_activity().await;
                Ok(())
            }
            Err(err) if err.is_offline() => {
                self.queue
                    .enqueue(&QueuedMutation::new(
                        MutationKind::Delete,
                        id,
                        MutationPayload::Delete { source },
                    ))
                    .await?;
                self.mark_activity().await;
                self.publish().await;
                Ok(())
            }
            Err(err) => {
                error!(%err, note = %id, "delete failed, reconciling");
                let _ = self.reload().await;
                Err(err)
            }
        }
    }

    // -- editing flags -------------------------------------------------------

    /// Flag a note as being typed in: background reload will keep the local
    /// copy instead of overwriting it.
    pub async fn begin_editing(&self, id: Uuid) {
        let mut state = self.state.lock().await;
        *state.editing.entry(id).or_insert(0) += 1;
    }

    /// Clear the editing flag after a quiet period, unless typing resumed.
    pub async fn end_editing(&self, id: Uuid) {
        let generation = {
            let mut state = self.state.lock().await;
            match state.editing.get_mut(&id) {
                Some(generation) => {
                    *generation += 1;
                    *generation
                }
                None => return,
            }
        };

        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(engine.config.edit_quiet).await;
            let mut state = engine.state.lock().await;
            if state.editing.get(&id) == Some(&generation) {
                state.editing.remove(&id);
            }
        });
    }

    pub async fn is_editing(&self, id: Uuid) -> bool {
        self.state.lock().await.editing.contains_key(&id)
    }

    // -- notices -------------------------------------------------------------

    /// Transient, auto-clearing user notification.
    pub async fn set_notice(&self, message: &str) {
        let generation = {
            let mut state = self.state.lock().await;
            state.notice = Some(message.to_string());
            state.notice_gen += 1;
            state.notice_gen
        };
        self.publish().await;

        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(engine.config.notice_ttl).await;
            let cleared = {
                let mut state = engine.state.lock().await;
                if state.notice_gen == generation {
                    state.notice = None;
                    true
                } else {
                    false
                }
            };
            if cleared {
                engine.publish().await;
            }
        });
    }

    // -- offline queue -------------------------------------------------------

    /// Replay queued mutations, then reconcile if anything landed.
    pub async fn sync_queue(&self) -> Result<ReplayReport> {
        let report = self
            .queue
            .replay(&self.owner, self.cache.as_ref(), self.durable.as_ref())
            .await?;
        if report.replayed > 0 {
            let _ = self.reload().await;
        } else {
            self.publish().await;
        }
        Ok(report)
    }

    /// Network-online transition: drain the queue.
    pub async fn notify_online(&self) -> Result<ReplayReport> {
        info!("connectivity restored, replaying queued mutations");
        self.sync_queue().await
    }

    // -- lifecycle -----------------------------------------------------------

    /// Spawn the background refresh and queue sweep loops.
    pub fn start(&self) {
        let engine = self.clone();
        self.refresh_timer.start(move || {
            let engine = engine.clone();
            async move {
                engine.refresh_if_idle().await;
            }
        });

        let engine = self.clone();
        self.sweep_timer.start(move || {
            let engine = engine.clone();
            async move {
                if let Ok(false) = engine.queue.is_empty().await {
                    let _ = engine.sync_queue().await;
                }
            }
        });
    }

    /// Stop background work. In-flight results are dropped, not applied.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        self.refresh_timer.cancel().await;
        self.sweep_timer.cancel().await;
    }
}

/// Latest store-bound value for a debounced kind, read off the note itself.
fn current_field(note: &Note, kind: MutationKind) -> Option<NoteField> {
    match kind {
        MutationKind::Privacy => Some(NoteField::Private(note.is_private)),
        MutationKind::Collapsed => Some(NoteField::Collapsed(note.is_collapsed)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn anon_engine() -> (SyncEngine, Arc<MemoryStore>, Arc<MemoryStore>) {
        engine_for(Owner::anonymous("device-1"))
    }

    fn engine_for(owner: Owner) -> (SyncEngine, Arc<MemoryStore>, Arc<MemoryStore>) {
        let cache = Arc::new(MemoryStore::new(NoteSource::Cache));
        let durable = Arc::new(MemoryStore::new(NoteSource::Durable));
        let queue = Arc::new(MutationQueue::in_memory().unwrap());
        let engine = SyncEngine::new(
            owner,
            cache.clone(),
            durable.clone(),
            queue,
            SyncConfig::default(),
        );
        (engine, cache, durable)
    }

    fn owner() -> Owner {
        Owner::anonymous("device-1")
    }

    #[tokio::test]
    async fn test_load_seeds_starter_note_when_empty() {
        let (engine, cache, _) = anon_engine();
        engine.load().await.unwrap();

        let notes = engine.notes().await;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, STARTER_TITLE);
        assert_eq!(cache.count(&owner()).await, 1);
    }

    #[tokio::test]
    async fn test_load_merges_both_stores_and_normalizes() {
        let signed = Owner::signed_in("device-1", "user-1");
        let (engine, cache, durable) = engine_for(signed.clone());

        cache
            .insert(&signed, Note::new("From cache", "", NoteSource::Cache))
            .await;
        durable
            .insert(&signed, Note::new("From durable", "", NoteSource::Durable))
            .await;

        engine.load().await.unwrap();

        let notes = engine.notes().await;
        assert_eq!(notes.len(), 2);
        let mut orders: Vec<i64> = notes.iter().map(|n| n.order).collect();
        orders.sort_unstable();
        assert_eq!(orders, vec![1, 2]);

        // Normalized orders were written back to the owning stores.
        let cached = cache.get_all(&signed).await.unwrap();
        assert!(cached[0].order > 0);
    }

    #[tokio::test]
    async fn test_anonymous_load_skips_durable_store() {
        let (engine, _, durable) = anon_engine();
        durable.set_offline(true).await;

        // The durable side is never consulted without a signed-in user.
        engine.load().await.unwrap();
        assert_eq!(engine.notes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_note_persists_to_default_store() {
        let (engine, cache, _) = anon_engine();
        engine.load().await.unwrap();

        let note = engine.create_note("Groceries", "- milk").await.unwrap();
        assert_eq!(note.source, NoteSource::Cache);

        let stored = cache.get_all(&owner()).await.unwrap();
        assert!(stored.iter().any(|n| n.id == note.id));
    }

    #[tokio::test]
    async fn test_create_note_rejects_empty_title() {
        let (engine, _, _) = anon_engine();
        engine.load().await.unwrap();

        let result = engine.create_note("   ", "").await;
        assert!(matches!(result, Err(QuillError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_title_applies_and_persists() {
        let (engine, cache, _) = anon_engine();
        engine.load().await.unwrap();
        let note = engine.create_note("Draft", "").await.unwrap();

        engine.update_title(note.id, "Final").await.unwrap();

        assert_eq!(
            engine
                .notes()
                .await
                .iter()
                .find(|n| n.id == note.id)
                .unwrap()
                .title,
            "Final"
        );
        let stored = cache.get_all(&owner()).await.unwrap();
        assert_eq!(
            stored.iter().find(|n| n.id == note.id).unwrap().title,
            "Final"
        );
    }

    #[tokio::test]
    async fn test_failed_update_reconciles_from_store() {
        let (engine, cache, _) = anon_engine();
        engine.load().await.unwrap();
        let note = engine.create_note("Stable", "").await.unwrap();

        cache.fail_next(1).await;
        let result = engine.update_title(note.id, "Doomed").await;
        assert!(result.is_err());

        // The reconciling reload restored store truth.
        let titles: Vec<String> = engine.notes().await.iter().map(|n| n.title.clone()).collect();
        assert!(titles.contains(&"Stable".to_string()));
        assert!(!titles.contains(&"Doomed".to_string()));
    }

    #[tokio::test]
    async fn test_delete_last_note_rejected() {
        let (engine, _, _) = anon_engine();
        engine.load().await.unwrap();

        let notes = engine.notes().await;
        let result = engine.delete_note(notes[0].id).await;
        assert!(matches!(result, Err(QuillError::Validation(_))));
        assert_eq!(engine.notes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_from_state_and_store() {
        let (engine, cache, _) = anon_engine();
        engine.load().await.unwrap();
        let note = engine.create_note("Disposable", "").await.unwrap();

        engine.delete_note(note.id).await.unwrap();

        assert!(!engine.notes().await.iter().any(|n| n.id == note.id));
        assert!(!cache
            .get_all(&owner())
            .await
            .unwrap()
            .iter()
            .any(|n| n.id == note.id));
    }

    #[tokio::test]
    async fn test_reorder_swaps_neighbors() {
        let (engine, _, _) = anon_engine();
        engine.load().await.unwrap();
        engine.create_note("Second", "").await.unwrap();
        engine.reload().await.unwrap();

        let before = engine.notes().await;
        assert_eq!(before.len(), 2);
        let bottom = before[1].clone();

        engine.reorder(bottom.id, Direction::Up).await.unwrap();

        let after = engine.notes().await;
        assert_eq!(after[0].id, bottom.id);
    }

    #[tokio::test]
    async fn test_reorder_without_neighbor_is_noop() {
        let (engine, _, _) = anon_engine();
        engine.load().await.unwrap();
        engine.create_note("Pinned one", "").await.unwrap();
        engine.reload().await.unwrap();

        // Pin one note: it becomes the only member of its group.
        let pinned = engine.notes().await[0].clone();
        engine.update_pin(pinned.id, true).await.unwrap();

        let before = engine.notes().await;
        engine.reorder(pinned.id, Direction::Up).await.unwrap();
        engine.reorder(pinned.id, Direction::Down).await.unwrap();
        let after = engine.notes().await;

        let before_ids: Vec<Uuid> = before.iter().map(|n| n.id).collect();
        let after_ids: Vec<Uuid> = after.iter().map(|n| n.id).collect();
        assert_eq!(before_ids, after_ids);
    }

    #[tokio::test]
    async fn test_offline_update_is_queued_and_replayed() {
        let (engine, cache, _) = anon_engine();
        engine.load().await.unwrap();
        let note = engine.create_note("Offline draft", "").await.unwrap();

        cache.set_offline(true).await;
        engine.update_title(note.id, "Renamed offline").await.unwrap();

        // Local state moved ahead of the unreachable store.
        assert_eq!(
            engine
                .notes()
                .await
                .iter()
                .find(|n| n.id == note.id)
                .unwrap()
                .title,
            "Renamed offline"
        );

        cache.set_offline(false).await;
        let report = engine.notify_online().await.unwrap();
        assert_eq!(report.remaining, 0);

        let stored = cache.get_all(&owner()).await.unwrap();
        assert_eq!(
            stored.iter().find(|n| n.id == note.id).unwrap().title,
            "Renamed offline"
        );
    }

    #[tokio::test]
    async fn test_offline_create_is_queued() {
        let (engine, cache, _) = anon_engine();
        engine.load().await.unwrap();

        cache.set_offline(true).await;
        let note = engine.create_note("Queued note", "").await.unwrap();
        assert!(engine.notes().await.iter().any(|n| n.id == note.id));

        cache.set_offline(false).await;
        engine.notify_online().await.unwrap();

        assert!(cache
            .get_all(&owner())
            .await
            .unwrap()
            .iter()
            .any(|n| n.id == note.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_toggles_coalesce_into_one_write() {
        let (engine, cache, _) = anon_engine();
        engine.load().await.unwrap();
        let note = engine.create_note("Toggles", "").await.unwrap();

        let baseline = cache.update_calls().await;
        engine.update_collapsed(note.id, true).await.unwrap();
        engine.update_collapsed(note.id, false).await.unwrap();
        engine.update_collapsed(note.id, true).await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(cache.update_calls().await, baseline + 1);
        let stored = cache.get_all(&owner()).await.unwrap();
        assert!(stored.iter().find(|n| n.id == note.id).unwrap().is_collapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_editing_flag_suppresses_reload_overwrite() {
        let (engine, cache, _) = anon_engine();
        engine.load().await.unwrap();
        let note = engine.create_note("Mine", "local text").await.unwrap();

        engine.begin_editing(note.id).await;

        // Another writer changes the store behind our back.
        cache
            .update_field(
                &owner(),
                note.id,
                NoteField::Content("remote text".to_string()),
            )
            .await
            .unwrap();

        engine.reload().await.unwrap();
        assert_eq!(
            engine
                .notes()
                .await
                .iter()
                .find(|n| n.id == note.id)
                .unwrap()
                .content,
            "local text"
        );

        // After the quiet period the flag clears and reload takes store truth.
        engine.end_editing(note.id).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!engine.is_editing(note.id).await);

        engine.reload().await.unwrap();
        assert_eq!(
            engine
                .notes()
                .await
                .iter()
                .find(|n| n.id == note.id)
                .unwrap()
                .content,
            "remote text"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_skipped_while_recently_active() {
        let (engine, cache, _) = anon_engine();
        engine.load().await.unwrap();
        let note = engine.create_note("Busy", "").await.unwrap();
        engine.update_title(note.id, "Busy still").await.unwrap();

        // External change that a reload would surface.
        cache
            .update_field(&owner(), note.id, NoteField::Title("External".to_string()))
            .await
            .unwrap();

        engine.refresh_if_idle().await;
        assert_eq!(
            engine
                .notes()
                .await
                .iter()
                .find(|n| n.id == note.id)
                .unwrap()
                .title,
            "Busy still"
        );

        // Once the activity window passes, the refresh goes through.
        tokio::time::sleep(Duration::from_secs(30)).await;
        engine.refresh_if_idle().await;
        assert_eq!(
            engine
                .notes()
                .await
                .iter()
                .find(|n| n.id == note.id)
                .unwrap()
                .title,
            "External"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_timeout_forces_loading_complete() {
        let cache = Arc::new(MemoryStore::new(NoteSource::Cache));
        let durable = Arc::new(MemoryStore::new(NoteSource::Durable));
        let queue = Arc::new(MutationQueue::in_memory().unwrap());
        let config = SyncConfig {
            init_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let engine = SyncEngine::new(
            Owner::anonymous("device-1"),
            cache.clone(),
            durable,
            queue,
            config,
        );

        // A store that answers long after the bound: loading must still
        // complete at the timeout with whatever partial data exists.
        cache.set_delay(Duration::from_secs(60)).await;
        let mut rx = engine.subscribe();
        engine.load().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn test_load_completes_when_one_store_unreachable() {
        let (engine, cache, _) = anon_engine();
        cache.set_offline(true).await;

        engine.load().await.unwrap();
        let notes = engine.notes().await;
        // The starter note exists in memory even though the cache rejected it.
        assert_eq!(notes.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refresh_picks_up_external_changes() {
        let (engine, cache, _) = anon_engine();
        engine.load().await.unwrap();
        let note = engine.notes().await[0].clone();

        engine.start();

        cache
            .update_field(
                &owner(),
                note.id,
                NoteField::Title("Changed elsewhere".to_string()),
            )
            .await
            .unwrap();

        // One refresh period later the reload has run.
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(
            engine
                .notes()
                .await
                .iter()
                .find(|n| n.id == note.id)
                .unwrap()
                .title,
            "Changed elsewhere"
        );

        engine.stop().await;

        // No further ticks after stop.
        cache
            .update_field(&owner(), note.id, NoteField::Title("Again".to_string()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_ne!(
            engine
                .notes()
                .await
                .iter()
                .find(|n| n.id == note.id)
                .unwrap()
                .title,
            "Again"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_loop_drains_queue_when_connectivity_returns() {
        let (engine, cache, _) = anon_engine();
        engine.load().await.unwrap();
        let note = engine.create_note("Draft", "").await.unwrap();

        cache.set_offline(true).await;
        engine.update_title(note.id, "Renamed").await.unwrap();
        assert_eq!(engine.queue().len().await.unwrap(), 1);

        cache.set_offline(false).await;
        engine.start();

        // The periodic sweep replays the queue without an explicit reconnect
        // signal. Recent activity delays the refresh loop, not the sweep.
        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(engine.queue().len().await.unwrap(), 0);
        assert_eq!(
            cache
                .get_all(&owner())
                .await
                .unwrap()
                .iter()
                .find(|n| n.id == note.id)
                .unwrap()
                .title,
            "Renamed"
        );

        engine.stop().await;
    }
}
