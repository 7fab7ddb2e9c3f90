use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{now_ms, Note, NoteSource};
use crate::error::QuillError;

/// Operation kind. Together with the note id it forms the dedup key for the
/// offline queue: only the latest intent per (note, kind) survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Title,
    Content,
    Pin,
    Privacy,
    Collapsed,
    Order,
    Goal,
    Delete,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Title => "title",
            MutationKind::Content => "content",
            MutationKind::Pin => "pin",
            MutationKind::Privacy => "privacy",
            MutationKind::Collapsed => "collapsed",
            MutationKind::Order => "order",
            MutationKind::Goal => "goal",
            MutationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = QuillError;

    fn from_str(s: &str) -> Result<Self, QuillError> {
        match s {
            "create" => Ok(MutationKind::Create),
            "title" => Ok(MutationKind::Title),
            "content" => Ok(MutationKind::Content),
            "pin" => Ok(MutationKind::Pin),
            "privacy" => Ok(MutationKind::Privacy),
            "collapsed" => Ok(MutationKind::Collapsed),
            "order" => Ok(MutationKind::Order),
            "goal" => Ok(MutationKind::Goal),
            "delete" => Ok(MutationKind::Delete),
            other => Err(QuillError::Validation(format!(
                "unknown mutation kind '{}'",
                other
            ))),
        }
    }
}

/// A single field change dispatched through `NoteStore::update_field`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum NoteField {
    Title(String),
    Content(String),
    Pinned(bool),
    Private(bool),
    Collapsed(bool),
    Order(i64),
    Goal(Option<u32>),
    GoalType(super::GoalType),
}

impl NoteField {
    pub fn kind(&self) -> MutationKind {
        match self {
            NoteField::Title(_) => MutationKind::Title,
            NoteField::Content(_) => MutationKind::Content,
            NoteField::Pinned(_) => MutationKind::Pin,
            NoteField::Private(_) => MutationKind::Privacy,
            NoteField::Collapsed(_) => MutationKind::Collapsed,
            NoteField::Order(_) => MutationKind::Order,
            NoteField::Goal(_) | NoteField::GoalType(_) => MutationKind::Goal,
        }
    }
}

/// What a queued mutation replays against its store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum MutationPayload {
    Create { note: Note },
    Update { source: NoteSource, field: NoteField },
    Delete { source: NoteSource },
}

impl MutationPayload {
    /// The store this payload must replay against.
    pub fn source(&self) -> NoteSource {
        match self {
            MutationPayload::Create { note } => note.source,
            MutationPayload::Update { source, .. } => *source,
            MutationPayload::Delete { source } => *source,
        }
    }
}

/// One persisted offline intent, replayed in `queued_at` order on reconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMutation {
    pub id: Uuid,
    pub kind: MutationKind,
    pub note_id: Uuid,
    pub payload: MutationPayload,
    pub queued_at: i64,
}

impl QueuedMutation {
    pub fn new(kind: MutationKind, note_id: Uuid, payload: MutationPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            note_id,
            payload,
            queued_at: now_ms(),
        }
    }
}
