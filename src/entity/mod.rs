mod mutation;

pub use mutation::{MutationKind, MutationPayload, NoteField, QueuedMutation};

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{QuillError, Result};

/// Current epoch time in milliseconds, the unit both stores persist.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Which backing store currently owns a note. Exactly one store owns a note
/// at any time; this is the partition key for all store dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteSource {
    Cache,
    Durable,
}

impl NoteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteSource::Cache => "cache",
            NoteSource::Durable => "durable",
        }
    }

    pub fn other(&self) -> NoteSource {
        match self {
            NoteSource::Cache => NoteSource::Durable,
            NoteSource::Durable => NoteSource::Cache,
        }
    }
}

impl fmt::Display for NoteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteSource {
    type Err = QuillError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cache" => Ok(NoteSource::Cache),
            "durable" => Ok(NoteSource::Durable),
            other => Err(QuillError::Validation(format!(
                "unknown store '{}' (expected 'cache' or 'durable')",
                other
            ))),
        }
    }
}

/// Unit for an optional writing goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalType {
    Words,
    Characters,
    #[default]
    None,
}

impl GoalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalType::Words => "words",
            GoalType::Characters => "characters",
            GoalType::None => "none",
        }
    }
}

impl FromStr for GoalType {
    type Err = QuillError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "words" => Ok(GoalType::Words),
            "characters" => Ok(GoalType::Characters),
            "none" => Ok(GoalType::None),
            other => Err(QuillError::Validation(format!(
                "unknown goal type '{}'",
                other
            ))),
        }
    }
}

/// A rich-text note, the record shape exchanged with both stores.
///
/// `order` is an absolute position across both pin groups: `0` means "not yet
/// assigned a stable position" (freshly created or mid-migration); any positive
/// value is a stable position unique within its pin group after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,
    pub source: NoteSource,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_collapsed: bool,
    #[serde(default)]
    pub order: i64,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub goal: Option<u32>,
    #[serde(default)]
    pub goal_type: GoalType,
}

impl Note {
    pub fn new(title: impl Into<String>, content: impl Into<String>, source: NoteSource) -> Self {
        let now = now_ms();
        Self {
            id: Uuid::new_v4(),
            source,
            title: title.into(),
            content: content.into(),
            pinned: false,
            is_private: false,
            is_collapsed: false,
            order: 0,
            created_at: now,
            updated_at: now,
            goal: None,
            goal_type: GoalType::None,
        }
    }

    /// Refresh `updated_at`, keeping it monotonically non-decreasing.
    pub fn touch(&mut self) {
        self.updated_at = now_ms().max(self.updated_at);
    }

    /// Apply a single field change in place and refresh `updated_at`.
    pub fn apply(&mut self, field: &NoteField) {
        match field {
            NoteField::Title(v) => self.title = v.clone(),
            NoteField::Content(v) => self.content = v.clone(),
            NoteField::Pinned(v) => self.pinned = *v,
            NoteField::Private(v) => self.is_private = *v,
            NoteField::Collapsed(v) => self.is_collapsed = *v,
            NoteField::Order(v) => self.order = *v,
            NoteField::Goal(v) => self.goal = *v,
            NoteField::GoalType(v) => self.goal_type = *v,
        }
        self.touch();
    }
}

/// A single `order` assignment, the unit of `batch_update_order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    pub note_id: Uuid,
    pub order: i64,
}

/// Identity the engine acts on behalf of.
///
/// The cache store is keyed by the opaque `device_id`, generated once and
/// persisted client-side. The durable store requires the authenticated
/// `user_id` supplied by the collaborating auth system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub device_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl Owner {
    pub fn anonymous(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            user_id: None,
        }
    }

    pub fn signed_in(device_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            user_id: Some(user_id.into()),
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.user_id.is_some()
    }

    /// Authenticated user id, or an Auth error when not signed in.
    pub fn user_id(&self) -> Result<&str> {
        self.user_id
            .as_deref()
            .ok_or_else(|| QuillError::Auth("this operation needs a signed-in user".to_string()))
    }

    /// Store new notes default into: durable when signed in, cache otherwise.
    pub fn default_source(&self) -> NoteSource {
        if self.is_signed_in() {
            NoteSource::Durable
        } else {
            NoteSource::Cache
        }
    }
}
