use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuillError {
    #[error("Not a quill notebook. Run 'quill init' first.")]
    NotInitialized,

    #[error("Already initialized. Remove .quill/ to reinitialize.")]
    AlreadyInitialized,

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Note not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Store unreachable: {0}")]
    Unavailable(String),

    #[error("Sign in required: {0}")]
    Auth(String),

    #[error("Conflicting write: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl QuillError {
    /// Transient failures worth another attempt. Validation, NotFound and Auth
    /// are terminal; Unavailable is handled by the offline queue, not retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            QuillError::Storage(_)
                | QuillError::Conflict(_)
                | QuillError::Io(_)
                | QuillError::Sqlite(_)
        )
    }

    /// True when the backing store could not be reached at all.
    pub fn is_offline(&self) -> bool {
        matches!(self, QuillError::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, QuillError>;
