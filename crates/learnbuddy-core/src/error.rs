//! Error taxonomy shared by the store, generation and sync layers.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::generate::GenerationKind;

/// Input rejected locally. Never reaches a backend and never changes state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("description must not be blank")]
    BlankDescription,

    #[error("story points must be a non-negative whole number, got {0:?}")]
    InvalidStoryPoints(String),

    #[error("learning goal must not be blank")]
    BlankLearningGoal,

    #[error("add some tasks before asking for organization suggestions")]
    NoTasks,
}

/// A task store read or write failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(Uuid),

    #[error("task store failure: {0}")]
    Backend(#[from] anyhow::Error),
}

/// The generation backend failed or returned unusable output.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{operation}: backend call failed: {source}")]
    Backend {
        operation: GenerationKind,
        #[source]
        source: anyhow::Error,
    },

    #[error("{operation}: backend returned no output")]
    NoOutput { operation: GenerationKind },

    #[error("{operation}: output does not match its schema: {source}")]
    SchemaMismatch {
        operation: GenerationKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("{operation}: output rejected: {reason}")]
    Invalid {
        operation: GenerationKind,
        reason: String,
    },
}

impl GenerationError {
    /// The operation that failed.
    pub fn operation(&self) -> GenerationKind {
        match self {
            Self::Backend { operation, .. }
            | Self::NoOutput { operation }
            | Self::SchemaMismatch { operation, .. }
            | Self::Invalid { operation, .. } => *operation,
        }
    }
}

/// The local snapshot could not be read. Callers degrade to an empty
/// collection instead of propagating this.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read task snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed task snapshot {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of a failed intent on the sync controller.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("you must be signed in to manage tasks")]
    SignedOut,
}
