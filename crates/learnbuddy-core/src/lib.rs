//! Task/subtask state, persistence and AI-assisted planning for learnbuddy.
//!
//! # Architecture
//!
//! ```text
//! intent --> SyncController --optimistic--> TaskTree
//!                 |
//!                 +--> TaskStore (PgTaskStore | LocalTaskStore)
//!                 |        ok  -> confirm (placeholder id -> stored id)
//!                 |        err -> roll back affected tasks
//!                 |
//!                 +--> StructuredGenerator --> GenerationBackend
//!                          (schema-validated before use)
//! ```
//!
//! A [`session::Session`] picks the store once per identity and owns the
//! active controller.

pub mod error;
pub mod generate;
pub mod identity;
pub mod model;
pub mod session;
pub mod store;
pub mod sync;

pub use error::{GenerationError, LoadError, StoreError, SyncError, ValidationError};
pub use identity::{Identity, IdentityHandle, IdentityProvider};
pub use model::{NewTask, SubTask, Task, TaskPatch, TaskTree};
pub use session::{BackendSelector, Session};
pub use store::TaskStore;
pub use sync::{Notice, NoticeLevel, SyncConfig, SyncController};
