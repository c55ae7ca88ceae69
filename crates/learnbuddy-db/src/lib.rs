//! PostgreSQL plumbing for the remote task store.
//!
//! Each user's tasks live in the `tasks` table, scoped by the `owner_id`
//! column. Subtasks are embedded in the parent row as a `jsonb` array.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
