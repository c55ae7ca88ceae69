//! Task and subtask id resolution.
//!
//! Ids are accepted as a full UUID or as an unambiguous prefix of one, as
//! printed by `learnbuddy list`.

use anyhow::{Result, bail};
use uuid::Uuid;

use learnbuddy_core::Task;

/// Number of id characters shown in listings.
pub const SHORT_ID_LEN: usize = 8;

pub fn short_id(id: Uuid) -> String {
    let mut s = id.to_string();
    s.truncate(SHORT_ID_LEN);
    s
}

/// Resolve `input` against the ids of `tasks`.
pub fn resolve_task_id(input: &str, tasks: &[Task]) -> Result<Uuid> {
    resolve_id(input, tasks.iter().map(|t| t.id), "task")
}

/// Resolve `input` against the subtasks of `task`.
pub fn resolve_subtask_id(input: &str, task: &Task) -> Result<Uuid> {
    resolve_id(input, task.subtasks.iter().map(|s| s.id), "subtask")
}

fn resolve_id(input: &str, ids: impl IntoIterator<Item = Uuid>, what: &str) -> Result<Uuid> {
    let needle = input.trim().to_ascii_lowercase();
    if needle.is_empty() {
        bail!("empty {what} id");
    }

    if let Ok(exact) = Uuid::parse_str(&needle) {
        return match ids.into_iter().find(|id| *id == exact) {
            Some(id) => Ok(id),
            None => bail!("no {what} with id {exact}"),
        };
    }

    let matches: Vec<Uuid> = ids
        .into_iter()
        .filter(|id| id.to_string().starts_with(&needle))
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => bail!("no {what} id starts with {input:?}"),
        _ => bail!(
            "{what} id prefix {input:?} is ambiguous ({} matches); use more characters",
            matches.len()
        ),
    }
}
