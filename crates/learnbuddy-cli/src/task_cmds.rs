//! CLI handlers for task and subtask commands.
//!
//! Every handler runs against the [`SyncController`] of a [`Session`] built
//! from the resolved config. Results go to stdout; notices go to stderr as
//! they arrive.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use learnbuddy_core::generate::{ClaudeCliBackend, StructuredGenerator};
use learnbuddy_core::store::LocalStoreConfig;
use learnbuddy_core::{
    BackendSelector, Notice, NoticeLevel, Session, SyncConfig, SyncController, Task,
};
use learnbuddy_db::pool;

use crate::config::LearnbuddyConfig;
use crate::resolve::{resolve_subtask_id, resolve_task_id, short_id};
use crate::{SubtaskCommands, TaskCommands, ai_cmds};

// -----------------------------------------------------------------------
// Public entry point
// -----------------------------------------------------------------------

/// Open a session for the configured identity, run `command` and tear the
/// session down again.
pub async fn run_task_command(command: TaskCommands, config: &LearnbuddyConfig) -> Result<()> {
    let (session, db_pool) = open_session(config).await?;
    let printer = spawn_notice_printer(session.subscribe());

    let result = match session.apply_identity(config.user.clone()).await {
        Ok(()) => dispatch(command, &session).await,
        Err(e) => Err(anyhow::Error::from(e).context("failed to load tasks")),
    };

    // Dropping the session drops every notice sender, which ends the printer.
    drop(session);
    if let Err(e) = printer.await {
        warn!(error = %e, "notice printer failed");
    }
    if let Some(p) = db_pool {
        p.close().await;
    }
    result
}

/// Build a session: the remote store when a user is configured, the local
/// snapshot under the data dir otherwise.
async fn open_session(config: &LearnbuddyConfig) -> Result<(Session, Option<PgPool>)> {
    let local = LocalStoreConfig::new(config.data_dir.clone());
    let mut selector = BackendSelector::new().with_local(local);

    let db_pool = match &config.user {
        Some(user) => {
            let db_pool = pool::create_pool(&config.db_config)
                .await
                .context("remote task store unavailable; run `learnbuddy db-init` first")?;
            info!(user = %user, "using remote task store");
            selector = selector.with_remote(db_pool.clone());
            Some(db_pool)
        }
        None => None,
    };

    let mut backend = ClaudeCliBackend::with_binary(&config.claude_binary);
    if let Some(model) = &config.model {
        backend = backend.model(model);
    }
    let generator = StructuredGenerator::new(Arc::new(backend));

    Ok((Session::new(selector, generator, SyncConfig::default()), db_pool))
}

fn spawn_notice_printer(mut rx: broadcast::Receiver<Notice>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(notice) => print_notice(&notice),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notice printer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_notice(notice: &Notice) {
    match notice.level {
        NoticeLevel::Error => eprintln!("error: {}: {}", notice.title, notice.message),
        NoticeLevel::Info | NoticeLevel::Success => {
            eprintln!("{}: {}", notice.title, notice.message)
        }
    }
}

async fn dispatch(command: TaskCommands, session: &Session) -> Result<()> {
    let controller = session.controller().await?;
    match command {
        TaskCommands::Add { description } => cmd_add(&controller, &description).await,
        TaskCommands::List { pending, completed } => {
            cmd_list(&controller, ListFilter::from_flags(pending, completed)).await
        }
        TaskCommands::Toggle { task_id } => cmd_toggle(&controller, &task_id).await,
        TaskCommands::Points { task_id, value } => cmd_points(&controller, &task_id, &value).await,
        TaskCommands::Delete { task_id } => cmd_delete(&controller, &task_id).await,
        TaskCommands::ClearCompleted => cmd_clear_completed(&controller).await,
        TaskCommands::Subtask { command } => run_subtask_command(command, &controller).await,
        TaskCommands::Estimate { task_id } => ai_cmds::cmd_estimate(&controller, &task_id).await,
        TaskCommands::Suggest => ai_cmds::cmd_suggest(&controller).await,
        TaskCommands::Pathway { goal, add } => ai_cmds::cmd_pathway(&controller, &goal, add).await,
    }
}

/// Resolve a task id (full or prefix) against the loaded tasks.
pub async fn find_task(controller: &SyncController, input: &str) -> Result<Task> {
    let tasks = controller.tasks().await;
    let id = resolve_task_id(input, &tasks)?;
    tasks
        .into_iter()
        .find(|t| t.id == id)
        .with_context(|| format!("task {id} disappeared"))
}

// -----------------------------------------------------------------------
// learnbuddy add / list
// -----------------------------------------------------------------------

async fn cmd_add(controller: &SyncController, description: &str) -> Result<()> {
    let task = controller.add_task(description).await?;
    println!("{}", task.id);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListFilter {
    All,
    Pending,
    Completed,
}

impl ListFilter {
    fn from_flags(pending: bool, completed: bool) -> Self {
        match (pending, completed) {
            (true, false) => Self::Pending,
            (false, true) => Self::Completed,
            _ => Self::All,
        }
    }

    fn keeps(self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Pending => !task.completed,
            Self::Completed => task.completed,
        }
    }
}

async fn cmd_list(controller: &SyncController, filter: ListFilter) -> Result<()> {
    let tree = controller.snapshot().await;
    let shown: Vec<&Task> = tree.tasks().iter().filter(|t| filter.keeps(t)).collect();

    if shown.is_empty() {
        println!("No tasks. Use `learnbuddy add <description>` to create one.");
        return Ok(());
    }

    println!("{:<8}  {:<4}  {:>3}  DESCRIPTION", "ID", "DONE", "PTS");
    for task in shown {
        print!("{}", format_task(task));
    }

    println!();
    println!(
        "{} pending, {} completed, {} story points remaining",
        tree.pending().count(),
        tree.completed().count(),
        tree.total_story_points(),
    );
    Ok(())
}

fn checkbox(done: bool) -> &'static str {
    if done { "[x]" } else { "[ ]" }
}

/// One task row plus an indented row per subtask.
fn format_task(task: &Task) -> String {
    let mut out = format!(
        "{:<8}  {:<4}  {:>3}  {}",
        short_id(task.id),
        checkbox(task.completed),
        task.story_points,
        task.description,
    );
    if !task.subtasks.is_empty() {
        out.push_str(&format!(
            "  ({}/{} subtasks)",
            task.completed_subtasks(),
            task.subtasks.len()
        ));
    }
    out.push('\n');
    for sub in &task.subtasks {
        out.push_str(&format!(
            "{:<8}  {:<4}  {:>3}    {} {} {}\n",
            "",
            "",
            "",
            short_id(sub.id),
            checkbox(sub.completed),
            sub.description,
        ));
    }
    out
}

// -----------------------------------------------------------------------
// learnbuddy toggle / points / delete / clear-completed
// -----------------------------------------------------------------------

async fn cmd_toggle(controller: &SyncController, input: &str) -> Result<()> {
    let task = find_task(controller, input).await?;
    match controller.toggle_complete(task.id).await? {
        Some(true) => println!("{} completed", short_id(task.id)),
        Some(false) => println!("{} pending", short_id(task.id)),
        None => anyhow::bail!("task {} is no longer in the list", task.id),
    }
    Ok(())
}

async fn cmd_points(controller: &SyncController, input: &str, value: &str) -> Result<()> {
    let task = find_task(controller, input).await?;
    if !controller.set_story_points_input(task.id, value).await? {
        anyhow::bail!("task {} is no longer in the list", task.id);
    }
    Ok(())
}

async fn cmd_delete(controller: &SyncController, input: &str) -> Result<()> {
    let task = find_task(controller, input).await?;
    if !controller.delete_task(task.id).await? {
        anyhow::bail!("task {} is no longer in the list", task.id);
    }
    Ok(())
}

async fn cmd_clear_completed(controller: &SyncController) -> Result<()> {
    let count = controller.delete_all_completed().await?;
    println!("{count}");
    Ok(())
}

// -----------------------------------------------------------------------
// learnbuddy subtask ...
// -----------------------------------------------------------------------

async fn run_subtask_command(command: SubtaskCommands, controller: &SyncController) -> Result<()> {
    match command {
        SubtaskCommands::Add {
            task_id,
            description,
        } => {
            let task = find_task(controller, &task_id).await?;
            let Some(sub) = controller.add_subtask(task.id, &description).await? else {
                anyhow::bail!("task {} is no longer in the list", task.id);
            };
            println!("{}", sub.id);
        }
        SubtaskCommands::Toggle {
            task_id,
            subtask_id,
        } => {
            let task = find_task(controller, &task_id).await?;
            let sub_id = resolve_subtask_id(&subtask_id, &task)?;
            match controller.toggle_subtask_complete(task.id, sub_id).await? {
                Some(true) => println!("{} completed", short_id(sub_id)),
                Some(false) => println!("{} pending", short_id(sub_id)),
                None => anyhow::bail!("subtask {sub_id} is no longer in the list"),
            }
        }
        SubtaskCommands::Delete {
            task_id,
            subtask_id,
        } => {
            let task = find_task(controller, &task_id).await?;
            let sub_id = resolve_subtask_id(&subtask_id, &task)?;
            if !controller.delete_subtask(task.id, sub_id).await? {
                anyhow::bail!("subtask {sub_id} is no longer in the list");
            }
        }
    }
    Ok(())
}
