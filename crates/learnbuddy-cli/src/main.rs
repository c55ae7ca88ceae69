mod ai_cmds;
mod config;
mod resolve;
mod task_cmds;

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use learnbuddy_core::Identity;
use learnbuddy_db::config::DbConfig;
use learnbuddy_db::pool::{self, DatabaseStatus};
use learnbuddy_db::queries::tasks::{self, TaskCounts};
use sqlx::PgPool;

use config::{LearnbuddyConfig, Overrides};

#[derive(Parser)]
#[command(name = "learnbuddy", about = "Learning task tracker with AI-assisted planning")]
struct Cli {
    /// Database URL (overrides LEARNBUDDY_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Signed-in user; tasks go to the remote store (overrides LEARNBUDDY_USER)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Directory for the local task snapshot (overrides LEARNBUDDY_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            database_url: self.database_url.clone(),
            user: self.user.clone(),
            data_dir: self.data_dir.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a learnbuddy config file from the global flags (no database required)
    Init {
        /// Path to the claude CLI used for generation
        #[arg(long)]
        claude_binary: Option<String>,
        /// Model passed to the claude CLI
        #[arg(long)]
        model: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create and migrate the remote task database
    DbInit,
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
    #[command(flatten)]
    Task(TaskCommands),
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Add a task at the top of the list
    Add {
        /// What to learn or do
        description: String,
    },
    /// List tasks, newest first
    List {
        /// Only pending tasks
        #[arg(long, conflicts_with = "completed")]
        pending: bool,
        /// Only completed tasks
        #[arg(long)]
        completed: bool,
    },
    /// Flip a task between pending and completed
    Toggle {
        /// Task ID or unique prefix
        task_id: String,
    },
    /// Set a task's story points (a whole number >= 0; empty means 0)
    Points {
        /// Task ID or unique prefix
        task_id: String,
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Delete a task and its subtasks
    Delete {
        /// Task ID or unique prefix
        task_id: String,
    },
    /// Delete every completed task
    ClearCompleted,
    /// Subtask management
    Subtask {
        #[command(subcommand)]
        command: SubtaskCommands,
    },
    /// Ask the assistant for a story point estimate and apply it
    Estimate {
        /// Task ID or unique prefix
        task_id: String,
    },
    /// Ask the assistant how to organize the current tasks
    Suggest,
    /// Generate a learning pathway for a goal
    Pathway {
        /// The learning goal, e.g. "Learn Go"
        goal: String,
        /// Add every step as a task
        #[arg(long)]
        add: bool,
    },
}

#[derive(Subcommand)]
pub enum SubtaskCommands {
    /// Append a subtask to a task
    Add {
        /// Parent task ID or unique prefix
        task_id: String,
        description: String,
    },
    /// Flip a subtask between pending and completed
    Toggle {
        /// Parent task ID or unique prefix
        task_id: String,
        /// Subtask ID or unique prefix
        subtask_id: String,
    },
    /// Delete a subtask
    Delete {
        /// Parent task ID or unique prefix
        task_id: String,
        /// Subtask ID or unique prefix
        subtask_id: String,
    },
}

/// Execute the `learnbuddy init` command: write config file.
fn cmd_init(
    overrides: &Overrides,
    claude_binary: Option<String>,
    model: Option<String>,
    force: bool,
) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let db_url = overrides
        .database_url
        .clone()
        .unwrap_or_else(|| DbConfig::DEFAULT_URL.to_owned());
    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: Some(db_url.clone()),
        },
        identity: config::IdentitySection {
            user: overrides.user.clone(),
        },
        storage: config::StorageSection {
            data_dir: overrides.data_dir.clone(),
        },
        generation: config::GenerationSection {
            claude_binary,
            model,
        },
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    match &cfg.identity.user {
        Some(user) => println!("  identity.user = {user}"),
        None => println!("  identity.user not set; tasks are kept locally"),
    }
    println!();
    println!("Next: run `learnbuddy db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `learnbuddy db-init` command: create database and run migrations.
async fn cmd_db_init(overrides: &Overrides) -> anyhow::Result<()> {
    let resolved = LearnbuddyConfig::resolve(overrides)?;

    println!("Initializing learnbuddy database...");
    let (db_pool, status) = pool::prepare_database(&resolved.db_config).await?;
    let result = report_db_status(&db_pool, &status, resolved.user.as_ref()).await;
    db_pool.close().await;
    result?;

    println!("learnbuddy db-init complete.");
    Ok(())
}

async fn report_db_status(
    db_pool: &PgPool,
    status: &DatabaseStatus,
    user: Option<&Identity>,
) -> anyhow::Result<()> {
    print!("{}", format_db_status(status));
    if let Some(user) = user {
        let counts = tasks::count_tasks(db_pool, user.as_str()).await?;
        println!("{}", format_task_counts(user, &counts));
    }
    Ok(())
}

fn format_db_status(status: &DatabaseStatus) -> String {
    let state = if status.created { "created" } else { "already present" };
    let version = status
        .schema_version
        .map_or_else(|| "none".to_owned(), |v| v.to_string());
    format!("  database {state}\n  schema version {version}\n")
}

fn format_task_counts(user: &Identity, counts: &TaskCounts) -> String {
    format!(
        "  tasks for {user}: {} pending, {} completed",
        counts.pending, counts.completed
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let overrides = cli.overrides();

    match cli.command {
        Commands::Init {
            claude_binary,
            model,
            force,
        } => {
            cmd_init(&overrides, claude_binary, model, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(&overrides).await?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "learnbuddy",
                &mut std::io::stdout(),
            );
        }
        Commands::Task(command) => {
            let resolved = LearnbuddyConfig::resolve(&overrides)?;
            task_cmds::run_task_command(command, &resolved).await?;
        }
    }

    Ok(())
}
