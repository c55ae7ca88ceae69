//! CLI handlers for the AI-assisted commands: `estimate`, `suggest` and
//! `pathway`.

use anyhow::{Result, bail};

use learnbuddy_core::SyncController;
use learnbuddy_core::generate::Pathway;

use crate::resolve::short_id;
use crate::task_cmds::find_task;

// -----------------------------------------------------------------------
// learnbuddy estimate <task-id>
// -----------------------------------------------------------------------

/// Estimate a task and store the result as its story points.
pub async fn cmd_estimate(controller: &SyncController, input: &str) -> Result<()> {
    let task = find_task(controller, input).await?;
    let Some(estimate) = controller.estimate_effort(task.id).await? else {
        bail!("task {} is no longer in the list", task.id);
    };
    println!("{} story points", estimate.story_points);
    println!("{}", estimate.justification);
    Ok(())
}

// -----------------------------------------------------------------------
// learnbuddy suggest
// -----------------------------------------------------------------------

pub async fn cmd_suggest(controller: &SyncController) -> Result<()> {
    let suggestion = controller.suggest_organization().await?;
    println!("{suggestion}");
    Ok(())
}

// -----------------------------------------------------------------------
// learnbuddy pathway <goal> [--add]
// -----------------------------------------------------------------------

/// Generate a pathway, print it and optionally add every step as a task.
pub async fn cmd_pathway(controller: &SyncController, goal: &str, add: bool) -> Result<()> {
    let pathway = controller.generate_pathway(goal).await?;
    print!("{}", format_pathway(&pathway));

    if add && !pathway.steps.is_empty() {
        let created = controller.add_pathway(&pathway).await?;
        println!();
        println!("Added {} task(s):", created.len());
        for task in &created {
            println!("  {}  {}", short_id(task.id), task.description);
        }
    }
    Ok(())
}

fn format_pathway(pathway: &Pathway) -> String {
    let mut out = format!("{}\n", pathway.title);
    for (i, step) in pathway.steps.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, step.description));
        for sub in &step.subtasks {
            out.push_str(&format!("     - {sub}\n"));
        }
    }
    out
}
