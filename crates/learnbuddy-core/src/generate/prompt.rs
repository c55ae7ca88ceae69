//! Prompt text for each operation. Only the schemas are load-bearing; the
//! wording can change freely.

use super::schema::{EstimateEffortInput, GeneratePathwayInput, SuggestOrganizationInput};

pub fn estimate_effort(input: &EstimateEffortInput) -> String {
    format!(
        "You are a seasoned project manager skilled at estimating task effort in story points.\n\
         \n\
         Based on the task description below, choose an appropriate whole number of story \
         points (at least 1) and explain why you assigned them.\n\
         \n\
         Task description: {}\n",
        input.task_description
    )
}

pub fn suggest_organization(input: &SuggestOrganizationInput) -> String {
    let mut prompt = String::from(
        "You are a study coach helping a learner organize their task list.\n\
         \n\
         Suggest how to group, order or prioritize the tasks below. Keep the advice \
         concrete and refer to tasks by their wording.\n\
         \n\
         Tasks:\n",
    );
    for task in &input.tasks {
        prompt.push_str("- ");
        prompt.push_str(task);
        prompt.push('\n');
    }
    prompt
}

pub fn generate_pathway(input: &GeneratePathwayInput) -> String {
    format!(
        "You are an expert curriculum designer and learning strategist.\n\
         \n\
         Generate a structured learning pathway for the goal below. The pathway is an \
         ordered series of actionable tasks; break complex tasks into smaller subtasks. \
         Respond with a `pathwayTitle` and an ordered `steps` array where each step has a \
         `taskDescription` and an optional `subtasks` array of strings.\n\
         \n\
         Learning goal: {}\n",
        input.learning_goal
    )
}
