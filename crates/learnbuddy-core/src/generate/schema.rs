//! Wire shapes for the three generation operations.
//!
//! These structs are the contract with the backend: their JSON Schema is
//! derived with `schemars`, sent along with the prompt, and every response
//! must deserialize into the output type (unknown fields rejected) before
//! any semantic check runs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// estimate-effort
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EstimateEffortInput {
    /// The detailed description of the task for which effort needs to be estimated.
    pub task_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EstimateEffortOutput {
    /// The estimated effort in story points for the given task. Must be a
    /// positive whole number.
    pub story_points: f64,
    /// Explanation of why the story points were assigned to the task.
    pub justification: String,
}

// ---------------------------------------------------------------------------
// suggest-organization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SuggestOrganizationInput {
    /// Descriptions of the current tasks, newest first.
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SuggestOrganizationOutput {
    /// Free-form advice on how to reorganize or prioritize the tasks.
    pub suggestion: String,
}

// ---------------------------------------------------------------------------
// generate-pathway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GeneratePathwayInput {
    /// The topic or skill the user wants to learn (e.g. "learn Rust async").
    pub learning_goal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LearningStep {
    /// A specific, actionable learning task or step in the pathway.
    pub task_description: String,
    /// Smaller, actionable sub-steps for this task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtasks: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GeneratePathwayOutput {
    /// A concise, descriptive title for the pathway.
    pub pathway_title: String,
    /// Ordered learning steps, first step first.
    pub steps: Vec<LearningStep>,
}
