//! Structured Generation Boundary.
//!
//! Three operations share one path: serialize the typed input, send it with
//! the output JSON Schema to a [`GenerationBackend`], then deserialize the
//! response into the typed output and run semantic checks. Nothing the
//! backend returns reaches the task tree without passing both steps.

pub mod backend;
pub mod claude;
pub mod prompt;
pub mod schema;

use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::GenerationError;

pub use backend::{GenerationBackend, GenerationRequest};
pub use claude::ClaudeCliBackend;
use schema::{
    EstimateEffortInput, EstimateEffortOutput, GeneratePathwayInput, GeneratePathwayOutput,
    SuggestOrganizationInput, SuggestOrganizationOutput,
};

// ---------------------------------------------------------------------------
// Operation names
// ---------------------------------------------------------------------------

/// The named generation operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationKind {
    EstimateEffort,
    SuggestOrganization,
    GeneratePathway,
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EstimateEffort => "estimate-effort",
            Self::SuggestOrganization => "suggest-organization",
            Self::GeneratePathway => "generate-pathway",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Accepted results
// ---------------------------------------------------------------------------

/// A validated effort estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffortEstimate {
    pub story_points: u32,
    pub justification: String,
}

/// A validated learning pathway, steps in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pathway {
    pub title: String,
    pub steps: Vec<PathwayStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathwayStep {
    pub description: String,
    pub subtasks: Vec<String>,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// One structured generation call site: its schemas, prompt and the
/// semantic checks applied after schema validation.
pub trait Operation {
    const KIND: GenerationKind;
    type Input: Serialize + JsonSchema + Sync;
    type Output: DeserializeOwned + JsonSchema;
    type Accepted;

    fn prompt(input: &Self::Input) -> String;

    /// Reject outputs that are well-formed but unusable.
    fn accept(output: Self::Output) -> Result<Self::Accepted, String>;
}

pub struct EstimateEffort;
pub struct SuggestOrganization;
pub struct GeneratePathway;

impl Operation for EstimateEffort {
    const KIND: GenerationKind = GenerationKind::EstimateEffort;
    type Input = EstimateEffortInput;
    type Output = EstimateEffortOutput;
    type Accepted = EffortEstimate;

    fn prompt(input: &Self::Input) -> String {
        prompt::estimate_effort(input)
    }

    fn accept(output: Self::Output) -> Result<EffortEstimate, String> {
        let points = output.story_points;
        let whole = points.is_finite() && points.fract() == 0.0;
        if !whole || points < 1.0 || points > f64::from(u32::MAX) {
            return Err(format!("story points must be a whole number >= 1, got {points}"));
        }
        let justification = output.justification.trim();
        if justification.is_empty() {
            return Err("justification is blank".to_owned());
        }
        if justification.parse::<f64>().is_ok() {
            return Err(format!("justification is just a number: {justification:?}"));
        }
        Ok(EffortEstimate {
            story_points: points as u32,
            justification: justification.to_owned(),
        })
    }
}

impl Operation for SuggestOrganization {
    const KIND: GenerationKind = GenerationKind::SuggestOrganization;
    type Input = SuggestOrganizationInput;
    type Output = SuggestOrganizationOutput;
    type Accepted = String;

    fn prompt(input: &Self::Input) -> String {
        prompt::suggest_organization(input)
    }

    fn accept(output: Self::Output) -> Result<String, String> {
        let suggestion = output.suggestion.trim();
        if suggestion.is_empty() {
            return Err("suggestion is blank".to_owned());
        }
        Ok(suggestion.to_owned())
    }
}

impl Operation for GeneratePathway {
    const KIND: GenerationKind = GenerationKind::GeneratePathway;
    type Input = GeneratePathwayInput;
    type Output = GeneratePathwayOutput;
    type Accepted = Pathway;

    fn prompt(input: &Self::Input) -> String {
        prompt::generate_pathway(input)
    }

    fn accept(output: Self::Output) -> Result<Pathway, String> {
        let mut steps = Vec::with_capacity(output.steps.len());
        for (i, step) in output.steps.into_iter().enumerate() {
            let description = step.task_description.trim();
            if description.is_empty() {
                return Err(format!("step {} has a blank description", i + 1));
            }
            let mut subtasks = Vec::new();
            for sub in step.subtasks.unwrap_or_default() {
                let sub = sub.trim();
                if sub.is_empty() {
                    return Err(format!("step {} has a blank subtask", i + 1));
                }
                subtasks.push(sub.to_owned());
            }
            steps.push(PathwayStep {
                description: description.to_owned(),
                subtasks,
            });
        }
        Ok(Pathway {
            title: output.pathway_title.trim().to_owned(),
            steps,
        })
    }
}

// ---------------------------------------------------------------------------
// StructuredGenerator
// ---------------------------------------------------------------------------

/// Validating front end over a [`GenerationBackend`].
#[derive(Clone)]
pub struct StructuredGenerator {
    backend: Arc<dyn GenerationBackend>,
}

impl fmt::Debug for StructuredGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuredGenerator")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl StructuredGenerator {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Run one operation end to end.
    pub async fn run<O: Operation>(
        &self,
        input: &O::Input,
    ) -> Result<O::Accepted, GenerationError> {
        let operation = O::KIND;
        let backend_error = |source: anyhow::Error| GenerationError::Backend { operation, source };

        let request = GenerationRequest {
            kind: operation,
            prompt: O::prompt(input),
            input: serde_json::to_value(input).map_err(|e| backend_error(e.into()))?,
            output_schema: serde_json::to_value(schemars::schema_for!(O::Output))
                .map_err(|e| backend_error(e.into()))?,
        };

        debug!(%operation, backend = self.backend.name(), "invoking generation backend");
        let raw = self
            .backend
            .generate(&request)
            .await
            .map_err(backend_error)?;

        let raw = match raw {
            Some(value) if !value.is_null() => value,
            _ => return Err(GenerationError::NoOutput { operation }),
        };
        let output: O::Output = serde_json::from_value(raw)
            .map_err(|source| GenerationError::SchemaMismatch { operation, source })?;
        O::accept(output).map_err(|reason| GenerationError::Invalid { operation, reason })
    }

    pub async fn estimate_effort(
        &self,
        task_description: &str,
    ) -> Result<EffortEstimate, GenerationError> {
        self.run::<EstimateEffort>(&EstimateEffortInput {
            task_description: task_description.to_owned(),
        })
        .await
    }

    pub async fn suggest_organization(
        &self,
        tasks: Vec<String>,
    ) -> Result<String, GenerationError> {
        self.run::<SuggestOrganization>(&SuggestOrganizationInput { tasks })
            .await
    }

    pub async fn generate_pathway(&self, learning_goal: &str) -> Result<Pathway, GenerationError> {
        self.run::<GeneratePathway>(&GeneratePathwayInput {
            learning_goal: learning_goal.to_owned(),
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
