//! The transport seam between structured generation and a concrete model.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::GenerationKind;

/// Everything a backend needs for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub kind: GenerationKind,
    pub prompt: String,
    /// The typed input, serialized.
    pub input: Value,
    /// JSON Schema the response must satisfy.
    pub output_schema: Value,
}

/// A natural-language generation backend.
///
/// Implementations return the raw structured value (`None` when the model
/// produced nothing). Validation happens in
/// [`super::StructuredGenerator`], never here.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Human-readable backend name (e.g. "claude-cli").
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<Option<Value>>;
}

// Compile-time assertion: GenerationBackend must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn GenerationBackend) {}
};
