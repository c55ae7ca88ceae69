//! Generation backend that shells out to the `claude` CLI.
//!
//! Runs `claude -p <prompt> --output-format json --json-schema <schema>`
//! and reads the single JSON result envelope it prints on stdout.

use std::process::Stdio;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use super::backend::{GenerationBackend, GenerationRequest};

/// Backend driving the Claude Code CLI in print mode.
#[derive(Debug, Clone)]
pub struct ClaudeCliBackend {
    /// Path to the `claude` binary. Defaults to `"claude"` (found via `$PATH`).
    binary: String,
    model: Option<String>,
}

impl ClaudeCliBackend {
    pub fn new() -> Self {
        Self::with_binary("claude")
    }

    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            binary: path.into(),
            model: None,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

impl Default for ClaudeCliBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for ClaudeCliBackend {
    fn name(&self) -> &str {
        "claude-cli"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Option<Value>> {
        let schema =
            serde_json::to_string(&request.output_schema).context("failed to encode schema")?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-p")
            .arg(&request.prompt)
            .arg("--output-format")
            .arg("json")
            .arg("--json-schema")
            .arg(&schema);
        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            binary = %self.binary,
            operation = %request.kind,
            model = self.model.as_deref().unwrap_or("default"),
            "spawning claude"
        );

        let output = cmd
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} exited with {}: {}", self.binary, output.status, stderr.trim());
        }

        parse_result_envelope(&String::from_utf8_lossy(&output.stdout))
    }
}

// ---------------------------------------------------------------------------
// Envelope parsing
// ---------------------------------------------------------------------------

/// Extract the structured value from a `--output-format json` envelope.
///
/// Prefers `structured_output`; otherwise parses JSON out of the `result`
/// text. An empty envelope or empty result is `Ok(None)`.
pub fn parse_result_envelope(stdout: &str) -> Result<Option<Value>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let envelope: Value =
        serde_json::from_str(trimmed).context("malformed JSON in claude output")?;

    if envelope.get("is_error").and_then(Value::as_bool) == Some(true) {
        let detail = envelope
            .get("result")
            .and_then(Value::as_str)
            .unwrap_or("no detail");
        bail!("claude reported an error: {detail}");
    }

    if let Some(structured) = envelope.get("structured_output") {
        if !structured.is_null() {
            return Ok(Some(structured.clone()));
        }
    }

    match envelope.get("result").and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => Ok(Some(json_from_text(text)?)),
        _ => Ok(None),
    }
}

/// Pull a JSON value out of model text, tolerating a Markdown code fence.
fn json_from_text(text: &str) -> Result<Value> {
    let body = strip_code_fence(text.trim());
    if let Ok(value) = serde_json::from_str(body) {
        return Ok(value);
    }
    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&body[start..=end])
            .context("result text contains no valid JSON object"),
        _ => bail!("result text contains no JSON object"),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip the info string ("json") up to the first newline.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structured_output_wins() {
        let out = r#"{"type":"result","is_error":false,"result":"ignored",
            "structured_output":{"suggestion":"Group by topic"}}"#;
        assert_eq!(
            parse_result_envelope(out).unwrap(),
            Some(json!({"suggestion": "Group by topic"}))
        );
    }

    #[test]
    fn fenced_result_text_is_parsed() {
        let envelope = json!({
            "type": "result",
            "is_error": false,
            "result": "```json\n{\"storyPoints\": 3, \"justification\": \"ok\"}\n```"
        });
        assert_eq!(
            parse_result_envelope(&envelope.to_string()).unwrap(),
            Some(json!({"storyPoints": 3, "justification": "ok"}))
        );
    }

    #[test]
    fn prose_around_json_is_tolerated() {
        let envelope = json!({
            "result": "Here you go: {\"suggestion\": \"Start with basics\"} Good luck!"
        });
        assert_eq!(
            parse_result_envelope(&envelope.to_string()).unwrap(),
            Some(json!({"suggestion": "Start with basics"}))
        );
    }

    #[test]
    fn empty_output_is_none() {
        assert_eq!(parse_result_envelope("").unwrap(), None);
        assert_eq!(parse_result_envelope(r#"{"result":"  "}"#).unwrap(), None);
        assert_eq!(parse_result_envelope(r#"{"structured_output":null}"#).unwrap(), None);
    }

    #[test]
    fn error_envelope_fails() {
        let out = r#"{"is_error":true,"result":"rate limited"}"#;
        let err = parse_result_envelope(out).unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn garbage_fails() {
        assert!(parse_result_envelope("not json").is_err());
        assert!(parse_result_envelope(r#"{"result":"no json here"}"#).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_a_fake_cli() {
        use std::os::unix::fs::PermissionsExt;

        use crate::generate::GenerationKind;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("claude");
        std::fs::write(
            &script,
            "#!/bin/sh\necho '{\"is_error\":false,\"structured_output\":{\"suggestion\":\"ok\"}}'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let backend = ClaudeCliBackend::with_binary(script.to_string_lossy());
        let request = GenerationRequest {
            kind: GenerationKind::SuggestOrganization,
            prompt: "organize".to_owned(),
            input: json!({"tasks": ["a"]}),
            output_schema: json!({"type": "object"}),
        };
        assert_eq!(
            backend.generate(&request).await.unwrap(),
            Some(json!({"suggestion": "ok"}))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        use std::os::unix::fs::PermissionsExt;

        use crate::generate::GenerationKind;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("claude");
        std::fs::write(&script, "#!/bin/sh\necho 'auth required' >&2\nexit 2\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let backend = ClaudeCliBackend::with_binary(script.to_string_lossy());
        let request = GenerationRequest {
            kind: GenerationKind::EstimateEffort,
            prompt: "estimate".to_owned(),
            input: json!({}),
            output_schema: json!({}),
        };
        let err = backend.generate(&request).await.unwrap_err();
        assert!(err.to_string().contains("auth required"));
    }
}
