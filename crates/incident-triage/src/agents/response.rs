//! Structural parsing of model output into analysis payloads.
//!
//! Preference order:
//! 1. the arguments of a `record_analysis` tool call,
//! 2. each ```` ```json ```` fenced block in the text, in order,
//! 3. each balanced `{...}` object in the text, in order.
//!
//! The first text candidate that decodes into a non-empty payload wins, so
//! prose braces (`unit {nginx}`, `${HOME}`) ahead of the JSON are skipped.
//!
//! Beyond that the output is not validated or sanitized.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::{TriageError, TriageResult};
use crate::llm::ModelResponse;

/// Fields an agent expects back from the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisPayload {
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Absent means the model gave no estimate; reported as 0.0.
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl AnalysisPayload {
    pub fn parse(response: &ModelResponse) -> TriageResult<Self> {
        if let Some(payload) = &response.tool_payload {
            return Self::from_value(payload.clone());
        }

        let text = &response.text;
        let mut last_error = None;
        for candidate in fenced_json(text).into_iter().chain(json_objects(text)) {
            let attempt = serde_json::from_str::<Value>(candidate)
                .map_err(|e| TriageError::ModelCall(format!("invalid analysis JSON: {e}")))
                .and_then(Self::from_value);
            match attempt {
                Ok(payload) => return Ok(payload),
                Err(err) => last_error = Some(err),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TriageError::ModelCall(format!(
                "response contains no JSON analysis: {}",
                preview(text)
            ))
        }))
    }

    fn from_value(value: Value) -> TriageResult<Self> {
        let payload: AnalysisPayload = serde_json::from_value(value)
            .map_err(|e| TriageError::ModelCall(format!("unexpected analysis shape: {e}")))?;
        if payload.findings.is_empty()
            && payload.recommendations.is_empty()
            && payload.confidence.is_none()
        {
            return Err(TriageError::ModelCall(
                "analysis has no findings, recommendations or confidence".into(),
            ));
        }
        Ok(payload)
    }
}

/// Contents of every ```` ```json ```` (or bare ```` ``` ````) fence that looks like an object.
fn fenced_json(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        let Some(body_start) = after.find('\n').map(|i| i + 1) else {
            break;
        };
        let body = &after[body_start..];
        let Some(end) = body.find("```") else {
            break;
        };
        let inner = body[..end].trim();
        if inner.starts_with('{') {
            blocks.push(inner);
        }
        rest = &body[end + 3..];
    }
    blocks
}

/// Every balanced `{...}` in `text`, outermost first, by opening position.
fn json_objects(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(|&(_, ch)| ch == '{')
        .filter_map(move |(start, _)| balanced_object(&text[start..]))
}

/// The balanced object `text` opens with, honoring JSON string escapes.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    let trimmed = text.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn tool_payload_wins_over_text() {
        let response = ModelResponse {
            text: r#"{"findings": ["from text"]}"#.into(),
            tool_payload: Some(json!({
                "findings": ["from tool"],
                "recommendations": ["rotate logs"],
                "confidence": 0.9
            })),
        };
        let payload = AnalysisPayload::parse(&response).unwrap();
        assert_eq!(payload.findings, vec!["from tool"]);
        assert_eq!(payload.confidence, Some(0.9));
    }

    #[test]
    fn fenced_block_is_parsed() {
        let text = "Here is my analysis:\n```json\n{\"findings\": [\"/var at 100%\"], \"recommendations\": [\"clean journal\"], \"confidence\": 0.7}\n```\nLet me know.";
        let payload = AnalysisPayload::parse(&ModelResponse::text(text)).unwrap();
        assert_eq!(payload.findings, vec!["/var at 100%"]);
        assert_eq!(payload.recommendations, vec!["clean journal"]);
    }

    #[test]
    fn bare_object_with_braces_in_strings() {
        let text = r#"Result: {"findings": ["unit {nginx} failed \"hard\""], "confidence": 0.4} trailing"#;
        let payload = AnalysisPayload::parse(&ModelResponse::text(text)).unwrap();
        assert_eq!(payload.findings, vec![r#"unit {nginx} failed "hard""#]);
        assert!(payload.recommendations.is_empty());
    }

    #[test]
    fn non_json_fence_is_skipped() {
        let text = "```bash\ndf -h\n```\n```json\n{\"recommendations\": [\"extend LV\"]}\n```";
        let payload = AnalysisPayload::parse(&ModelResponse::text(text)).unwrap();
        assert_eq!(payload.recommendations, vec!["extend LV"]);
        assert_eq!(payload.confidence, None);
    }

    #[test]
    fn prose_braces_before_object_are_skipped() {
        let text = r#"The unit {nginx} failed. Analysis: {"findings": ["nginx down"], "recommendations": ["restart"], "confidence": 0.6}"#;
        let payload = AnalysisPayload::parse(&ModelResponse::text(text)).unwrap();
        assert_eq!(payload.findings, vec!["nginx down"]);
        assert_eq!(payload.recommendations, vec!["restart"]);
        assert_eq!(payload.confidence, Some(0.6));

        let text = r#"Check ${HOME} and {} first: {"recommendations": ["free space"]}"#;
        let payload = AnalysisPayload::parse(&ModelResponse::text(text)).unwrap();
        assert_eq!(payload.recommendations, vec!["free space"]);
    }

    #[test]
    fn later_fence_used_when_first_is_invalid() {
        let text = "```json\n{ findings: broken }\n```\nRetry:\n```json\n{\"findings\": [\"inode exhaustion\"]}\n```";
        let payload = AnalysisPayload::parse(&ModelResponse::text(text)).unwrap();
        assert_eq!(payload.findings, vec!["inode exhaustion"]);
    }

    #[test]
    fn only_invalid_candidates_report_last_error() {
        let err = AnalysisPayload::parse(&ModelResponse::text("see {nginx} and {sshd}")).unwrap_err();
        match err {
            TriageError::ModelCall(msg) => assert!(msg.contains("invalid analysis JSON"), "{msg}"),
            other => panic!("expected ModelCall, got {other:?}"),
        }
    }

    #[test]
    fn plain_prose_is_a_model_call_error() {
        let response = ModelResponse::text("I think the disk is full.");
        let err = AnalysisPayload::parse(&response).unwrap_err();
        assert!(matches!(err, TriageError::ModelCall(_)));
    }

    #[test]
    fn empty_object_is_rejected() {
        let err = AnalysisPayload::parse(&ModelResponse::text("{}")).unwrap_err();
        assert!(matches!(err, TriageError::ModelCall(_)));
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let response = ModelResponse {
            text: String::new(),
            tool_payload: Some(json!({ "findings": "not a list" })),
        };
        assert!(matches!(
            AnalysisPayload::parse(&response),
            Err(TriageError::ModelCall(_))
        ));
    }

    #[test]
    fn preview_truncates_long_text() {
        let long = "x".repeat(500);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.len(), 123);
    }
}
