//! Generative-model seam.
//!
//! Agents talk to the provider through [`ModelClient`] only. The production
//! implementation, [`RigModelClient`], drives a rig agent against any
//! OpenAI-compatible endpoint (Gemini's compatibility API by default). The
//! optional tool declaration is registered as a rig `Tool` whose arguments
//! are captured and handed back as a structured payload.

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::{Prompt, PromptError, ToolDefinition};
use rig::providers::openai;
use rig::tool::Tool;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::errors::{TriageError, TriageResult};

/// Name under which every analysis tool is registered with the model.
pub const ANALYSIS_TOOL_NAME: &str = "record_analysis";

/// Model turns allowed when a tool is attached: one call plus the final answer.
const TOOL_MAX_TURNS: usize = 2;

/// Provider-agnostic tool declaration the model may invoke.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDeclaration {
    pub description: String,
    /// JSON Schema for the tool arguments.
    pub parameters: Value,
}

/// One model call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    /// System instructions.
    pub preamble: String,
    pub prompt: String,
    pub tool: Option<ToolDeclaration>,
}

impl ModelRequest {
    pub fn new(preamble: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            preamble: preamble.into(),
            prompt: prompt.into(),
            tool: None,
        }
    }

    pub fn with_tool(mut self, tool: ToolDeclaration) -> Self {
        self.tool = Some(tool);
        self
    }
}

/// What the model returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    /// Final text answer.
    pub text: String,
    /// Arguments of the tool call, if the model invoked the declared tool.
    pub tool_payload: Option<Value>,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_payload: None,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> String;

    /// Submit one request.
    ///
    /// # Errors
    ///
    /// `ModelCall` on transport failure, provider error, or timeout.
    async fn generate(&self, request: ModelRequest) -> TriageResult<ModelResponse>;
}

// ── rig-backed implementation ───────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("tool payload error: {0}")]
pub struct CaptureError(String);

/// rig tool that records the arguments the model submits.
struct CaptureTool {
    declaration: ToolDeclaration,
    sink: Arc<Mutex<Option<Value>>>,
}

impl Tool for CaptureTool {
    const NAME: &'static str = ANALYSIS_TOOL_NAME;
    type Error = CaptureError;
    type Args = Value;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: ANALYSIS_TOOL_NAME.into(),
            description: self.declaration.description.clone(),
            parameters: self.declaration.parameters.clone(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        if !args.is_object() {
            return Err(CaptureError(format!("expected an object, got {args}")));
        }
        *self.sink.lock().await = Some(args);
        Ok("recorded".to_string())
    }
}

/// [`ModelClient`] over a rig OpenAI-compatible completions client.
pub struct RigModelClient {
    client: openai::CompletionsClient,
    config: ModelConfig,
}

impl RigModelClient {
    pub fn new(config: &ModelConfig) -> TriageResult<Self> {
        let client = openai::CompletionsClient::builder()
            .api_key(&config.api_key)
            .base_url(&config.base_url)
            .build()
            .map_err(|e| {
                TriageError::Configuration(format!("failed to build model client: {e}"))
            })?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl ModelClient for RigModelClient {
    fn model_name(&self) -> String {
        self.config.model.clone()
    }

    async fn generate(&self, request: ModelRequest) -> TriageResult<ModelResponse> {
        let builder = self
            .client
            .agent(&self.config.model)
            .preamble(&request.preamble)
            .temperature(self.config.temperature);

        let sink = Arc::new(Mutex::new(None));
        let agent = match request.tool {
            Some(declaration) => builder
                .tool(CaptureTool {
                    declaration,
                    sink: Arc::clone(&sink),
                })
                .default_max_turns(TOOL_MAX_TURNS)
                .build(),
            None => builder.build(),
        };

        let outcome = tokio::time::timeout(self.config.timeout(), agent.prompt(&request.prompt))
            .await
            .map_err(|_| {
                TriageError::ModelCall(format!(
                    "{} did not answer within {}s",
                    self.config.model, self.config.timeout_secs
                ))
            })?;

        let tool_payload = sink.lock().await.take();
        let text = match outcome {
            Ok(text) => text,
            // The model kept calling the tool; the last recorded call is the analysis.
            Err(PromptError::MaxTurnsError { .. }) if tool_payload.is_some() => {
                warn!(
                    model = %self.config.model,
                    max_turns = TOOL_MAX_TURNS,
                    "turn limit reached after tool call, using captured payload"
                );
                String::new()
            }
            Err(e) => return Err(TriageError::ModelCall(e.to_string())),
        };
        debug!(
            model = %self.config.model,
            tool_called = tool_payload.is_some(),
            "model call complete"
        );
        Ok(ModelResponse { text, tool_payload })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn declaration() -> ToolDeclaration {
        ToolDeclaration {
            description: "record".into(),
            parameters: json!({ "type": "object" }),
        }
    }

    #[tokio::test]
    async fn capture_tool_records_arguments() {
        let sink = Arc::new(Mutex::new(None));
        let tool = CaptureTool {
            declaration: declaration(),
            sink: Arc::clone(&sink),
        };
        let out = tool
            .call(json!({ "findings": ["a"], "recommendations": [], "confidence": 0.5 }))
            .await
            .unwrap();
        assert_eq!(out, "recorded");
        let captured = sink.lock().await.take().unwrap();
        assert_eq!(captured["findings"][0], "a");
    }

    #[tokio::test]
    async fn capture_tool_rejects_non_object() {
        let sink = Arc::new(Mutex::new(None));
        let tool = CaptureTool {
            declaration: declaration(),
            sink: Arc::clone(&sink),
        };
        assert!(tool.call(json!("nope")).await.is_err());
        assert!(sink.lock().await.is_none());
    }

    #[tokio::test]
    async fn capture_tool_definition_uses_declaration() {
        let tool = CaptureTool {
            declaration: declaration(),
            sink: Arc::new(Mutex::new(None)),
        };
        let def = tool.definition(String::new()).await;
        assert_eq!(def.name, ANALYSIS_TOOL_NAME);
        assert_eq!(def.description, "record");
    }

    #[test]
    fn request_builder_attaches_tool() {
        let req = ModelRequest::new("system", "prompt").with_tool(declaration());
        assert_eq!(req.preamble, "system");
        assert!(req.tool.is_some());
    }
}
