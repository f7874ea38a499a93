//! Linux infrastructure agent.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::errors::TriageResult;
use crate::llm::{ModelClient, ModelRequest, ToolDeclaration};
use crate::models::{AnalysisResult, Incident};
use crate::prompts;

use super::response::AnalysisPayload;
use super::AnalysisAgent;

/// Asks the model to triage an incident against common Linux failure modes.
pub struct LinuxInfraAgent {
    model: Arc<dyn ModelClient>,
}

impl LinuxInfraAgent {
    pub const KEY: &'static str = "linux";
    pub const NAME: &'static str = "linux_agent";

    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    /// Render the analysis prompt for one incident.
    pub fn build_prompt(incident: &Incident) -> String {
        let related = if incident.related_configuration_items.is_empty() {
            "none".to_string()
        } else {
            incident.related_configuration_items.join(", ")
        };

        let mut prompt = format!(
            "Analyze Linux-related incident {number}:\n\
             Summary: {summary}\n\
             Description: {description}\n\
             Related CIs: {related}\n\n\
             Consider common Linux issues:\n",
            number = incident.number,
            summary = incident.short_description,
            description = incident.description,
        );
        for item in prompts::LINUX_CHECKLIST {
            prompt.push_str("- ");
            prompt.push_str(item);
            prompt.push('\n');
        }
        prompt
    }

    /// `record_analysis` declaration offered to the model.
    pub fn analysis_tool() -> ToolDeclaration {
        ToolDeclaration {
            description: prompts::LINUX_TOOL_DESCRIPTION.to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "findings": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Observations about the likely cause, most important first"
                    },
                    "recommendations": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Ordered remediation steps"
                    },
                    "confidence": {
                        "type": "number",
                        "minimum": 0.0,
                        "maximum": 1.0,
                        "description": "How certain the analysis is"
                    }
                },
                "required": ["findings", "recommendations", "confidence"]
            }),
        }
    }
}

#[async_trait]
impl AnalysisAgent for LinuxInfraAgent {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn analyze(&self, incident: &Incident) -> TriageResult<AnalysisResult> {
        let request =
            ModelRequest::new(prompts::INFRA_ANALYST_PREAMBLE, Self::build_prompt(incident))
                .with_tool(Self::analysis_tool());

        debug!(
            agent = Self::NAME,
            incident = %incident.number,
            model = %self.model.model_name(),
            "requesting analysis"
        );
        let response = self.model.generate(request).await?;
        let payload = AnalysisPayload::parse(&response)?;

        AnalysisResult::new(
            incident.id.clone(),
            Self::NAME,
            payload.findings,
            payload.recommendations,
            payload.confidence.unwrap_or(0.0),
        )
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::function;

    use super::*;
    use crate::errors::TriageError;
    use crate::llm::{MockModelClient, ModelResponse, ANALYSIS_TOOL_NAME};

    fn disk_incident() -> Incident {
        Incident {
            id: "46d44a5fa9fe198101d8df7afcd1b0b8".into(),
            number: "INC0012345".into(),
            short_description: "Disk alert".into(),
            description: "disk full on /var".into(),
            configuration_item: Some("ci-1".into()),
            related_configuration_items: vec!["ci-1".into()],
            application: None,
            priority: 2,
            state: 1,
        }
    }

    fn mock_with(response: TriageResult<ModelResponse>) -> MockModelClient {
        let mut mock = MockModelClient::new();
        mock.expect_model_name().return_const("test-model".to_string());
        mock.expect_generate()
            .times(1)
            .return_once(move |_| response);
        mock
    }

    #[test]
    fn prompt_embeds_incident_and_checklist() {
        let prompt = LinuxInfraAgent::build_prompt(&disk_incident());
        assert!(prompt.contains("incident INC0012345"));
        assert!(prompt.contains("Description: disk full on /var"));
        assert!(prompt.contains("Related CIs: ci-1"));
        for item in prompts::LINUX_CHECKLIST {
            assert!(prompt.contains(item), "missing checklist item {item}");
        }
    }

    #[test]
    fn prompt_without_related_items() {
        let mut incident = disk_incident();
        incident.related_configuration_items.clear();
        assert!(LinuxInfraAgent::build_prompt(&incident).contains("Related CIs: none"));
    }

    #[tokio::test]
    async fn analyze_tags_result_with_agent_and_incident() {
        let mut mock = MockModelClient::new();
        mock.expect_model_name().return_const("test-model".to_string());
        mock.expect_generate()
            .with(function(|req: &ModelRequest| {
                req.prompt.contains("INC0012345") && req.tool.is_some()
            }))
            .times(1)
            .returning(|_| {
                Ok(ModelResponse {
                    text: "done".into(),
                    tool_payload: Some(serde_json::json!({
                        "findings": ["/var is 100% used"],
                        "recommendations": ["vacuum journald", "extend /var LV"],
                        "confidence": 0.85
                    })),
                })
            });

        let agent = LinuxInfraAgent::new(Arc::new(mock));
        let incident = disk_incident();
        let result = agent.analyze(&incident).await.unwrap();

        assert_eq!(result.agent_name(), "linux_agent");
        assert_eq!(result.incident_id(), incident.id);
        assert_eq!(result.findings(), ["/var is 100% used"]);
        assert_eq!(result.recommendations().len(), 2);
        assert!((result.confidence() - 0.85).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn text_fallback_without_confidence() {
        let mock = mock_with(Ok(ModelResponse::text(
            r#"{"findings": ["sshd crashed"], "recommendations": ["restart sshd"]}"#,
        )));
        let agent = LinuxInfraAgent::new(Arc::new(mock));
        let result = agent.analyze(&disk_incident()).await.unwrap();
        assert_eq!(result.findings(), ["sshd crashed"]);
        assert_eq!(result.confidence(), 0.0);
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let mock = mock_with(Err(TriageError::ModelCall("connection reset".into())));
        let agent = LinuxInfraAgent::new(Arc::new(mock));
        let err = agent.analyze(&disk_incident()).await.unwrap_err();
        assert!(matches!(err, TriageError::ModelCall(ref m) if m.contains("connection reset")));
    }

    #[tokio::test]
    async fn unparseable_response_is_model_call_error() {
        let mock = mock_with(Ok(ModelResponse::text("Probably the disk.")));
        let agent = LinuxInfraAgent::new(Arc::new(mock));
        assert!(matches!(
            agent.analyze(&disk_incident()).await,
            Err(TriageError::ModelCall(_))
        ));
    }

    #[test]
    fn tool_schema_requires_all_fields() {
        let tool = LinuxInfraAgent::analysis_tool();
        assert_eq!(
            tool.parameters["required"],
            serde_json::json!(["findings", "recommendations", "confidence"])
        );
        assert!(tool.description.contains("Linux"));
        assert_eq!(ANALYSIS_TOOL_NAME, "record_analysis");
    }
}
