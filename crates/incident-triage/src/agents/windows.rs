//! Windows infrastructure agent (placeholder).

use async_trait::async_trait;

use crate::errors::{TriageError, TriageResult};
use crate::models::{AnalysisResult, Incident};

use super::AnalysisAgent;

/// Registered only by [`super::AgentRegistry::all`]. Every call fails with
/// `NotImplemented` rather than returning an empty analysis.
#[derive(Debug, Default)]
pub struct WindowsInfraAgent;

impl WindowsInfraAgent {
    pub const KEY: &'static str = "windows";
    pub const NAME: &'static str = "windows_agent";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AnalysisAgent for WindowsInfraAgent {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn analyze(&self, _incident: &Incident) -> TriageResult<AnalysisResult> {
        Err(TriageError::NotImplemented {
            agent: Self::NAME.to_string(),
        })
    }
}
