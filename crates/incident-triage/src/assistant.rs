//! Incident Assistant: fetch one incident, run every applicable agent,
//! collect the results.
//!
//! ## Lifecycle
//!
//! ```text
//! IncidentAssistant::analyze_incident(id)
//!   → tracker.get_incident(id)          # fetch errors propagate, no partial result
//!   → for agent in registry (in order):
//!       policy(agent, incident)?        # skipped agents leave no trace
//!       agent.analyze(incident)         # Completed or Failed report
//!       FailurePolicy::HaltOnFirst      # first failure aborts the run
//!   → IncidentAnalysis
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::agents::{always_applicable, AgentRegistry, SelectionPolicy};
use crate::errors::{TriageError, TriageResult};
use crate::itsm::IncidentTracker;
use crate::models::{AnalysisResult, Incident};

/// What happens when a single agent fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record the failure for that agent and keep going.
    #[default]
    Isolate,
    /// Abort the whole analysis with the first agent error.
    HaltOnFirst,
}

/// Outcome of one agent run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum AgentOutcome {
    Completed(AnalysisResult),
    Failed {
        #[serde(serialize_with = "error_message")]
        error: TriageError,
    },
}

fn error_message<S: serde::Serializer>(error: &TriageError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&error.to_string())
}

/// One registry entry's contribution to an analysis.
#[derive(Debug, Serialize)]
pub struct AgentReport {
    pub key: String,
    #[serde(flatten)]
    pub outcome: AgentOutcome,
    pub elapsed_ms: u64,
}

impl AgentReport {
    pub fn result(&self) -> Option<&AnalysisResult> {
        match &self.outcome {
            AgentOutcome::Completed(result) => Some(result),
            AgentOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&TriageError> {
        match &self.outcome {
            AgentOutcome::Completed(_) => None,
            AgentOutcome::Failed { error } => Some(error),
        }
    }
}

/// Everything one `analyze_incident` call produced, in registration order.
#[derive(Debug, Serialize)]
pub struct IncidentAnalysis {
    pub incident: Incident,
    pub reports: Vec<AgentReport>,
}

impl IncidentAnalysis {
    /// Successful results keyed by registry key, in registration order.
    pub fn results(&self) -> impl Iterator<Item = (&str, &AnalysisResult)> {
        self.reports
            .iter()
            .filter_map(|r| r.result().map(|res| (r.key.as_str(), res)))
    }

    pub fn result(&self, key: &str) -> Option<&AnalysisResult> {
        self.reports
            .iter()
            .find(|r| r.key == key)
            .and_then(AgentReport::result)
    }

    /// Isolated failures keyed by registry key.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &TriageError)> {
        self.reports
            .iter()
            .filter_map(|r| r.error().map(|err| (r.key.as_str(), err)))
    }

    pub fn keys(&self) -> Vec<&str> {
        self.reports.iter().map(|r| r.key.as_str()).collect()
    }

    /// `true` if at least one agent ran and every agent that ran failed.
    pub fn all_failed(&self) -> bool {
        !self.reports.is_empty() && self.reports.iter().all(|r| r.error().is_some())
    }
}

/// Orchestrates one incident analysis request end to end.
pub struct IncidentAssistant {
    tracker: Arc<dyn IncidentTracker>,
    agents: AgentRegistry,
    policy: SelectionPolicy,
    failure_policy: FailurePolicy,
}

impl IncidentAssistant {
    pub fn new(tracker: Arc<dyn IncidentTracker>, agents: AgentRegistry) -> Self {
        Self {
            tracker,
            agents,
            policy: always_applicable(),
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_selection_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    /// Fetch `incident_id` and run every applicable agent against it.
    ///
    /// # Errors
    ///
    /// - Any fetch error (`NotFound`, `Transport`, ...) unchanged.
    /// - Under [`FailurePolicy::HaltOnFirst`], the first agent error.
    pub async fn analyze_incident(&self, incident_id: &str) -> TriageResult<IncidentAnalysis> {
        let incident = self.tracker.get_incident(incident_id).await?;
        info!(
            incident = %incident.number,
            sys_id = %incident.id,
            agents = self.agents.len(),
            "incident fetched"
        );

        let mut reports = Vec::with_capacity(self.agents.len());
        for agent in self.agents.iter() {
            if !(self.policy)(agent, &incident) {
                info!(agent = agent.key(), "agent skipped by selection policy");
                continue;
            }

            let started = Instant::now();
            let outcome = agent.analyze(&incident).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let outcome = match outcome {
                Ok(result) => {
                    info!(agent = agent.key(), elapsed_ms, "agent completed");
                    AgentOutcome::Completed(result)
                }
                Err(error) if self.failure_policy == FailurePolicy::HaltOnFirst => {
                    warn!(agent = agent.key(), error = %error, "agent failed, halting");
                    return Err(error);
                }
                Err(error) => {
                    warn!(agent = agent.key(), error = %error, elapsed_ms, "agent failed");
                    AgentOutcome::Failed { error }
                }
            };
            reports.push(AgentReport {
                key: agent.key().to_string(),
                outcome,
                elapsed_ms,
            });
        }

        Ok(IncidentAnalysis { incident, reports })
    }
}
