//! Category-specific analysis agents.
//!
//! Each agent implements [`AnalysisAgent`] and is registered under a short key
//! (`"linux"`, `"windows"`) in an [`AgentRegistry`]. Registration order is the
//! order the assistant runs them in and the order results are reported.
//!
//! Whether an agent runs for a given incident is decided by a
//! [`SelectionPolicy`], injected into the assistant.

pub mod linux;
pub mod response;
pub mod windows;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::{TriageError, TriageResult};
use crate::llm::ModelClient;
use crate::models::{AnalysisResult, Incident};

pub use linux::LinuxInfraAgent;
pub use windows::WindowsInfraAgent;

/// One analysis capability.
#[async_trait]
pub trait AnalysisAgent: Send + Sync {
    /// Registry key, also used as the report section title (e.g. `"linux"`).
    fn key(&self) -> &'static str;

    /// Name stamped on every result this agent produces (e.g. `"linux_agent"`).
    fn name(&self) -> &'static str;

    /// Analyze one incident.
    ///
    /// # Errors
    ///
    /// `ModelCall` for provider or parse failures, `NotImplemented` for
    /// placeholder variants.
    async fn analyze(&self, incident: &Incident) -> TriageResult<AnalysisResult>;
}

/// Ordered set of agents, unique by key.
#[derive(Default)]
pub struct AgentRegistry {
    agents: Vec<Box<dyn AnalysisAgent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agents fit for production traffic. Placeholder variants are excluded.
    pub fn production(model: Arc<dyn ModelClient>) -> Self {
        Self {
            agents: vec![Box::new(LinuxInfraAgent::new(model))],
        }
    }

    /// Every known agent, including unimplemented ones.
    pub fn all(model: Arc<dyn ModelClient>) -> Self {
        Self {
            agents: vec![
                Box::new(LinuxInfraAgent::new(model)),
                Box::new(WindowsInfraAgent::new()),
            ],
        }
    }

    /// Append an agent.
    ///
    /// # Errors
    ///
    /// `DuplicateAgent` if the key is already taken.
    pub fn register(&mut self, agent: Box<dyn AnalysisAgent>) -> TriageResult<()> {
        if self.get(agent.key()).is_some() {
            return Err(TriageError::DuplicateAgent(agent.key().to_string()));
        }
        self.agents.push(agent);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&dyn AnalysisAgent> {
        self.agents
            .iter()
            .find(|a| a.key() == key)
            .map(|a| a.as_ref())
    }

    /// Keys in registration order.
    pub fn keys(&self) -> Vec<&'static str> {
        self.agents.iter().map(|a| a.key()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn AnalysisAgent> {
        self.agents.iter().map(|a| a.as_ref())
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Decides whether an agent applies to an incident.
pub type SelectionPolicy = Arc<dyn Fn(&dyn AnalysisAgent, &Incident) -> bool + Send + Sync>;

/// Every agent applies to every incident.
pub fn always_applicable() -> SelectionPolicy {
    Arc::new(|_, _| true)
}

/// Only agents whose key is in `keys` apply.
pub fn only_keys<I, S>(keys: I) -> SelectionPolicy
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let allowed: HashSet<String> = keys.into_iter().map(Into::into).collect();
    Arc::new(move |agent, _| allowed.contains(agent.key()))
}
