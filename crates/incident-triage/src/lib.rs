//! Incident triage assistant.
//!
//! Fetches an incident from ServiceNow, dispatches it to category-specific
//! analysis agents backed by a generative model, and collects their findings.

pub mod agents;
pub mod assistant;
pub mod config;
pub mod errors;
pub mod itsm;
pub mod llm;
pub mod models;
pub mod prompts;
pub mod report;

pub use assistant::{FailurePolicy, IncidentAnalysis, IncidentAssistant};
pub use errors::{TriageError, TriageResult};
pub use models::{AnalysisResult, Incident};
