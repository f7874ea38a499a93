//! Rendering of an [`IncidentAnalysis`] for the terminal.

use std::fmt::Write as _;

use crate::assistant::{AgentOutcome, IncidentAnalysis};

/// Output format selected with `--format`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One `=== KEY ANALYSIS ===` section per agent.
    #[default]
    Text,
    /// The whole analysis as pretty-printed JSON.
    Json,
}

/// Render `analysis` in the requested format.
pub fn render(analysis: &IncidentAnalysis, format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(analysis)),
        OutputFormat::Json => serde_json::to_string_pretty(analysis),
    }
}

/// Bracketed list rendering: `['a', 'b']`.
fn list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|i| quote(i)).collect();
    format!("[{}]", quoted.join(", "))
}

/// Single quotes unless the item holds `'` and no `"`; backslashes and the
/// active quote character are escaped.
fn quote(item: &str) -> String {
    let escaped = item.replace('\\', "\\\\");
    if escaped.contains('\'') && !escaped.contains('"') {
        format!("\"{escaped}\"")
    } else {
        format!("'{}'", escaped.replace('\'', "\\'"))
    }
}

pub fn render_text(analysis: &IncidentAnalysis) -> String {
    let mut out = String::new();
    for report in &analysis.reports {
        let title = report.key.to_uppercase();
        // Writing into a String cannot fail.
        let _ = match &report.outcome {
            AgentOutcome::Completed(result) => writeln!(
                out,
                "=== {title} ANALYSIS ===\nFindings: {}\nRecommendations: {}",
                list(result.findings()),
                list(result.recommendations()),
            ),
            AgentOutcome::Failed { error } => {
                writeln!(out, "=== {title} ANALYSIS FAILED ===\nError: {error}")
            }
        };
    }
    out
}
