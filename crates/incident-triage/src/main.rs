use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use incident_triage::agents::{self, AgentRegistry};
use incident_triage::config::TriageConfig;
use incident_triage::errors::EXIT_GENERIC;
use incident_triage::itsm::ServiceNowClient;
use incident_triage::llm::{ModelClient, RigModelClient};
use incident_triage::report::{self, OutputFormat};
use incident_triage::{FailurePolicy, IncidentAssistant, TriageError};

/// Analyze a ServiceNow incident with category-specific AI agents.
#[derive(Debug, Parser)]
#[command(name = "incident-triage", version, about)]
struct Cli {
    /// Incident sys_id to analyze.
    incident: String,

    /// TOML config file; overrides TRIAGE_* environment variables.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Run only these agents (repeatable), e.g. `--agent linux`.
    #[arg(long = "agent", value_name = "KEY")]
    agents: Vec<String>,

    /// Also register agents that are not implemented yet.
    #[arg(long)]
    include_unimplemented: bool,

    /// Abort on the first agent failure instead of reporting it and continuing.
    #[arg(long)]
    halt_on_failure: bool,

    /// Skip TLS certificate verification for the ticketing API.
    #[arg(long)]
    insecure: bool,
}

fn load_config(cli: &Cli) -> Result<TriageConfig> {
    let mut config = match &cli.config {
        Some(path) => TriageConfig::from_file(path)
            .map_err(|e| TriageError::Configuration(format!("{e:#}")))?,
        None => TriageConfig::from_env(),
    };
    if cli.insecure {
        config.itsm.verify_tls = false;
    }
    config.validate()?;
    Ok(config)
}

fn build_assistant(cli: &Cli, config: &TriageConfig) -> Result<IncidentAssistant> {
    let tracker = Arc::new(ServiceNowClient::new(&config.itsm)?);
    let model: Arc<dyn ModelClient> = Arc::new(RigModelClient::new(&config.model)?);

    let registry = if cli.include_unimplemented {
        AgentRegistry::all(model)
    } else {
        AgentRegistry::production(model)
    };

    if let Some(unknown) = cli.agents.iter().find(|k| registry.get(k).is_none()) {
        return Err(TriageError::Configuration(format!(
            "unknown agent `{unknown}` (available: {})",
            registry.keys().join(", ")
        ))
        .into());
    }

    let mut assistant = IncidentAssistant::new(tracker, registry);
    if !cli.agents.is_empty() {
        assistant = assistant.with_selection_policy(agents::only_keys(cli.agents.clone()));
    }
    if cli.halt_on_failure {
        assistant = assistant.with_failure_policy(FailurePolicy::HaltOnFirst);
    }
    Ok(assistant)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;
    info!(
        itsm = %config.itsm.base_url,
        model = %config.model.model,
        verify_tls = config.itsm.verify_tls,
        "Incident triage starting"
    );

    let assistant = build_assistant(&cli, &config)?;
    let analysis = assistant
        .analyze_incident(&cli.incident)
        .await
        .with_context(|| format!("Failed to analyze incident {}", cli.incident))?;

    let rendered = report::render(&analysis, cli.format).context("Failed to render report")?;
    print!("{rendered}");
    if cli.format == OutputFormat::Json {
        println!();
    }

    if analysis.all_failed() {
        let code = analysis
            .failures()
            .next()
            .map(|(_, err)| err.exit_code())
            .unwrap_or(EXIT_GENERIC);
        return Ok(exit_code(code));
    }
    Ok(ExitCode::SUCCESS)
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            let code = err
                .downcast_ref::<TriageError>()
                .map(TriageError::exit_code)
                .unwrap_or(EXIT_GENERIC);
            exit_code(code)
        }
    }
}
