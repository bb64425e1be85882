use crate::config::parse::{load_config_with_yaml, ConfigError};
use crate::config::version::fingerprint;
use crate::processing::Passthrough;
use crate::workflow::{RunReport, Workflow, WorkflowError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::signal;
use tracing::info;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("failed to encode run report: {0}")]
    Report(#[from] serde_json::Error),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/cyberflow/workflow.yml");
            eprintln!("  /etc/cyberflow/workflow.yml");
            eprintln!("\nUse --config <path> to specify a config file, or run 'cyberflow config init' to generate one.");
            std::process::exit(1);
        }
    };

    run_workflow(&config_path).await.map_err(|e| e.into())
}

async fn run_workflow(config_path: &Path) -> Result<(), RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");

    let (config, yaml) = load_config_with_yaml(config_path)?;
    let config_version = fingerprint(&yaml);
    info!(config_version, name = %config.name, "Configuration loaded");

    let mut workflow = Workflow::builder(config)
        .processor(Passthrough)
        .config_version(config_version)
        .build()?;
    workflow.start()?;

    let finished = tokio::select! {
        _ = signal::ctrl_c() => None,
        result = workflow.wait() => Some(result),
    };
    let report = match finished {
        Some(result) => result?,
        None => {
            info!("Shutdown signal received");
            workflow.stop().await?
        }
    };

    print_report(&report)?;
    report.into_result()?;
    Ok(())
}

fn print_report(report: &RunReport) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
