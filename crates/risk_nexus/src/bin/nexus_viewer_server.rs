use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use risk_nexus::contagion::{load_snapshot, LlmNarrativeGenerator, NarrativeGenerator};
use risk_nexus::{
    ContagionConfig, DisabledNarrative, Scenario, SimulationController, ViewerServer,
    ViewerServerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "nexus_viewer_server", version, about = "Stream contagion runs to a renderer")]
struct Cli {
    /// Graph document to serve.
    #[arg(long, value_name = "FILE", conflicts_with = "scenario")]
    graph: Option<PathBuf>,
    /// Built-in scenario to serve when no graph is given.
    #[arg(long, default_value = "ai_ecosystem")]
    scenario: String,
    #[arg(long, default_value = "127.0.0.1:5010")]
    bind: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = match ContagionConfig::from_default_sources() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            process::exit(1);
        }
    };

    let (snapshot, graph_id) = match &cli.graph {
        Some(path) => match load_snapshot(path) {
            Ok(snapshot) => (snapshot, path.display().to_string()),
            Err(err) => {
                eprintln!("failed to load graph {}: {err}", path.display());
                process::exit(1);
            }
        },
        None => {
            let Some(scenario) = Scenario::parse(&cli.scenario) else {
                eprintln!(
                    "unknown scenario: {} (available: {})",
                    cli.scenario,
                    Scenario::variants().join(", ")
                );
                process::exit(1);
            };
            match scenario.build() {
                Ok(snapshot) => (snapshot, scenario.as_str().to_string()),
                Err(err) => {
                    eprintln!("failed to build scenario: {err}");
                    process::exit(1);
                }
            }
        }
    };

    let narrative: Box<dyn NarrativeGenerator + Send + Sync> = match &config.llm {
        Some(llm) => match LlmNarrativeGenerator::from_config(llm) {
            Ok(generator) => Box::new(generator),
            Err(err) => {
                eprintln!("failed to build LLM client: {err}");
                process::exit(1);
            }
        },
        None => Box::new(DisabledNarrative),
    };

    let controller = Arc::new(SimulationController::new(
        snapshot,
        config.controller_config(),
        narrative,
    ));
    let server = ViewerServer::new(
        ViewerServerConfig::new(graph_id).with_bind_addr(cli.bind),
        controller,
    );

    if let Err(err) = server.run() {
        eprintln!("viewer server failed: {err}");
        process::exit(1);
    }
}
