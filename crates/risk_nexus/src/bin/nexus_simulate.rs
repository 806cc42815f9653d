use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use risk_nexus::contagion::{
    load_snapshot, FnObserver, GraphDocument, GraphSnapshot, LlmNarrativeGenerator,
    LlmScenarioGenerator, NarrativeGenerator, PropagationConfig,
};
use risk_nexus::{
    ContagionConfig, DisabledNarrative, Scenario, SimulationController, SimulationReport,
};

#[derive(Parser, Debug)]
#[command(name = "nexus_simulate", version, about = "Contagion simulation over a company graph")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Trigger a bankruptcy and print the cascade.
    Simulate {
        #[command(flatten)]
        source: GraphSource,
        /// Entity id to force bankrupt; defaults to the scenario's trigger.
        #[arg(long)]
        trigger: Option<String>,
        /// Override the iteration bound (0 runs until stable).
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Write a JSON run report to this path.
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
        /// Ask the configured language model for a narrative.
        #[arg(long, default_value_t = false)]
        narrate: bool,
    },
    /// Report structural issues in a graph.
    Validate {
        #[command(flatten)]
        source: GraphSource,
    },
    /// Write a built-in scenario as a graph document.
    Export {
        #[arg(long, default_value = "ai_ecosystem")]
        scenario: String,
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Generate a graph from a free-text description with the configured model.
    Generate {
        #[arg(long)]
        prompt: String,
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct GraphSource {
    /// Built-in scenario name.
    #[arg(long, conflicts_with = "graph")]
    scenario: Option<String>,
    /// Graph document to load.
    #[arg(long, value_name = "FILE")]
    graph: Option<PathBuf>,
}

impl GraphSource {
    fn load(&self) -> Result<(GraphSnapshot, Option<Scenario>), String> {
        if let Some(path) = &self.graph {
            let snapshot = load_snapshot(path)
                .map_err(|err| format!("failed to load graph {}: {err}", path.display()))?;
            return Ok((snapshot, None));
        }
        let name = self.scenario.as_deref().unwrap_or("ai_ecosystem");
        let scenario = parse_scenario(name)?;
        let snapshot = scenario
            .build()
            .map_err(|err| format!("failed to build scenario {name}: {err}"))?;
        Ok((snapshot, Some(scenario)))
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Simulate {
            source,
            trigger,
            max_iterations,
            report,
            narrate,
        } => run_simulate(&source, trigger, max_iterations, report, narrate),
        Command::Validate { source } => run_validate(&source),
        Command::Export { scenario, output } => run_export(&scenario, output),
        Command::Generate { prompt, output } => run_generate(&prompt, output),
    };

    if let Err(message) = result {
        eprintln!("{message}");
        process::exit(1);
    }
}

fn run_simulate(
    source: &GraphSource,
    trigger: Option<String>,
    max_iterations: Option<u32>,
    report_path: Option<PathBuf>,
    narrate: bool,
) -> Result<(), String> {
    let mut config = load_config()?;
    if let Some(limit) = max_iterations {
        config.propagation = if limit == 0 {
            PropagationConfig::until_stable()
        } else {
            PropagationConfig::capped(limit)
        };
    }

    let (snapshot, scenario) = source.load()?;
    let trigger = trigger
        .or_else(|| scenario.map(|scenario| scenario.default_trigger().to_string()))
        .ok_or_else(|| "--trigger is required with --graph".to_string())?;

    let narrative: Box<dyn NarrativeGenerator + Send + Sync> = match (&config.llm, narrate) {
        (Some(llm), true) => Box::new(
            LlmNarrativeGenerator::from_config(llm)
                .map_err(|err| format!("failed to build LLM client: {err}"))?,
        ),
        (None, true) => return Err("--narrate needs RISK_NEXUS_LLM_* settings".to_string()),
        (_, false) => Box::new(DisabledNarrative),
    };

    let controller = SimulationController::new(snapshot, config.controller_config(), narrative);
    let cancel = controller.cancel_handle();
    ctrlc::set_handler(move || cancel.cancel())
        .map_err(|err| format!("failed to install Ctrl-C handler: {err}"))?;

    let mut observer = FnObserver(|frame: &risk_nexus::PropagationFrame| {
        let bankrupt: Vec<&str> = frame.newly_bankrupt.iter().map(String::as_str).collect();
        println!(
            "iteration {}: damaged={} newly_bankrupt=[{}]",
            frame.iteration,
            frame.damaged.len(),
            bankrupt.join(", ")
        );
    });
    let outcome = controller
        .simulate(&trigger, &mut observer)
        .map_err(|err| format!("simulation failed: {err}"))?;

    println!("patient_zero: {}", outcome.patient_zero);
    println!("impacted: {}", outcome.impacted.join(", "));
    println!("termination: {:?}", outcome.termination);
    println!("systemic_damage: {:.2}", outcome.systemic_damage);
    for warning in &outcome.warnings {
        println!("warning: {warning:?}");
    }
    if let Some(text) = &outcome.narrative {
        println!("narrative: {text}");
    }
    if let Some(err) = &outcome.narrative_error {
        println!("narrative unavailable: {err}");
    }

    if let Some(path) = report_path {
        SimulationReport::from_outcome(&outcome)
            .save_json(&path)
            .map_err(|err| format!("failed to write report {}: {err}", path.display()))?;
        println!("report: {}", path.display());
    }
    Ok(())
}

fn run_validate(source: &GraphSource) -> Result<(), String> {
    let (snapshot, _) = source.load()?;
    let issues = snapshot.validate();
    println!(
        "entities: {} relationships: {} fingerprint: {}",
        snapshot.len(),
        snapshot.relationships().len(),
        snapshot.fingerprint()
    );
    if issues.is_empty() {
        println!("no issues");
        return Ok(());
    }
    for issue in &issues {
        println!("issue: {issue:?}");
    }
    Err(format!("{} issue(s) found", issues.len()))
}

fn run_export(name: &str, output: Option<PathBuf>) -> Result<(), String> {
    let snapshot = parse_scenario(name)?
        .build()
        .map_err(|err| format!("failed to build scenario {name}: {err}"))?;
    write_document(GraphDocument::from(snapshot), output)
}

fn run_generate(prompt: &str, output: Option<PathBuf>) -> Result<(), String> {
    let config = load_config()?;
    let llm = config
        .llm
        .ok_or_else(|| "generate needs RISK_NEXUS_LLM_* settings".to_string())?;
    let generator = LlmScenarioGenerator::from_config(&llm)
        .map_err(|err| format!("failed to build LLM client: {err}"))?;
    let snapshot = generator
        .generate(prompt)
        .map_err(|err| format!("scenario generation failed: {err}"))?;
    for issue in snapshot.validate() {
        eprintln!("issue: {issue:?}");
    }
    write_document(GraphDocument::from(snapshot), output)
}

fn write_document(document: GraphDocument, output: Option<PathBuf>) -> Result<(), String> {
    match output {
        Some(path) => document
            .save_json(&path)
            .map_err(|err| format!("failed to write {}: {err}", path.display())),
        None => {
            let json = document
                .to_json()
                .map_err(|err| format!("failed to encode graph: {err}"))?;
            println!("{json}");
            Ok(())
        }
    }
}

fn load_config() -> Result<ContagionConfig, String> {
    ContagionConfig::from_default_sources().map_err(|err| format!("invalid configuration: {err}"))
}

fn parse_scenario(name: &str) -> Result<Scenario, String> {
    Scenario::parse(name).ok_or_else(|| {
        format!(
            "unknown scenario: {name} (available: {})",
            Scenario::variants().join(", ")
        )
    })
}
