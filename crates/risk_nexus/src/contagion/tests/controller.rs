use super::*;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Blocks inside `narrate` until released, so a run can be held open.
struct GateNarrative {
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl NarrativeGenerator for GateNarrative {
    fn narrate(&self, _request: &NarrativeRequest) -> Result<String, NarrativeError> {
        if let Ok(entered) = self.entered.lock() {
            let _ = entered.send(());
        }
        if let Ok(release) = self.release.lock() {
            let _ = release.recv();
        }
        Ok("gated".to_string())
    }
}

struct FailingNarrative;

impl NarrativeGenerator for FailingNarrative {
    fn narrate(&self, _request: &NarrativeRequest) -> Result<String, NarrativeError> {
        Err(NarrativeError::EmptyOutput)
    }
}

struct EchoNarrative;

impl NarrativeGenerator for EchoNarrative {
    fn narrate(&self, request: &NarrativeRequest) -> Result<String, NarrativeError> {
        Ok(format!(
            "{} took down {}",
            request.patient_zero,
            request.impacted.join(", ")
        ))
    }
}

#[derive(Default)]
struct RecordingObserver {
    iterations: Vec<u32>,
    outcome: Option<SimulationOutcome>,
}

impl SnapshotObserver for RecordingObserver {
    fn on_frame(&mut self, frame: &PropagationFrame) {
        self.iterations.push(frame.iteration);
    }

    fn on_outcome(&mut self, outcome: &SimulationOutcome) {
        self.outcome = Some(outcome.clone());
    }
}

fn gated_controller(
    snapshot: GraphSnapshot,
) -> (
    Arc<SimulationController<GateNarrative>>,
    Receiver<()>,
    Sender<()>,
) {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let controller = SimulationController::new(
        snapshot,
        ControllerConfig::default(),
        GateNarrative {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        },
    );
    (Arc::new(controller), entered_rx, release_tx)
}

#[test]
fn simulate_commits_final_snapshot() {
    let snapshot = investment_pair(10.0);
    let controller =
        SimulationController::new(snapshot.clone(), ControllerConfig::default(), DisabledNarrative);
    let mut observer = RecordingObserver::default();

    let outcome = controller.simulate("y", &mut observer).unwrap();

    assert_eq!(outcome.input_fingerprint, snapshot.fingerprint());
    assert_eq!(outcome.patient_zero, "Y");
    assert_eq!(outcome.frames_emitted, 2);
    assert_eq!(outcome.narrative, None);
    assert_eq!(outcome.narrative_error, None);
    assert_eq!(observer.iterations, vec![0, 1]);
    assert_eq!(observer.outcome.as_ref(), Some(&outcome));
    assert_eq!(controller.snapshot(), outcome.final_snapshot);
    assert!(!controller.is_running());
}

#[test]
fn later_runs_start_from_the_committed_state() {
    let controller = SimulationController::new(
        investment_pair(10.0),
        ControllerConfig::default(),
        DisabledNarrative,
    );
    controller.simulate("y", &mut NoopObserver).unwrap();

    let outcome = controller.simulate("x", &mut NoopObserver).unwrap();
    assert_eq!(outcome.impacted, vec!["X".to_string()]);
    assert_eq!(state_of(&outcome.final_snapshot, "y"), (0.0, HealthStatus::Bankrupt));
    // X was already at 50 before this run
    assert_eq!(outcome.systemic_damage, 5.0);
}

#[test]
fn narrative_text_is_attached_to_the_outcome() {
    let controller =
        SimulationController::new(investment_pair(2.0), ControllerConfig::default(), EchoNarrative);
    let outcome = controller.simulate("y", &mut NoopObserver).unwrap();
    assert_eq!(outcome.narrative.as_deref(), Some("Y took down Y, X"));
    assert_eq!(outcome.narrative_error, None);
}

#[test]
fn narrative_failure_keeps_the_simulation_result() {
    let controller = SimulationController::new(
        investment_pair(10.0),
        ControllerConfig::default(),
        FailingNarrative,
    );
    let outcome = controller.simulate("y", &mut NoopObserver).unwrap();

    assert_eq!(outcome.narrative, None);
    assert_eq!(
        outcome.narrative_error.as_deref(),
        Some("completion returned no text")
    );
    assert_eq!(state_of(&controller.snapshot(), "x"), (50.0, HealthStatus::Stressed));
}

#[test]
fn unknown_trigger_leaves_the_graph_untouched() {
    let snapshot = investment_pair(10.0);
    let controller =
        SimulationController::new(snapshot.clone(), ControllerConfig::default(), DisabledNarrative);
    let mut frames: Vec<PropagationFrame> = Vec::new();

    let err = controller.simulate("ghost", &mut frames).unwrap_err();
    assert_eq!(
        err,
        SimulationError::Propagation(PropagationError::UnknownTriggerEntity {
            entity_id: "ghost".to_string()
        })
    );
    assert!(frames.is_empty());
    assert_eq!(controller.snapshot(), snapshot);
    assert!(!controller.is_running());
}

#[test]
fn second_simulation_while_running_is_rejected() {
    let (controller, entered, release) = gated_controller(investment_pair(10.0));
    let worker = {
        let controller = Arc::clone(&controller);
        thread::spawn(move || controller.simulate("y", &mut NoopObserver))
    };

    entered.recv().unwrap();
    assert!(controller.is_running());
    assert_eq!(
        controller.simulate("y", &mut NoopObserver),
        Err(SimulationError::AlreadyRunning)
    );

    release.send(()).unwrap();
    let outcome = worker.join().unwrap().unwrap();
    assert_eq!(outcome.narrative.as_deref(), Some("gated"));
    assert!(!controller.is_running());
}

#[test]
fn reset_during_run_discards_the_result() {
    let snapshot = investment_pair(10.0);
    let (controller, entered, release) = gated_controller(snapshot.clone());
    let worker = {
        let controller = Arc::clone(&controller);
        thread::spawn(move || controller.simulate("y", &mut NoopObserver))
    };

    entered.recv().unwrap();
    let pristine = controller.reset();
    release.send(()).unwrap();

    assert_eq!(worker.join().unwrap(), Err(SimulationError::Cancelled));
    assert_eq!(controller.snapshot(), pristine);
    assert_eq!(pristine, snapshot.reset());
    assert_eq!(controller.snapshot().bankrupt_count(), 0);
}

#[test]
fn reset_restores_health_and_keeps_topology() {
    let snapshot = Scenario::AiEcosystem.build().unwrap();
    let controller =
        SimulationController::new(snapshot.clone(), ControllerConfig::default(), DisabledNarrative);
    controller.simulate("nvidia", &mut NoopObserver).unwrap();
    assert_ne!(controller.snapshot(), snapshot);

    let pristine = controller.reset();
    assert_eq!(pristine, snapshot);
    assert!(pristine
        .entities()
        .iter()
        .all(|entity| entity.health == MAX_HEALTH && entity.status == HealthStatus::Healthy));

    // the cancel raised by reset must not leak into the next run
    let outcome = controller.simulate("nvidia", &mut NoopObserver).unwrap();
    assert_eq!(outcome.input_fingerprint, snapshot.fingerprint());
}

#[test]
fn cancel_while_pacing_stops_the_run() {
    let snapshot = investment_pair(10.0);
    let controller = SimulationController::new(
        snapshot.clone(),
        ControllerConfig {
            propagation: PropagationConfig::default(),
            step_delay_ms: 10_000,
        },
        DisabledNarrative,
    );
    let cancel = controller.cancel_handle();
    let mut observer = FnObserver(|_frame: &PropagationFrame| cancel.cancel());

    let started = Instant::now();
    let result = controller.simulate("y", &mut observer);

    assert_eq!(result, Err(SimulationError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(controller.snapshot(), snapshot);
}

#[test]
fn step_delay_paces_iterations() {
    let controller = SimulationController::new(
        investment_pair(10.0),
        ControllerConfig {
            propagation: PropagationConfig::default(),
            step_delay_ms: 30,
        },
        DisabledNarrative,
    );
    let started = Instant::now();
    let outcome = controller.simulate("y", &mut NoopObserver).unwrap();

    assert_eq!(outcome.frames_emitted, 2);
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[test]
fn replace_swaps_the_graph() {
    let controller = SimulationController::new(
        investment_pair(10.0),
        ControllerConfig::default(),
        DisabledNarrative,
    );
    let fan = Scenario::DependencyFan.build().unwrap();
    controller.replace(fan.clone());
    assert_eq!(controller.snapshot(), fan);

    let outcome = controller.simulate("foundry", &mut NoopObserver).unwrap();
    assert_eq!(outcome.impacted, vec!["Foundry".to_string()]);
    assert_eq!(
        state_of(&outcome.final_snapshot, "research-partner"),
        (100.0, HealthStatus::Healthy)
    );
    assert_eq!(
        state_of(&outcome.final_snapshot, "lab-a"),
        (60.0, HealthStatus::Stressed)
    );
}

#[test]
fn registry_routes_by_graph_id() {
    let mut registry: ControllerRegistry<DisabledNarrative> = ControllerRegistry::new();
    registry.insert(
        "pair",
        SimulationController::new(
            investment_pair(10.0),
            ControllerConfig::default(),
            DisabledNarrative,
        ),
    );
    registry.insert(
        "chain",
        SimulationController::new(
            Scenario::InvestmentChain.build().unwrap(),
            ControllerConfig::default(),
            DisabledNarrative,
        ),
    );
    assert_eq!(
        registry.graph_ids().cloned().collect::<Vec<_>>(),
        vec!["chain".to_string(), "pair".to_string()]
    );

    let outcome = registry.simulate("pair", "y", &mut NoopObserver).unwrap();
    assert_eq!(outcome.patient_zero, "Y");
    // the other graph is unaffected
    let chain = registry.get("chain").unwrap();
    assert_eq!(chain.snapshot().bankrupt_count(), 0);

    let pristine = registry.reset("pair").unwrap();
    assert_eq!(pristine.bankrupt_count(), 0);

    assert_eq!(
        registry.simulate("missing", "y", &mut NoopObserver),
        Err(SimulationError::UnknownGraph {
            graph_id: "missing".to_string()
        })
    );
    assert!(registry.remove("pair").is_some());
    assert!(registry.get("pair").is_none());
    assert!(matches!(
        registry.reset("pair"),
        Err(SimulationError::UnknownGraph { .. })
    ));
}
