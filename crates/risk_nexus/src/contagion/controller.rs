//! SimulationController: owns the current graph, drives the kernel, and narrates.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use super::graph_model::GraphSnapshot;
use super::kernel::{
    ContagionEvent, ContagionKernel, PropagationConfig, PropagationError, PropagationFrame,
    PropagationWarning, Termination,
};
use super::narrative::{NarrativeError, NarrativeGenerator, NarrativeRequest};
use super::types::{EntityId, GraphId};

const PACING_SLICE_MS: u64 = 25;

// ============================================================================
// Observer
// ============================================================================

/// Receives every frame of a run as it is produced.
pub trait SnapshotObserver {
    fn on_frame(&mut self, frame: &PropagationFrame);

    fn on_outcome(&mut self, _outcome: &SimulationOutcome) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SnapshotObserver for NoopObserver {
    fn on_frame(&mut self, _frame: &PropagationFrame) {}
}

impl SnapshotObserver for Vec<PropagationFrame> {
    fn on_frame(&mut self, frame: &PropagationFrame) {
        self.push(frame.clone());
    }
}

/// Adapts a closure into an observer.
pub struct FnObserver<F>(pub F);

impl<F: FnMut(&PropagationFrame)> SnapshotObserver for FnObserver<F> {
    fn on_frame(&mut self, frame: &PropagationFrame) {
        (self.0)(frame)
    }
}

// ============================================================================
// Configuration and results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ControllerConfig {
    pub propagation: PropagationConfig,
    /// Pause between iterations so a renderer can animate; zero disables it.
    pub step_delay_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutcome {
    pub input_fingerprint: String,
    pub trigger_id: EntityId,
    pub patient_zero: String,
    pub impacted: Vec<String>,
    pub termination: Termination,
    pub systemic_damage: f64,
    pub warnings: Vec<PropagationWarning>,
    pub narrative: Option<String>,
    pub narrative_error: Option<String>,
    pub final_snapshot: GraphSnapshot,
    pub journal: Vec<ContagionEvent>,
    pub frames_emitted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("a simulation is already running on this graph")]
    AlreadyRunning,
    #[error("simulation cancelled")]
    Cancelled,
    #[error("unknown graph: {graph_id}")]
    UnknownGraph { graph_id: GraphId },
    #[error(transparent)]
    Propagation(#[from] PropagationError),
}

// ============================================================================
// Controller
// ============================================================================

#[derive(Debug)]
struct ControllerState {
    snapshot: GraphSnapshot,
    /// Bumped by reset/replace; a run started under an older epoch never commits.
    epoch: u64,
}

struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(running: &'a AtomicBool) -> Result<Self, SimulationError> {
        running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| SimulationError::AlreadyRunning)?;
        Ok(Self { running })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct SimulationController<N: NarrativeGenerator> {
    config: ControllerConfig,
    narrative: N,
    state: Mutex<ControllerState>,
    running: AtomicBool,
    cancel: CancelHandle,
}

impl<N: NarrativeGenerator> SimulationController<N> {
    pub fn new(snapshot: GraphSnapshot, config: ControllerConfig, narrative: N) -> Self {
        Self {
            config,
            narrative,
            state: Mutex::new(ControllerState { snapshot, epoch: 0 }),
            running: AtomicBool::new(false),
            cancel: CancelHandle::default(),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.lock_state().snapshot.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Triggers `trigger_id` on the current graph and runs the cascade to completion.
    ///
    /// Frames go to `observer` as they are produced. On success the final snapshot
    /// becomes the controller's current snapshot.
    pub fn simulate<O>(
        &self,
        trigger_id: &str,
        observer: &mut O,
    ) -> Result<SimulationOutcome, SimulationError>
    where
        O: SnapshotObserver + ?Sized,
    {
        let _guard = RunGuard::acquire(&self.running)?;
        self.cancel.clear();
        let (snapshot, epoch) = {
            let state = self.lock_state();
            (state.snapshot.clone(), state.epoch)
        };
        let input_fingerprint = snapshot.fingerprint();
        let started = Instant::now();

        let mut kernel = ContagionKernel::new(snapshot, self.config.propagation.clone());
        let frame = kernel.trigger(trigger_id)?;
        observer.on_frame(&frame);
        let mut frames_emitted = 1;

        while !kernel.is_settled() {
            self.pace()?;
            match kernel.step() {
                Some(frame) => {
                    observer.on_frame(&frame);
                    frames_emitted += 1;
                }
                None => break,
            }
        }
        self.check_cancelled()?;

        let run = kernel.finish()?;
        let (narrative, narrative_error) = self.narrate(&run.patient_zero, &run.impacted);
        self.check_cancelled()?;

        {
            let mut state = self.lock_state();
            if state.epoch != epoch {
                tracing::warn!(trigger = trigger_id, "graph reset during run, discarding result");
                return Err(SimulationError::Cancelled);
            }
            state.snapshot = run.final_snapshot.clone();
        }

        tracing::info!(
            trigger = trigger_id,
            impacted = run.impacted.len(),
            iterations = run.termination.iterations(),
            capped = run.termination.is_capped(),
            systemic_damage = run.systemic_damage,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "simulation finished"
        );

        let outcome = SimulationOutcome {
            input_fingerprint,
            trigger_id: run.trigger_id,
            patient_zero: run.patient_zero,
            impacted: run.impacted,
            termination: run.termination,
            systemic_damage: run.systemic_damage,
            warnings: run.warnings,
            narrative,
            narrative_error,
            final_snapshot: run.final_snapshot,
            journal: run.journal,
            frames_emitted,
        };
        observer.on_outcome(&outcome);
        Ok(outcome)
    }

    /// Cancels any in-flight run and returns every entity to Healthy / 100.
    pub fn reset(&self) -> GraphSnapshot {
        self.cancel.cancel();
        let mut state = self.lock_state();
        state.epoch = state.epoch.wrapping_add(1);
        state.snapshot = state.snapshot.reset();
        tracing::info!(entities = state.snapshot.len(), "graph reset");
        state.snapshot.clone()
    }

    /// Swaps in another graph with the same cancellation semantics as `reset`.
    pub fn replace(&self, snapshot: GraphSnapshot) {
        self.cancel.cancel();
        let mut state = self.lock_state();
        state.epoch = state.epoch.wrapping_add(1);
        tracing::info!(
            entities = snapshot.len(),
            relationships = snapshot.relationships().len(),
            "graph replaced"
        );
        state.snapshot = snapshot;
    }

    fn narrate(&self, patient_zero: &str, impacted: &[String]) -> (Option<String>, Option<String>) {
        let request = NarrativeRequest {
            patient_zero: patient_zero.to_string(),
            impacted: impacted.to_vec(),
        };
        match self.narrative.narrate(&request) {
            Ok(text) => (Some(text), None),
            Err(NarrativeError::Disabled) => (None, None),
            Err(err) => {
                tracing::warn!(error = %err, "narrative unavailable");
                (None, Some(err.to_string()))
            }
        }
    }

    fn pace(&self) -> Result<(), SimulationError> {
        let mut remaining = self.config.step_delay_ms;
        while remaining > 0 {
            self.check_cancelled()?;
            let slice = remaining.min(PACING_SLICE_MS);
            thread::sleep(Duration::from_millis(slice));
            remaining -= slice;
        }
        self.check_cancelled()
    }

    fn check_cancelled(&self) -> Result<(), SimulationError> {
        if self.cancel.is_cancelled() {
            tracing::warn!("simulation cancelled");
            return Err(SimulationError::Cancelled);
        }
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Controllers keyed by graph id.
#[derive(Debug)]
pub struct ControllerRegistry<N: NarrativeGenerator> {
    controllers: BTreeMap<GraphId, Arc<SimulationController<N>>>,
}

impl<N: NarrativeGenerator> Default for ControllerRegistry<N> {
    fn default() -> Self {
        Self {
            controllers: BTreeMap::new(),
        }
    }
}

impl<N: NarrativeGenerator> ControllerRegistry<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        graph_id: impl Into<GraphId>,
        controller: SimulationController<N>,
    ) -> Arc<SimulationController<N>> {
        let controller = Arc::new(controller);
        self.controllers
            .insert(graph_id.into(), Arc::clone(&controller));
        controller
    }

    pub fn remove(&mut self, graph_id: &str) -> Option<Arc<SimulationController<N>>> {
        self.controllers.remove(graph_id)
    }

    pub fn get(&self, graph_id: &str) -> Option<Arc<SimulationController<N>>> {
        self.controllers.get(graph_id).cloned()
    }

    pub fn graph_ids(&self) -> impl Iterator<Item = &GraphId> {
        self.controllers.keys()
    }

    pub fn simulate<O>(
        &self,
        graph_id: &str,
        trigger_id: &str,
        observer: &mut O,
    ) -> Result<SimulationOutcome, SimulationError>
    where
        O: SnapshotObserver + ?Sized,
    {
        self.require(graph_id)?.simulate(trigger_id, observer)
    }

    pub fn reset(&self, graph_id: &str) -> Result<GraphSnapshot, SimulationError> {
        Ok(self.require(graph_id)?.reset())
    }

    fn require(&self, graph_id: &str) -> Result<&Arc<SimulationController<N>>, SimulationError> {
        self.controllers
            .get(graph_id)
            .ok_or_else(|| SimulationError::UnknownGraph {
                graph_id: graph_id.to_string(),
            })
    }
}
