//! ContagionKernel: trigger, iteration stepping, and the run journal.

mod step;
mod types;

use super::graph_model::GraphSnapshot;
use super::health;
use super::types::{ContagionEventId, EntityId, Iteration};

pub use types::{
    ContagionEvent, ContagionEventKind, IterationLimit, PropagationConfig, PropagationError,
    PropagationFrame, PropagationRun, PropagationWarning, Termination,
};

/// Runs one contagion cascade over a private copy of a snapshot.
///
/// The kernel never touches the caller's snapshot. Each `step` evaluates every
/// relationship against the state at the start of that iteration, so results do
/// not depend on the order damage is applied within an iteration.
#[derive(Debug, Clone)]
pub struct ContagionKernel {
    config: PropagationConfig,
    initial: GraphSnapshot,
    current: GraphSnapshot,
    max_iterations: u32,
    iteration: Iteration,
    trigger_id: Option<EntityId>,
    patient_zero: String,
    impacted: Vec<String>,
    impacted_ids: Vec<EntityId>,
    next_event_id: ContagionEventId,
    journal: Vec<ContagionEvent>,
    warnings: Vec<PropagationWarning>,
    frames: Vec<PropagationFrame>,
    termination: Option<Termination>,
}

impl ContagionKernel {
    pub fn new(snapshot: GraphSnapshot, config: PropagationConfig) -> Self {
        let max_iterations = config.max_iterations_for(snapshot.len());
        Self {
            config,
            initial: snapshot.clone(),
            current: snapshot,
            max_iterations,
            iteration: 0,
            trigger_id: None,
            patient_zero: String::new(),
            impacted: Vec::new(),
            impacted_ids: Vec::new(),
            next_event_id: 0,
            journal: Vec::new(),
            warnings: Vec::new(),
            frames: Vec::new(),
            termination: None,
        }
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    pub fn current(&self) -> &GraphSnapshot {
        &self.current
    }

    pub fn iteration(&self) -> Iteration {
        self.iteration
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn impacted(&self) -> &[String] {
        &self.impacted
    }

    pub fn journal(&self) -> &[ContagionEvent] {
        &self.journal
    }

    pub fn warnings(&self) -> &[PropagationWarning] {
        &self.warnings
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    pub fn is_triggered(&self) -> bool {
        self.trigger_id.is_some()
    }

    pub fn is_settled(&self) -> bool {
        self.termination.is_some()
    }

    /// Forces `entity_id` bankrupt and records it as patient zero.
    ///
    /// Returns the iteration-0 frame. Triggering an already bankrupt entity is
    /// allowed and still yields a frame.
    pub fn trigger(&mut self, entity_id: &str) -> Result<PropagationFrame, PropagationError> {
        if let Some(existing) = &self.trigger_id {
            return Err(PropagationError::AlreadyTriggered {
                entity_id: existing.clone(),
            });
        }
        let index = self.current.model().index_of(entity_id).ok_or_else(|| {
            PropagationError::UnknownTriggerEntity {
                entity_id: entity_id.to_string(),
            }
        })?;

        let mut next = self.current.clone();
        let Some(entity) = next.entity_at_mut(index) else {
            return Err(PropagationError::UnknownTriggerEntity {
                entity_id: entity_id.to_string(),
            });
        };
        let transition = health::force_bankrupt(entity);
        let name = entity.name.clone();

        let mut events = vec![self.record_event(
            0,
            ContagionEventKind::TriggerApplied {
                entity_id: entity_id.to_string(),
                previous_status: transition.from_status,
            },
        )];
        if transition.status_changed() {
            events.push(self.record_event(
                0,
                ContagionEventKind::StatusChanged {
                    entity_id: entity_id.to_string(),
                    from: transition.from_status,
                    to: transition.to_status,
                    health: transition.to_health,
                },
            ));
        }

        self.current = next;
        self.trigger_id = Some(entity_id.to_string());
        self.patient_zero = name.clone();
        self.impacted.push(name);
        self.impacted_ids.push(entity_id.to_string());

        if self.max_iterations == 0 {
            events.push(self.settle(Termination::Capped { iterations: 0 }));
        }

        tracing::info!(
            trigger = entity_id,
            patient_zero = %self.patient_zero,
            max_iterations = self.max_iterations,
            "contagion triggered"
        );

        let frame = PropagationFrame {
            iteration: 0,
            snapshot: self.current.clone(),
            damaged: Vec::new(),
            newly_bankrupt: vec![entity_id.to_string()],
            events,
            termination: self.termination,
        };
        self.frames.push(frame.clone());
        Ok(frame)
    }

    /// Runs the remaining iterations and returns every frame they produced.
    pub fn step_until_stable(&mut self) -> Vec<PropagationFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.step() {
            frames.push(frame);
        }
        frames
    }

    /// Settles the cascade and packages the run.
    pub fn finish(mut self) -> Result<PropagationRun, PropagationError> {
        let Some(trigger_id) = self.trigger_id.clone() else {
            return Err(PropagationError::NotTriggered);
        };
        self.step_until_stable();
        let termination = self.termination.unwrap_or(Termination::Capped {
            iterations: self.iteration,
        });
        let systemic_damage = systemic_damage(&self.initial, &self.current);

        Ok(PropagationRun {
            trigger_id,
            patient_zero: self.patient_zero,
            final_snapshot: self.current,
            impacted: self.impacted,
            impacted_ids: self.impacted_ids,
            termination,
            frames: self.frames,
            journal: self.journal,
            warnings: self.warnings,
            systemic_damage,
        })
    }

    fn record_event(&mut self, iteration: Iteration, kind: ContagionEventKind) -> ContagionEvent {
        let event = ContagionEvent {
            id: self.next_event_id,
            iteration,
            kind,
        };
        self.next_event_id = self.next_event_id.saturating_add(1);
        self.journal.push(event.clone());
        event
    }

    fn settle(&mut self, termination: Termination) -> ContagionEvent {
        self.termination = Some(termination);
        tracing::info!(
            iterations = termination.iterations(),
            capped = termination.is_capped(),
            impacted = self.impacted.len(),
            "contagion settled"
        );
        self.record_event(self.iteration, ContagionEventKind::Settled { termination })
    }
}

/// Runs a full cascade from `trigger_id` without touching `snapshot`.
pub fn propagate(
    snapshot: &GraphSnapshot,
    trigger_id: &str,
    config: &PropagationConfig,
) -> Result<PropagationRun, PropagationError> {
    let mut kernel = ContagionKernel::new(snapshot.clone(), config.clone());
    kernel.trigger(trigger_id)?;
    kernel.finish()
}

/// Valuation destroyed between two snapshots of the same graph, weighted by lost health.
pub fn systemic_damage(before: &GraphSnapshot, after: &GraphSnapshot) -> f64 {
    let after_model = after.model();
    before
        .entities()
        .iter()
        .filter_map(|entity| {
            let later = after_model.entity(&entity.id)?;
            let lost = (entity.health - later.health).max(0.0);
            Some(lost / 100.0 * entity.valuation.max(0.0))
        })
        .sum()
}
