use serde::{Deserialize, Serialize};

use super::super::graph_model::GraphSnapshot;
use super::super::types::{
    ContagionEventId, EntityId, HealthStatus, Iteration, RelationshipKind, DEFAULT_MAX_ITERATIONS,
};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "iterations", rename_all = "snake_case")]
pub enum IterationLimit {
    /// Stop after this many iterations even if the cascade is still spreading.
    Capped(u32),
    /// Run to the fixed point. Bankrupt is absorbing, so `entity_count + 1`
    /// iterations always suffice; that bound is enforced as a guard.
    UntilStable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationConfig {
    pub iteration_limit: IterationLimit,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            iteration_limit: IterationLimit::Capped(DEFAULT_MAX_ITERATIONS),
        }
    }
}

impl PropagationConfig {
    pub fn capped(max_iterations: u32) -> Self {
        Self {
            iteration_limit: IterationLimit::Capped(max_iterations),
        }
    }

    pub fn until_stable() -> Self {
        Self {
            iteration_limit: IterationLimit::UntilStable,
        }
    }

    pub fn max_iterations_for(&self, entity_count: usize) -> u32 {
        match self.iteration_limit {
            IterationLimit::Capped(limit) => limit,
            IterationLimit::UntilStable => {
                u32::try_from(entity_count).unwrap_or(u32::MAX).saturating_add(1)
            }
        }
    }
}

// ============================================================================
// Events and frames
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContagionEvent {
    pub id: ContagionEventId,
    pub iteration: Iteration,
    pub kind: ContagionEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ContagionEventKind {
    TriggerApplied {
        entity_id: EntityId,
        previous_status: HealthStatus,
    },
    DamageApplied {
        entity_id: EntityId,
        /// The bankrupt counterparty the damage came from.
        counterparty: EntityId,
        relationship_index: usize,
        relationship_kind: RelationshipKind,
        amount: f64,
    },
    StatusChanged {
        entity_id: EntityId,
        from: HealthStatus,
        to: HealthStatus,
        health: f64,
    },
    Settled {
        termination: Termination,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Termination {
    /// An iteration produced no new bankruptcy.
    Converged { iterations: u32 },
    /// The iteration bound was hit while the cascade was still spreading.
    Capped { iterations: u32 },
}

impl Termination {
    pub fn iterations(&self) -> u32 {
        match self {
            Termination::Converged { iterations } | Termination::Capped { iterations } => {
                *iterations
            }
        }
    }

    pub fn is_capped(&self) -> bool {
        matches!(self, Termination::Capped { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PropagationWarning {
    /// Investment damage against a zero, negative, or NaN cash reserve; treated as a full loss.
    DegenerateCashReserve {
        entity_id: EntityId,
        relationship_index: usize,
        cash_reserve: f64,
    },
}

/// Observable state after one step. Iteration 0 is the trigger step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationFrame {
    pub iteration: Iteration,
    pub snapshot: GraphSnapshot,
    pub damaged: Vec<EntityId>,
    pub newly_bankrupt: Vec<EntityId>,
    pub events: Vec<ContagionEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<Termination>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropagationRun {
    pub trigger_id: EntityId,
    pub patient_zero: String,
    pub final_snapshot: GraphSnapshot,
    /// Names of entities that went bankrupt, patient zero first, in detection order.
    pub impacted: Vec<String>,
    pub impacted_ids: Vec<EntityId>,
    pub termination: Termination,
    pub frames: Vec<PropagationFrame>,
    pub journal: Vec<ContagionEvent>,
    pub warnings: Vec<PropagationWarning>,
    pub systemic_damage: f64,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropagationError {
    #[error("unknown trigger entity: {entity_id}")]
    UnknownTriggerEntity { entity_id: EntityId },
    #[error("kernel already triggered by {entity_id}")]
    AlreadyTriggered { entity_id: EntityId },
    #[error("kernel has not been triggered")]
    NotTriggered,
}
