//! Health state machine: Healthy -> Stressed -> Bankrupt (absorbing).

use serde::{Deserialize, Serialize};

use super::graph_model::Entity;
use super::types::{HealthStatus, RelationshipKind, MAX_HEALTH, MIN_HEALTH, STRESS_THRESHOLD};

/// Clamps a health value into `[0, 100]`. NaN collapses to zero.
pub fn clamp_health(health: f64) -> f64 {
    if health.is_nan() {
        return MIN_HEALTH;
    }
    health.clamp(MIN_HEALTH, MAX_HEALTH)
}

/// Status an entity carries at rest for a given health, used when authored data
/// omits an explicit status.
pub fn status_for_health(health: f64) -> HealthStatus {
    let health = clamp_health(health);
    if health <= MIN_HEALTH {
        HealthStatus::Bankrupt
    } else if health <= STRESS_THRESHOLD {
        HealthStatus::Stressed
    } else {
        HealthStatus::Healthy
    }
}

/// Whether `status` is a state the machine can reach with `health`.
///
/// Stressed above the threshold is reachable through dependency losses, so only
/// the bankrupt boundary and healthy-below-threshold are rejected.
pub fn is_consistent(health: f64, status: HealthStatus) -> bool {
    match status {
        HealthStatus::Bankrupt => health <= MIN_HEALTH,
        HealthStatus::Stressed => health > MIN_HEALTH && health <= MAX_HEALTH,
        HealthStatus::Healthy => health > STRESS_THRESHOLD && health <= MAX_HEALTH,
    }
}

/// Damage accumulated against one entity during one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DamageTally {
    pub investment: f64,
    pub dependency: f64,
    pub investment_hits: u32,
    pub dependency_hits: u32,
}

impl DamageTally {
    pub fn record(&mut self, kind: RelationshipKind, amount: f64) {
        let amount = amount.max(0.0);
        match kind {
            RelationshipKind::Investment => {
                self.investment += amount;
                self.investment_hits = self.investment_hits.saturating_add(1);
            }
            RelationshipKind::Dependency => {
                self.dependency += amount;
                self.dependency_hits = self.dependency_hits.saturating_add(1);
            }
            RelationshipKind::Partnership => {}
        }
    }

    pub fn total(&self) -> f64 {
        self.investment + self.dependency
    }

    pub fn is_empty(&self) -> bool {
        self.investment_hits == 0 && self.dependency_hits == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from_health: f64,
    pub to_health: f64,
    pub from_status: HealthStatus,
    pub to_status: HealthStatus,
}

impl Transition {
    pub fn unchanged(health: f64, status: HealthStatus) -> Self {
        Self {
            from_health: health,
            to_health: health,
            from_status: status,
            to_status: status,
        }
    }

    pub fn became_bankrupt(&self) -> bool {
        !self.from_status.is_bankrupt() && self.to_status.is_bankrupt()
    }

    pub fn status_changed(&self) -> bool {
        self.from_status != self.to_status
    }
}

/// Applies one iteration's accumulated damage to an entity state.
pub fn apply_damage(health: f64, status: HealthStatus, tally: &DamageTally) -> Transition {
    if status.is_bankrupt() || tally.is_empty() {
        return Transition::unchanged(health, status);
    }

    let next = health - tally.total();
    let (to_health, to_status) = if next <= MIN_HEALTH {
        (MIN_HEALTH, HealthStatus::Bankrupt)
    } else if tally.dependency_hits > 0 || next <= STRESS_THRESHOLD {
        (clamp_health(next), HealthStatus::Stressed)
    } else {
        (clamp_health(next), status)
    };

    Transition {
        from_health: health,
        to_health,
        from_status: status,
        to_status,
    }
}

/// Forces an entity into the bankrupt state regardless of its current state.
pub fn force_bankrupt(entity: &mut Entity) -> Transition {
    let transition = Transition {
        from_health: entity.health,
        to_health: MIN_HEALTH,
        from_status: entity.status,
        to_status: HealthStatus::Bankrupt,
    };
    entity.health = MIN_HEALTH;
    entity.status = HealthStatus::Bankrupt;
    transition
}

pub fn reset_entity(entity: &mut Entity) {
    entity.health = MAX_HEALTH;
    entity.status = HealthStatus::Healthy;
}

/// Brings authored health into `[0, 100]` and re-derives a status the machine
/// cannot reach from it. Returns whether anything changed.
pub fn normalize_entity(entity: &mut Entity) -> bool {
    let health = clamp_health(entity.health);
    let health_changed = health.to_bits() != entity.health.to_bits();
    entity.health = health;
    if is_consistent(health, entity.status) {
        return health_changed;
    }
    entity.status = status_for_health(health);
    true
}
