use super::super::health::{self, DamageTally};
use super::super::types::{RelationshipKind, DEPENDENCY_DAMAGE, MAX_HEALTH, MIN_HEALTH};
use super::types::{ContagionEventKind, PropagationFrame, PropagationWarning, Termination};
use super::ContagionKernel;

/// Health lost by an investor whose stake of `weight` was wiped out.
///
/// Returns the damage and whether the cash reserve was degenerate.
pub(crate) fn investment_damage(weight: f64, cash_reserve: f64) -> (f64, bool) {
    let weight = if weight.is_nan() { 0.0 } else { weight.max(0.0) };
    if cash_reserve.is_nan() || cash_reserve <= 0.0 {
        return (MAX_HEALTH, true);
    }
    ((weight / cash_reserve) * 100.0, false)
}

struct PendingDamage {
    index: usize,
    tally: DamageTally,
}

impl ContagionKernel {
    /// Runs one propagation iteration.
    ///
    /// Returns `None` before the trigger or once the cascade has settled.
    pub fn step(&mut self) -> Option<PropagationFrame> {
        if self.trigger_id.is_none() || self.termination.is_some() {
            return None;
        }
        let iteration = self.iteration.saturating_add(1);
        let start = self.current.clone();
        let model = start.model();

        let mut pending: Vec<PendingDamage> = Vec::new();
        let mut slot_of: Vec<Option<usize>> = vec![None; start.len()];
        let mut detected: Vec<usize> = Vec::new();
        let mut damage_events = Vec::new();

        for resolved in model.relationships() {
            if !resolved.target.is_bankrupt() || resolved.source.is_bankrupt() {
                continue;
            }
            let relationship = resolved.relationship;
            let amount = match relationship.kind {
                RelationshipKind::Investment => {
                    let (amount, degenerate) =
                        investment_damage(relationship.weight, resolved.source.cash_reserve);
                    if degenerate {
                        tracing::warn!(
                            entity = %resolved.source.id,
                            relationship = resolved.index,
                            cash_reserve = resolved.source.cash_reserve,
                            "degenerate cash reserve, treating stake as full loss"
                        );
                        self.warnings.push(PropagationWarning::DegenerateCashReserve {
                            entity_id: resolved.source.id.clone(),
                            relationship_index: resolved.index,
                            cash_reserve: resolved.source.cash_reserve,
                        });
                    }
                    amount
                }
                RelationshipKind::Dependency => DEPENDENCY_DAMAGE,
                RelationshipKind::Partnership => continue,
            };

            let slot = match slot_of[resolved.source_index] {
                Some(slot) => slot,
                None => {
                    pending.push(PendingDamage {
                        index: resolved.source_index,
                        tally: DamageTally::default(),
                    });
                    let slot = pending.len() - 1;
                    slot_of[resolved.source_index] = Some(slot);
                    slot
                }
            };
            let entry = &mut pending[slot];
            entry.tally.record(relationship.kind, amount);

            damage_events.push(ContagionEventKind::DamageApplied {
                entity_id: resolved.source.id.clone(),
                counterparty: resolved.target.id.clone(),
                relationship_index: resolved.index,
                relationship_kind: relationship.kind,
                amount: amount.max(0.0),
            });

            if resolved.source.health - entry.tally.total() <= MIN_HEALTH
                && !detected.contains(&resolved.source_index)
            {
                detected.push(resolved.source_index);
            }
        }

        let mut events = Vec::with_capacity(damage_events.len());
        for kind in damage_events {
            events.push(self.record_event(iteration, kind));
        }

        let mut next = start.clone();
        let mut damaged = Vec::with_capacity(pending.len());
        for entry in &pending {
            let Some(entity) = next.entity_at_mut(entry.index) else {
                continue;
            };
            let transition = health::apply_damage(entity.health, entity.status, &entry.tally);
            entity.health = transition.to_health;
            entity.status = transition.to_status;
            damaged.push(entity.id.clone());
            if transition.status_changed() {
                let kind = ContagionEventKind::StatusChanged {
                    entity_id: entity.id.clone(),
                    from: transition.from_status,
                    to: transition.to_status,
                    health: transition.to_health,
                };
                events.push(self.record_event(iteration, kind));
            }
        }

        let mut newly_bankrupt = Vec::with_capacity(detected.len());
        for index in &detected {
            if let Some(entity) = next.entities().get(*index) {
                newly_bankrupt.push(entity.id.clone());
                self.impacted.push(entity.name.clone());
                self.impacted_ids.push(entity.id.clone());
            }
        }

        self.current = next;
        self.iteration = iteration;

        tracing::debug!(
            iteration,
            damaged = damaged.len(),
            newly_bankrupt = newly_bankrupt.len(),
            "propagation iteration"
        );

        if newly_bankrupt.is_empty() {
            events.push(self.settle(Termination::Converged {
                iterations: iteration,
            }));
        } else if iteration >= self.max_iterations {
            events.push(self.settle(Termination::Capped {
                iterations: iteration,
            }));
        }

        let frame = PropagationFrame {
            iteration,
            snapshot: self.current.clone(),
            damaged,
            newly_bankrupt,
            events,
            termination: self.termination,
        };
        self.frames.push(frame.clone());
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::investment_damage;

    #[test]
    fn investment_damage_scales_with_cash_reserve() {
        assert_eq!(investment_damage(5.0, 10.0), (50.0, false));
        assert_eq!(investment_damage(0.0, 10.0), (0.0, false));
    }

    #[test]
    fn degenerate_cash_reserve_is_full_loss() {
        assert_eq!(investment_damage(1.0, 0.0), (100.0, true));
        assert_eq!(investment_damage(1.0, -3.0), (100.0, true));
        assert_eq!(investment_damage(1.0, f64::NAN), (100.0, true));
    }

    #[test]
    fn negative_or_nan_weight_does_no_damage() {
        assert_eq!(investment_damage(-4.0, 10.0), (0.0, false));
        assert_eq!(investment_damage(f64::NAN, 10.0), (0.0, false));
    }
}
