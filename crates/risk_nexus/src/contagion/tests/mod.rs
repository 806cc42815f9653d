//! Tests for the contagion module.

use super::*;

fn entity(id: &str, name: &str, valuation: f64, cash_reserve: f64) -> Entity {
    Entity::new(id, name, EntityKind::Application).with_financials(valuation, cash_reserve)
}

fn graph(entities: Vec<Entity>, relationships: Vec<Relationship>) -> GraphSnapshot {
    GraphSnapshot::new(entities, relationships).expect("unique entity ids")
}

fn state_of(snapshot: &GraphSnapshot, id: &str) -> (f64, HealthStatus) {
    let entity = snapshot.entity(id).expect("entity exists");
    (entity.health, entity.status)
}

/// X (cash 10) holds a stake of 5 in Y.
fn investment_pair(cash_reserve: f64) -> GraphSnapshot {
    graph(
        vec![
            entity("x", "X", 10.0, cash_reserve),
            entity("y", "Y", 10.0, 1.0),
        ],
        vec![Relationship::investment("x", "y", 5.0)],
    )
}

mod controller;
mod persist;
