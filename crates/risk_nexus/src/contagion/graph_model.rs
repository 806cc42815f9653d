//! Graph model: entities, relationships, immutable snapshots, and the resolved view.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::health::{self, clamp_health};
use super::persist::GraphDocument;
use super::types::{EntityId, EntityKind, HealthStatus, RelationshipKind, MAX_HEALTH};

// ============================================================================
// Entities and Relationships
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    pub valuation: f64,
    pub cash_reserve: f64,
    pub health: f64,
    pub status: HealthStatus,
    pub description: Option<String>,
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            valuation: 0.0,
            cash_reserve: 0.0,
            health: MAX_HEALTH,
            status: HealthStatus::Healthy,
            description: None,
        }
    }

    pub fn with_financials(mut self, valuation: f64, cash_reserve: f64) -> Self {
        self.valuation = valuation;
        self.cash_reserve = cash_reserve;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets health and derives the at-rest status for it.
    pub fn with_health(mut self, health: f64) -> Self {
        self.health = clamp_health(health);
        self.status = health::status_for_health(self.health);
        self
    }

    pub fn is_bankrupt(&self) -> bool {
        self.status.is_bankrupt()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub source: EntityId,
    pub target: EntityId,
    pub kind: RelationshipKind,
    pub weight: f64,
}

impl Relationship {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        kind: RelationshipKind,
        weight: f64,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            weight,
        }
    }

    pub fn investment(source: impl Into<String>, target: impl Into<String>, weight: f64) -> Self {
        Self::new(source, target, RelationshipKind::Investment, weight)
    }

    pub fn dependency(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(source, target, RelationshipKind::Dependency, 1.0)
    }

    pub fn partnership(source: impl Into<String>, target: impl Into<String>, weight: f64) -> Self {
        Self::new(source, target, RelationshipKind::Partnership, weight)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// All entities and relationships at one point of a simulation.
///
/// Entity ids are unique; relationship order is the authored insertion order and
/// decides tie-breaking in the impacted set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "GraphDocument", into = "GraphDocument")]
pub struct GraphSnapshot {
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
}

impl GraphSnapshot {
    /// Rejects duplicate ids; health outside `[0, 100]` (NaN included) is clamped
    /// and an unreachable status is re-derived from health.
    pub fn new(
        mut entities: Vec<Entity>,
        relationships: Vec<Relationship>,
    ) -> Result<Self, GraphError> {
        let mut seen = HashSet::with_capacity(entities.len());
        for entity in &entities {
            if !seen.insert(entity.id.as_str()) {
                return Err(GraphError::DuplicateEntityId {
                    entity_id: entity.id.clone(),
                });
            }
        }
        for entity in &mut entities {
            let authored = (entity.health, entity.status);
            if health::normalize_entity(entity) {
                tracing::warn!(
                    entity = %entity.id,
                    authored_health = authored.0,
                    authored_status = %authored.1,
                    health = entity.health,
                    status = %entity.status,
                    "normalized entity health"
                );
            }
        }
        Ok(Self {
            entities,
            relationships,
        })
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id == id)
    }

    pub fn model(&self) -> GraphModel<'_> {
        GraphModel::new(self)
    }

    /// Every entity back to Healthy with full health; topology and attributes are kept.
    pub fn reset(&self) -> Self {
        let mut snapshot = self.clone();
        snapshot.entities.iter_mut().for_each(health::reset_entity);
        snapshot
    }

    pub fn bankrupt_count(&self) -> usize {
        self.entities.iter().filter(|entity| entity.is_bankrupt()).count()
    }

    /// blake3 digest of the canonical JSON document.
    pub fn fingerprint(&self) -> String {
        let document = GraphDocument::from(self.clone());
        let bytes = serde_json::to_vec(&document).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }

    pub fn validate(&self) -> Vec<ValidationIssue> {
        let ids: HashSet<&str> = self.entities.iter().map(|e| e.id.as_str()).collect();
        let mut issues = Vec::new();

        for entity in &self.entities {
            if entity.valuation < 0.0 || entity.cash_reserve < 0.0 {
                issues.push(ValidationIssue::NegativeAttribute {
                    entity_id: entity.id.clone(),
                });
            }
        }

        for (index, relationship) in self.relationships.iter().enumerate() {
            for endpoint in [&relationship.source, &relationship.target] {
                if !ids.contains(endpoint.as_str()) {
                    issues.push(ValidationIssue::MalformedRelationship {
                        index,
                        missing: endpoint.clone(),
                    });
                }
            }
            if relationship.source == relationship.target {
                issues.push(ValidationIssue::SelfRelationship {
                    index,
                    entity_id: relationship.source.clone(),
                });
            }
            if relationship.weight < 0.0 || relationship.weight.is_nan() {
                issues.push(ValidationIssue::NegativeWeight {
                    index,
                    weight: relationship.weight,
                });
            }
        }

        issues
    }

    /// Presentation-only subset of the graph; propagation never sees it.
    pub fn filtered_view(&self, filter: RelationshipFilter) -> Self {
        if filter == RelationshipFilter::All {
            return self.clone();
        }
        let relationships: Vec<Relationship> = self
            .relationships
            .iter()
            .filter(|relationship| filter.allows(relationship.kind))
            .cloned()
            .collect();
        let active: HashSet<&str> = relationships
            .iter()
            .flat_map(|r| [r.source.as_str(), r.target.as_str()])
            .collect();
        let entities = self
            .entities
            .iter()
            .filter(|entity| active.contains(entity.id.as_str()))
            .cloned()
            .collect();
        Self {
            entities,
            relationships,
        }
    }

    pub(crate) fn entity_at_mut(&mut self, index: usize) -> Option<&mut Entity> {
        self.entities.get_mut(index)
    }
}

// ============================================================================
// Resolved view
// ============================================================================

/// Read-only view with O(1) id lookup and relationships resolved to entities.
#[derive(Debug, Clone)]
pub struct GraphModel<'a> {
    snapshot: &'a GraphSnapshot,
    index: HashMap<&'a str, usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolvedRelationship<'a> {
    /// Position in the snapshot's relationship list.
    pub index: usize,
    pub relationship: &'a Relationship,
    pub source_index: usize,
    pub target_index: usize,
    pub source: &'a Entity,
    pub target: &'a Entity,
}

impl<'a> GraphModel<'a> {
    pub fn new(snapshot: &'a GraphSnapshot) -> Self {
        let index = snapshot
            .entities
            .iter()
            .enumerate()
            .map(|(position, entity)| (entity.id.as_str(), position))
            .collect();
        Self { snapshot, index }
    }

    pub fn snapshot(&self) -> &'a GraphSnapshot {
        self.snapshot
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn entity(&self, id: &str) -> Option<&'a Entity> {
        let snapshot = self.snapshot;
        self.index_of(id).and_then(|position| snapshot.entities.get(position))
    }

    pub fn require(&self, id: &str) -> Result<&'a Entity, GraphError> {
        self.entity(id).ok_or_else(|| GraphError::UnknownEntity {
            entity_id: id.to_string(),
        })
    }

    /// Relationships with both endpoints present; dangling ones are skipped.
    pub fn relationships(&self) -> impl Iterator<Item = ResolvedRelationship<'a>> + '_ {
        let snapshot = self.snapshot;
        snapshot
            .relationships
            .iter()
            .enumerate()
            .filter_map(move |(index, relationship)| {
                let source_index = self.index_of(&relationship.source)?;
                let target_index = self.index_of(&relationship.target)?;
                Some(ResolvedRelationship {
                    index,
                    relationship,
                    source_index,
                    target_index,
                    source: &snapshot.entities[source_index],
                    target: &snapshot.entities[target_index],
                })
            })
    }
}

// ============================================================================
// Presentation filter
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipFilter {
    #[default]
    All,
    /// Investment edges only.
    Financial,
    /// Dependency edges only.
    Technical,
}

impl RelationshipFilter {
    pub fn allows(&self, kind: RelationshipKind) -> bool {
        match self {
            RelationshipFilter::All => true,
            RelationshipFilter::Financial => kind == RelationshipKind::Investment,
            RelationshipFilter::Technical => kind == RelationshipKind::Dependency,
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "all" => Some(RelationshipFilter::All),
            "financial" | "investment" => Some(RelationshipFilter::Financial),
            "technical" | "tech" | "dependency" => Some(RelationshipFilter::Technical),
            _ => None,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ValidationIssue {
    MalformedRelationship { index: usize, missing: EntityId },
    SelfRelationship { index: usize, entity_id: EntityId },
    NegativeWeight { index: usize, weight: f64 },
    NegativeAttribute { entity_id: EntityId },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("duplicate entity id: {entity_id}")]
    DuplicateEntityId { entity_id: EntityId },
    #[error("unknown entity: {entity_id}")]
    UnknownEntity { entity_id: EntityId },
}
