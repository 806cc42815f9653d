//! Persistence utilities: the authored graph document, run reports, and error types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use super::controller::SimulationOutcome;
use super::graph_model::{Entity, GraphError, GraphSnapshot, Relationship};
use super::health::{clamp_health, status_for_health};
use super::kernel::{PropagationWarning, Termination};
use super::types::{
    EntityId, EntityKind, HealthStatus, RelationshipKind, MAX_HEALTH, REPORT_VERSION,
};

// ============================================================================
// Graph document
// ============================================================================

/// Boundary format shared with authoring tools and renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GraphDocument {
    pub nodes: Vec<NodeRecord>,
    #[serde(alias = "relationships")]
    pub links: Vec<LinkRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: EntityId,
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "deserialize_entity_kind")]
    pub kind: EntityKind,
    #[serde(default)]
    pub valuation: f64,
    #[serde(default)]
    pub cash_reserve: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_health: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<HealthStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub source: EntityId,
    pub target: EntityId,
    #[serde(default, alias = "weight")]
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
}

fn deserialize_entity_kind<'de, D>(deserializer: D) -> Result<EntityKind, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(EntityKind::parse(&raw).unwrap_or_default())
}

impl From<NodeRecord> for Entity {
    fn from(record: NodeRecord) -> Self {
        let health = clamp_health(record.current_health.unwrap_or(MAX_HEALTH));
        let status = record.status.unwrap_or_else(|| status_for_health(health));
        Entity {
            id: record.id,
            name: record.name,
            kind: record.kind,
            valuation: record.valuation,
            cash_reserve: record.cash_reserve,
            health,
            status,
            description: record.description,
        }
    }
}

impl From<Entity> for NodeRecord {
    fn from(entity: Entity) -> Self {
        NodeRecord {
            id: entity.id,
            name: entity.name,
            kind: entity.kind,
            valuation: entity.valuation,
            cash_reserve: entity.cash_reserve,
            current_health: Some(entity.health),
            status: Some(entity.status),
            description: entity.description,
        }
    }
}

impl From<LinkRecord> for Relationship {
    fn from(record: LinkRecord) -> Self {
        Relationship::new(record.source, record.target, record.kind, record.value)
    }
}

impl From<Relationship> for LinkRecord {
    fn from(relationship: Relationship) -> Self {
        LinkRecord {
            source: relationship.source,
            target: relationship.target,
            value: relationship.weight,
            kind: relationship.kind,
        }
    }
}

impl TryFrom<GraphDocument> for GraphSnapshot {
    type Error = GraphError;

    fn try_from(document: GraphDocument) -> Result<Self, Self::Error> {
        GraphSnapshot::new(
            document.nodes.into_iter().map(Entity::from).collect(),
            document.links.into_iter().map(Relationship::from).collect(),
        )
    }
}

impl From<GraphSnapshot> for GraphDocument {
    fn from(snapshot: GraphSnapshot) -> Self {
        GraphDocument {
            nodes: snapshot.entities().iter().cloned().map(NodeRecord::from).collect(),
            links: snapshot
                .relationships()
                .iter()
                .cloned()
                .map(LinkRecord::from)
                .collect(),
        }
    }
}

impl GraphDocument {
    pub fn into_snapshot(self) -> Result<GraphSnapshot, PersistError> {
        Ok(GraphSnapshot::try_from(self)?)
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(input: &str) -> Result<Self, PersistError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        write_json_to_path(self, path.as_ref())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        read_json_from_path(path.as_ref())
    }
}

pub fn load_snapshot(path: impl AsRef<Path>) -> Result<GraphSnapshot, PersistError> {
    GraphDocument::load_json(path)?.into_snapshot()
}

pub fn save_snapshot(snapshot: &GraphSnapshot, path: impl AsRef<Path>) -> Result<(), PersistError> {
    GraphDocument::from(snapshot.clone()).save_json(path)
}

// ============================================================================
// Run report
// ============================================================================

fn default_report_version() -> u32 {
    REPORT_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    #[serde(default = "default_report_version")]
    pub version: u32,
    pub input_fingerprint: String,
    pub trigger_id: EntityId,
    pub patient_zero: String,
    pub impacted: Vec<String>,
    pub termination: Termination,
    pub systemic_damage: f64,
    #[serde(default)]
    pub warnings: Vec<PropagationWarning>,
    #[serde(default)]
    pub narrative: Option<String>,
    #[serde(default)]
    pub narrative_error: Option<String>,
    pub final_graph: GraphDocument,
}

impl SimulationReport {
    pub fn from_outcome(outcome: &SimulationOutcome) -> Self {
        Self {
            version: REPORT_VERSION,
            input_fingerprint: outcome.input_fingerprint.clone(),
            trigger_id: outcome.trigger_id.clone(),
            patient_zero: outcome.patient_zero.clone(),
            impacted: outcome.impacted.clone(),
            termination: outcome.termination,
            systemic_damage: outcome.systemic_damage,
            warnings: outcome.warnings.clone(),
            narrative: outcome.narrative.clone(),
            narrative_error: outcome.narrative_error.clone(),
            final_graph: GraphDocument::from(outcome.final_snapshot.clone()),
        }
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(input: &str) -> Result<Self, PersistError> {
        let report: Self = serde_json::from_str(input)?;
        report.validate_version()?;
        Ok(report)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        write_json_to_path(self, path.as_ref())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let report: Self = read_json_from_path(path.as_ref())?;
        report.validate_version()?;
        Ok(report)
    }

    pub(crate) fn validate_version(&self) -> Result<(), PersistError> {
        if self.version == REPORT_VERSION {
            Ok(())
        } else {
            Err(PersistError::UnsupportedVersion {
                kind: "report".to_string(),
                version: self.version,
                expected: REPORT_VERSION,
            })
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serde error: {0}")]
    Serde(String),
    #[error("invalid graph: {0}")]
    Graph(String),
    #[error("unsupported {kind} version {version} (expected {expected})")]
    UnsupportedVersion {
        kind: String,
        version: u32,
        expected: u32,
    },
}

impl From<io::Error> for PersistError {
    fn from(err: io::Error) -> Self {
        PersistError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        PersistError::Serde(err.to_string())
    }
}

impl From<GraphError> for PersistError {
    fn from(err: GraphError) -> Self {
        PersistError::Graph(err.to_string())
    }
}

// ============================================================================
// Helper functions
// ============================================================================

pub(crate) fn write_json_to_path<T: Serialize>(value: &T, path: &Path) -> Result<(), PersistError> {
    let data = serde_json::to_vec_pretty(value)?;
    fs::write(path, data)?;
    Ok(())
}

pub(crate) fn read_json_from_path<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}
