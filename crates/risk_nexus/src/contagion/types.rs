//! Core type definitions: IDs, constants, and the closed entity/relationship enums.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Type Aliases
// ============================================================================

pub type EntityId = String;
pub type GraphId = String;
pub type Iteration = u32;
pub type ContagionEventId = u64;

// ============================================================================
// Constants
// ============================================================================

pub const MAX_HEALTH: f64 = 100.0;
pub const MIN_HEALTH: f64 = 0.0;
/// Investment losses that leave health at or below this value mark the entity stressed.
pub const STRESS_THRESHOLD: f64 = 50.0;
pub const DEPENDENCY_DAMAGE: f64 = 40.0;
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;
pub const REPORT_VERSION: u32 = 1;

// ============================================================================
// Entity Kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EntityKind {
    Infrastructure,
    #[serde(rename = "Model Lab", alias = "ModelLab", alias = "model_lab")]
    ModelLab,
    #[serde(rename = "Cloud Provider", alias = "CloudProvider", alias = "cloud_provider")]
    CloudProvider,
    #[default]
    Application,
    #[serde(rename = "VC / Holding", alias = "Investor", alias = "investor")]
    Investor,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Infrastructure => "Infrastructure",
            EntityKind::ModelLab => "Model Lab",
            EntityKind::CloudProvider => "Cloud Provider",
            EntityKind::Application => "Application",
            EntityKind::Investor => "VC / Holding",
        }
    }

    /// Lenient parse for authored and generated documents.
    pub fn parse(input: &str) -> Option<Self> {
        let normalized: String = input
            .trim()
            .to_lowercase()
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric())
            .collect();
        match normalized.as_str() {
            "infrastructure" => Some(EntityKind::Infrastructure),
            "modellab" | "lab" => Some(EntityKind::ModelLab),
            "cloudprovider" | "cloud" => Some(EntityKind::CloudProvider),
            "application" | "app" => Some(EntityKind::Application),
            "vcholding" | "investor" | "vc" | "holding" => Some(EntityKind::Investor),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Health Status
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum HealthStatus {
    #[default]
    Healthy,
    Stressed,
    Bankrupt,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "Healthy",
            HealthStatus::Stressed => "Stressed",
            HealthStatus::Bankrupt => "Bankrupt",
        }
    }

    pub fn is_bankrupt(&self) -> bool {
        matches!(self, HealthStatus::Bankrupt)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Relationship Kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// Source holds a stake in target; loses `weight` relative to its cash reserve.
    Investment,
    /// Source relies on target for a critical capability.
    Dependency,
    Partnership,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Investment => "investment",
            RelationshipKind::Dependency => "dependency",
            RelationshipKind::Partnership => "partnership",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
