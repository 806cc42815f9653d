//! Contagion engine: graph model, health machine, propagation kernel, and controller.
//!
//! This module is organized into submodules:
//! - `types`: Core type definitions (IDs, constants, closed enums)
//! - `graph_model`: Entities, relationships, snapshots, and the resolved view
//! - `health`: Per-entity health/status state machine
//! - `kernel`: ContagionKernel and the one-shot `propagate`
//! - `controller`: SimulationController, observers, cancellation, registry
//! - `persist`: Graph documents and run reports
//! - `config`: Configuration from `config.toml` or the environment
//! - `llm_client`: OpenAI-compatible completion client
//! - `narrative`: Narrative and scenario generators
//! - `scenario`: Built-in graphs

mod config;
mod controller;
mod graph_model;
mod health;
mod kernel;
mod llm_client;
mod narrative;
mod persist;
mod scenario;
mod types;

#[cfg(test)]
mod tests;

pub use config::{
    ConfigError, ContagionConfig, LlmConfig, DEFAULT_CONFIG_FILE_NAME, DEFAULT_LLM_SYSTEM_PROMPT,
    DEFAULT_LLM_TIMEOUT_MS, DEFAULT_STEP_DELAY_MS, ENV_LLM_API_KEY, ENV_LLM_BASE_URL,
    ENV_LLM_MODEL, ENV_LLM_SYSTEM_PROMPT, ENV_LLM_TIMEOUT_MS, ENV_MAX_ITERATIONS,
    ENV_STEP_DELAY_MS,
};
pub use controller::{
    CancelHandle, ControllerConfig, ControllerRegistry, FnObserver, NoopObserver,
    SimulationController, SimulationError, SimulationOutcome, SnapshotObserver,
};
pub use graph_model::{
    Entity, GraphError, GraphModel, GraphSnapshot, Relationship, RelationshipFilter,
    ResolvedRelationship, ValidationIssue,
};
pub use health::{
    apply_damage, clamp_health, is_consistent, normalize_entity, status_for_health, DamageTally,
    Transition,
};
pub use kernel::{
    propagate, systemic_damage, ContagionEvent, ContagionEventKind, ContagionKernel,
    IterationLimit, PropagationConfig, PropagationError, PropagationFrame, PropagationRun,
    PropagationWarning, Termination,
};
pub use llm_client::{
    LlmClientError, LlmCompletionClient, LlmCompletionRequest, LlmCompletionResult,
    OpenAiChatCompletionClient,
};
pub use narrative::{
    DisabledNarrative, LlmNarrativeGenerator, LlmScenarioGenerator, NarrativeError,
    NarrativeGenerator, NarrativeRequest, MAX_NARRATIVE_SENTENCES,
};
pub use persist::{
    load_snapshot, save_snapshot, GraphDocument, LinkRecord, NodeRecord, PersistError,
    SimulationReport,
};
pub use scenario::Scenario;
pub use types::{
    ContagionEventId, EntityId, EntityKind, GraphId, HealthStatus, Iteration, RelationshipKind,
    DEFAULT_MAX_ITERATIONS, DEPENDENCY_DAMAGE, MAX_HEALTH, MIN_HEALTH, REPORT_VERSION,
    STRESS_THRESHOLD,
};
