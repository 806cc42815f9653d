pub mod contagion;
pub mod viewer;

// Engine
pub use contagion::{
    propagate, ContagionKernel, Entity, EntityId, EntityKind, GraphModel, GraphSnapshot,
    HealthStatus, IterationLimit, PropagationConfig, PropagationError, PropagationFrame,
    PropagationRun, PropagationWarning, Relationship, RelationshipFilter, RelationshipKind,
    Termination, ValidationIssue,
};

// Control surface
pub use contagion::{
    CancelHandle, ContagionConfig, ControllerConfig, ControllerRegistry, SimulationController,
    SimulationError, SimulationOutcome, SnapshotObserver,
};

// Collaborators and persistence
pub use contagion::{
    DisabledNarrative, GraphDocument, LlmNarrativeGenerator, LlmScenarioGenerator,
    NarrativeGenerator, PersistError, Scenario, SimulationReport,
};

pub use viewer::{
    ViewerRequest, ViewerResponse, ViewerServer, ViewerServerConfig, ViewerServerError,
    ViewerStream, VIEWER_PROTOCOL_VERSION,
};
