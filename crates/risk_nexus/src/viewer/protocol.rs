use serde::{Deserialize, Serialize};

use crate::contagion::{
    ContagionEvent, EntityId, GraphSnapshot, NodeRecord, PropagationFrame, PropagationWarning,
    RelationshipFilter, SimulationOutcome, Termination,
};

pub const VIEWER_PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerRequest {
    Hello { client: String, version: u32 },
    Subscribe { streams: Vec<ViewerStream> },
    SetFilter { filter: RelationshipFilter },
    RequestSnapshot,
    ResolveEntity { entity_id: EntityId },
    Trigger { entity_id: EntityId },
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerStream {
    Frames,
    Events,
    Outcome,
}

/// What a renderer needs after a run; the final graph arrives as the last frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSummary {
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
}

impl From<&SimulationOutcome> for OutcomeSummary {
    fn from(outcome: &SimulationOutcome) -> Self {
        Self {
            trigger_id: outcome.trigger_id.clone(),
            patient_zero: outcome.patient_zero.clone(),
            impacted: outcome.impacted.clone(),
            termination: outcome.termination,
            systemic_damage: outcome.systemic_damage,
            warnings: outcome.warnings.clone(),
            narrative: outcome.narrative.clone(),
            narrative_error: outcome.narrative_error.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerResponse {
    HelloAck {
        server: String,
        version: u32,
        graph_id: String,
    },
    Snapshot {
        snapshot: GraphSnapshot,
    },
    Frame {
        frame: PropagationFrame,
    },
    Event {
        event: ContagionEvent,
    },
    Outcome {
        summary: OutcomeSummary,
    },
    Entity {
        entity_id: EntityId,
        entity: Option<NodeRecord>,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contagion::{ContagionEventKind, HealthStatus};

    #[test]
    fn viewer_request_uses_snake_case_tags() {
        let json = serde_json::to_string(&ViewerRequest::SetFilter {
            filter: RelationshipFilter::Financial,
        })
        .expect("serialize request");
        assert_eq!(json, r#"{"type":"set_filter","filter":"financial"}"#);

        let parsed: ViewerRequest =
            serde_json::from_str(r#"{"type":"resolve_entity","entity_id":"nvidia"}"#)
                .expect("deserialize request");
        assert_eq!(
            parsed,
            ViewerRequest::ResolveEntity {
                entity_id: "nvidia".to_string()
            }
        );

        let parsed: ViewerRequest =
            serde_json::from_str(r#"{"type":"reset"}"#).expect("deserialize reset");
        assert_eq!(parsed, ViewerRequest::Reset);
    }

    #[test]
    fn viewer_subscribe_round_trip() {
        let request = ViewerRequest::Subscribe {
            streams: vec![ViewerStream::Frames, ViewerStream::Outcome],
        };
        let json = serde_json::to_string(&request).expect("serialize subscribe");
        assert!(json.contains(r#""streams":["frames","outcome"]"#));
        let parsed: ViewerRequest = serde_json::from_str(&json).expect("deserialize subscribe");
        assert_eq!(parsed, request);
    }

    #[test]
    fn viewer_event_response_carries_tagged_kind() {
        let response = ViewerResponse::Event {
            event: ContagionEvent {
                id: 4,
                iteration: 1,
                kind: ContagionEventKind::StatusChanged {
                    entity_id: "x".to_string(),
                    from: HealthStatus::Healthy,
                    to: HealthStatus::Stressed,
                    health: 60.0,
                },
            },
        };
        let value = serde_json::to_value(&response).expect("serialize event");
        assert_eq!(value["type"], "event");
        assert_eq!(value["event"]["kind"]["type"], "status_changed");
        assert_eq!(value["event"]["kind"]["data"]["to"], "Stressed");
    }

    #[test]
    fn viewer_response_round_trip_error() {
        let response = ViewerResponse::Error {
            message: "boom".to_string(),
        };
        let json = serde_json::to_string(&response).expect("serialize response");
        let parsed: ViewerResponse = serde_json::from_str(&json).expect("deserialize response");
        assert_eq!(parsed, response);
    }
}
