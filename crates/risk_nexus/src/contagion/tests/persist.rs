use super::*;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_path(label: &str) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("risk-nexus-{label}-{unique}.json"))
}

#[test]
fn authored_document_imports_with_defaults() {
    let raw = r#"{
        "nodes": [
            {"id": "lab", "name": "Lab", "type": "Model Lab", "valuation": 18, "cashReserve": 5,
             "currentHealth": 100, "status": "Healthy", "description": "Safety lab", "color": "blue"},
            {"id": "fund", "name": "Fund", "type": "VC / Holding", "cashReserve": 3},
            {"id": "odd", "name": "Odd", "type": "Quantum Startup", "currentHealth": 30}
        ],
        "relationships": [
            {"source": "fund", "target": "lab", "weight": 2, "type": "investment"},
            {"source": "lab", "target": "odd", "value": 1, "type": "partnership"}
        ]
    }"#;
    let snapshot = GraphDocument::from_json(raw).unwrap().into_snapshot().unwrap();

    let lab = snapshot.entity("lab").unwrap();
    assert_eq!(lab.kind, EntityKind::ModelLab);
    assert_eq!(lab.description.as_deref(), Some("Safety lab"));

    let fund = snapshot.entity("fund").unwrap();
    assert_eq!(fund.kind, EntityKind::Investor);
    assert_eq!(fund.valuation, 0.0);
    assert_eq!((fund.health, fund.status), (100.0, HealthStatus::Healthy));

    // unknown kinds fall back; a missing status follows health
    let odd = snapshot.entity("odd").unwrap();
    assert_eq!(odd.kind, EntityKind::Application);
    assert_eq!((odd.health, odd.status), (30.0, HealthStatus::Stressed));

    assert_eq!(snapshot.relationships()[0].weight, 2.0);
    assert_eq!(snapshot.relationships()[1].kind, RelationshipKind::Partnership);
}

#[test]
fn document_with_duplicate_ids_is_rejected() {
    let raw = r#"{"nodes":[{"id":"a","name":"A"},{"id":"a","name":"B"}],"links":[]}"#;
    let err = GraphDocument::from_json(raw)
        .unwrap()
        .into_snapshot()
        .unwrap_err();
    assert_eq!(err, PersistError::Graph("duplicate entity id: a".to_string()));

    assert!(serde_json::from_str::<GraphSnapshot>(raw).is_err());
}

#[test]
fn unknown_relationship_kind_is_a_serde_error() {
    let raw = r#"{"nodes":[],"links":[{"source":"a","target":"b","type":"loan"}]}"#;
    assert!(matches!(
        GraphDocument::from_json(raw),
        Err(PersistError::Serde(_))
    ));
}

#[test]
fn snapshot_document_uses_camel_case_fields() {
    let snapshot = investment_pair(10.0);
    let value = serde_json::to_value(&snapshot).unwrap();

    assert_eq!(value["nodes"][0]["cashReserve"], 10.0);
    assert_eq!(value["nodes"][0]["currentHealth"], 100.0);
    assert_eq!(value["nodes"][0]["type"], "Application");
    assert_eq!(value["links"][0]["type"], "investment");
    assert_eq!(value["links"][0]["value"], 5.0);

    let parsed: GraphSnapshot = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, snapshot);
}

#[test]
fn snapshot_survives_a_file_round_trip_mid_cascade() {
    let run = propagate(
        &Scenario::DependencyFan.build().unwrap(),
        "foundry",
        &PropagationConfig::default(),
    )
    .unwrap();
    let path = temp_path("graph");

    save_snapshot(&run.final_snapshot, &path).unwrap();
    let loaded = load_snapshot(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(loaded, run.final_snapshot);
    assert_eq!(loaded.fingerprint(), run.final_snapshot.fingerprint());
}

#[test]
fn missing_graph_file_is_an_io_error() {
    let path = temp_path("missing");
    assert!(matches!(load_snapshot(&path), Err(PersistError::Io(_))));
}

#[test]
fn report_round_trips_through_a_file() {
    let controller = SimulationController::new(
        investment_pair(0.0),
        ControllerConfig::default(),
        DisabledNarrative,
    );
    let outcome = controller.simulate("y", &mut NoopObserver).unwrap();
    let report = SimulationReport::from_outcome(&outcome);
    assert_eq!(report.version, REPORT_VERSION);
    assert_eq!(report.warnings.len(), 1);

    let path = temp_path("report");
    report.save_json(&path).unwrap();
    let loaded = SimulationReport::load_json(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(loaded, report);
    assert_eq!(
        loaded.final_graph.into_snapshot().unwrap(),
        outcome.final_snapshot
    );
}

#[test]
fn report_from_a_newer_version_is_rejected() {
    let controller = SimulationController::new(
        investment_pair(10.0),
        ControllerConfig::default(),
        DisabledNarrative,
    );
    let outcome = controller.simulate("y", &mut NoopObserver).unwrap();
    let mut value = serde_json::to_value(SimulationReport::from_outcome(&outcome)).unwrap();
    value["version"] = serde_json::json!(2);

    let err = SimulationReport::from_json(&value.to_string()).unwrap_err();
    assert_eq!(
        err,
        PersistError::UnsupportedVersion {
            kind: "report".to_string(),
            version: 2,
            expected: REPORT_VERSION,
        }
    );

    // a missing version is read as the current one
    value
        .as_object_mut()
        .unwrap()
        .remove("version");
    assert!(SimulationReport::from_json(&value.to_string()).is_ok());
}
