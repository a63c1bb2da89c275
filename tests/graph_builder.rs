mod common;

use std::time::Duration;

use common::*;
use visionflow::{Error, InferenceOutput, PipelineState};

#[test]
fn unresolved_upstream_reference_fails_and_leaves_registry_unchanged() {
    let registry = mock_registry();
    let mut config = face_pipeline("cam0", 0);
    config.infers[0].inputs = vec!["no-such-stage".to_string()];

    let err = registry.create_pipeline(config).unwrap_err();
    assert!(
        matches!(err, Error::UnresolvedReference { reference, .. } if reference == "no-such-stage")
    );
    assert!(registry.pipelines().is_empty());
}

#[test]
fn reference_cycle_is_detected() {
    let registry = mock_registry();
    let mut config = face_pipeline("cam0", 0);
    config.infers = vec![
        infer_stage("a", "FaceDetection", "det:a.xml", &["b"]),
        infer_stage("b", "ObjectDetection", "det:b.xml", &["a"]),
    ];

    let err = registry.create_pipeline(config).unwrap_err();
    match err {
        Error::CycleDetected(stages) => assert_eq!(stages, vec!["a", "b"]),
        other => panic!("expected cycle error, got {other}"),
    }
}

#[test]
fn self_reference_is_a_cycle() {
    let registry = mock_registry();
    let mut config = face_pipeline("cam0", 0);
    config.infers = vec![infer_stage("a", "FaceDetection", "det:a.xml", &["a"])];
    assert!(matches!(
        registry.create_pipeline(config),
        Err(Error::CycleDetected(_))
    ));
}

#[test]
fn unknown_task_tag_never_builds_a_noop_adapter() {
    let registry = mock_registry();
    let mut config = face_pipeline("cam0", 0);
    config.infers[0].task = "CrystalBallGazing".to_string();

    let err = registry.create_pipeline(config).unwrap_err();
    assert!(matches!(err, Error::UnsupportedTask(tag) if tag == "CrystalBallGazing"));
    assert!(registry.pipelines().is_empty());
}

#[test]
fn unknown_source_and_sink_kinds_fail() {
    let registry = mock_registry();

    let mut config = face_pipeline("cam0", 0);
    config.inputs[0].kind = "hologram".to_string();
    assert!(matches!(
        registry.create_pipeline(config),
        Err(Error::UnsupportedKind { context: "input source", .. })
    ));

    let mut config = face_pipeline("cam0", 0);
    config.outputs[0].kind = "telepathy".to_string();
    assert!(matches!(
        registry.create_pipeline(config),
        Err(Error::UnsupportedKind { context: "output sink", .. })
    ));
}

#[test]
fn duplicate_stage_names_are_rejected() {
    let registry = mock_registry();
    let mut config = face_pipeline("cam0", 0);
    config.infers = vec![
        infer_stage("faces", "FaceDetection", "det:a.xml", &[]),
        infer_stage("faces", "ObjectDetection", "det:b.xml", &[]),
    ];
    assert!(matches!(
        registry.create_pipeline(config),
        Err(Error::InvalidParams { .. })
    ));
}

#[test]
fn engine_init_failure_surfaces_at_build_time() {
    let registry = mock_registry();
    let mut config = face_pipeline("cam0", 0);
    config.infers[0].device = "BROKEN".to_string();

    let err = registry.create_pipeline(config).unwrap_err();
    assert!(matches!(err, Error::EngineInit { device, .. } if device == "BROKEN"));
    assert!(registry.pipelines().is_empty());
}

#[test]
fn chained_stages_run_on_upstream_regions() {
    let (registry, results) = registry_with_collector();
    let mut config = chained_pipeline("cam0", 3);
    config.outputs[0].kind = "collect".to_string();
    registry.create_pipeline(config).unwrap();

    registry.run_all();
    assert!(wait_for(Duration::from_secs(5), || {
        registry.join_all();
        registry.state_of("cam0") == PipelineState::Stopped
    }));

    let delivered: Vec<_> = results.try_iter().collect();
    assert_eq!(delivered.len(), 3);
    for frame_results in &delivered {
        let faces = frame_results.output_for("faces").unwrap();
        let ages = frame_results.output_for("age").unwrap();
        let face_count = match faces {
            InferenceOutput::Detections(dets) => {
                assert!(!dets.is_empty());
                dets.len()
            }
            other => panic!("face stage produced {other:?}"),
        };
        // One attribute set per upstream face region.
        match ages {
            InferenceOutput::Attributes(attrs) => assert_eq!(attrs.len(), face_count),
            other => panic!("age stage produced {other:?}"),
        }
    }
}

#[test]
fn stages_without_upstream_run_on_the_whole_frame() {
    let (registry, results) = registry_with_collector();
    let mut config = face_pipeline("cam0", 1);
    config.outputs[0].kind = "collect".to_string();
    registry.create_pipeline(config).unwrap();

    registry.run_all();
    assert!(wait_for(Duration::from_secs(5), || {
        registry.join_all();
        registry.state_of("cam0") == PipelineState::Stopped
    }));

    let frame_results = results.recv_timeout(Duration::from_secs(1)).unwrap();
    match frame_results.output_for("faces").unwrap() {
        InferenceOutput::Detections(dets) => assert_eq!(dets.len(), 1),
        other => panic!("unexpected output {other:?}"),
    }
}
