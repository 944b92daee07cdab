use std::path::Path;

use anthropo_vision::{model, FaceDetector};

#[test]
fn missing_model_is_reported_with_path() {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = Path::new("models/does-not-exist.onnx");
    match model::session_from_file(path) {
        Ok(_) => panic!("loading a missing model should fail"),
        Err(e) => assert!(e.to_string().contains("does-not-exist.onnx")),
    }
}

#[test]
fn detector_construction_fails_without_model() {
    let result = FaceDetector::from_file(Path::new("models/missing-yunet.onnx"), 0.6, 0.3);
    let err = match result {
        Ok(_) => panic!("detector should not load without a model file"),
        Err(e) => e,
    };
    assert!(format!("{:#}", err).contains("missing-yunet.onnx"));
}
