use serverless_infer::errors::{
    ERR_DELIVERY_FAILED, ERR_INFERENCE_FAILED, ERR_INITIALIZATION_FAILED, ERR_INVALID_INPUT,
};
use serverless_infer::{ModelError, ShimError, Stage};

// ---------------------------------------------------------------------------
// ShimError variant tests
// ---------------------------------------------------------------------------

#[test]
fn test_input_error_display() {
    let err = ShimError::Input("no input data provided".into());
    assert_eq!(err.to_string(), "invalid input: no input data provided");
    assert_eq!(err.code(), ERR_INVALID_INPUT);
    assert_eq!(err.stage(), Some(Stage::Input));
}

#[test]
fn test_stage_errors_name_their_stage() {
    let cases = [
        (Stage::Preprocess, "preprocess failed: bad image"),
        (Stage::Inference, "inference failed: bad image"),
        (Stage::Postprocess, "postprocess failed: bad image"),
    ];

    for (stage, expected) in cases {
        let err = ShimError::at_stage(stage, ModelError::new("bad image"));
        assert_eq!(err.to_string(), expected);
        assert_eq!(err.stage(), Some(stage));
    }
}

#[test]
fn test_inference_error_code() {
    let err = ShimError::Inference("OOM".into());
    assert_eq!(err.code(), ERR_INFERENCE_FAILED);
}

#[test]
fn test_delivery_error_has_no_stage() {
    let err = ShimError::Delivery("HTTP 500".into());
    assert_eq!(err.to_string(), "delivery failed: HTTP 500");
    assert_eq!(err.code(), ERR_DELIVERY_FAILED);
    assert_eq!(err.stage(), None);
}

#[test]
fn test_initialization_error_display() {
    let err = ShimError::Initialization("weights not found".into());
    assert_eq!(
        err.to_string(),
        "model initialization failed: weights not found"
    );
    assert_eq!(err.code(), ERR_INITIALIZATION_FAILED);
}

#[test]
fn test_serialization_error_from_serde() {
    let serde_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
    let err = ShimError::from(serde_err);
    assert!(err.to_string().starts_with("serialization error:"));
}

#[test]
fn test_model_error_conversions() {
    assert_eq!(ModelError::from("x").message(), "x");
    assert_eq!(ModelError::from(String::from("y")).to_string(), "y");
}

#[test]
fn test_stage_serializes_lowercase() {
    assert_eq!(
        serde_json::to_value(Stage::Postprocess).unwrap(),
        serde_json::json!("postprocess")
    );
}
