use crate::envelope::InferenceResult;
use crate::errors::{ModelError, ShimError, Stage};
use crate::model::{FailureSite, Model};
use serde_json::{Map, Value};
use std::time::Instant;

/// A failed stage and the model's diagnostics for it.
#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub error: ShimError,
    pub model_context: Option<Value>,
}

impl StageFailure {
    fn new(model: &dyn Model, site: &FailureSite, err: ModelError) -> Self {
        let error = ShimError::at_stage(site.stage, err);
        let model_context = model.error_context(&error, site);
        Self {
            error,
            model_context,
        }
    }
}

/// Run `preprocess -> infer -> postprocess` for one job.
///
/// The first failing hook short-circuits the rest and is reported with its
/// stage. A `confidence` outside `[0, 1]` is a postprocess failure. On
/// success `processing_time` is overwritten with the wall-clock seconds spent
/// across all three hooks.
pub async fn run(model: &dyn Model, input: Map<String, Value>) -> Result<InferenceResult, StageFailure> {
    let start = Instant::now();

    tracing::debug!(stage = %Stage::Preprocess, "stage started");
    let site = FailureSite::of_map(Stage::Preprocess, &input);
    let processed = model
        .preprocess(input)
        .await
        .map_err(|e| StageFailure::new(model, &site, e))?;

    tracing::debug!(stage = %Stage::Inference, "stage started");
    let site = FailureSite::new(Stage::Inference, &processed);
    let raw = model
        .infer(processed)
        .await
        .map_err(|e| StageFailure::new(model, &site, e))?;

    tracing::debug!(stage = %Stage::Postprocess, "stage started");
    let site = FailureSite::new(Stage::Postprocess, &raw);
    let mut result = model
        .postprocess(raw)
        .await
        .map_err(|e| StageFailure::new(model, &site, e))?;

    if let Some(confidence) = result.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            let err = ModelError::new(format!("confidence {} is outside [0, 1]", confidence));
            return Err(StageFailure::new(model, &site, err));
        }
    }

    result.processing_time = start.elapsed().as_secs_f64();
    Ok(result)
}
