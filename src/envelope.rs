//! Wire-format objects produced for every job.
//!
//! A [`ResultEnvelope`] is built once per job and never mutated afterwards;
//! the selected delivery channel decides which [`HandlerResponse`] variant the
//! invoking runtime receives.

use crate::errors::{ShimError, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Inference result
// ---------------------------------------------------------------------------

/// The shaped output of a model's `postprocess` hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    /// The model's answer.
    pub prediction: Value,

    /// Optional confidence in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Wall-clock seconds spent in preprocess, infer and postprocess.
    #[serde(default)]
    pub processing_time: f64,

    /// Model-specific fields carried alongside the prediction.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InferenceResult {
    pub fn new(prediction: impl Into<Value>) -> Self {
        Self {
            prediction: prediction.into(),
            confidence: None,
            processing_time: 0.0,
            extra: Map::new(),
        }
    }

    /// Set the confidence, clamped to `[0, 1]`. `NaN` clears it.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() {
            None
        } else {
            Some(confidence.clamp(0.0, 1.0))
        };
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Result envelope
// ---------------------------------------------------------------------------

/// Outcome of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Outcome of a signed-URL upload, reported synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Success,
    Failed,
}

/// The uniform object transmitted or returned for every job.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub status: Status,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<InferenceResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Machine-readable error code, see [`ShimError::code`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,

    /// Stage that failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Model diagnostics for a failed stage, see [`Model::error_context`](crate::Model::error_context).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_context: Option<Value>,

    /// Attached only when the envelope leaves through the callback channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl ResultEnvelope {
    pub fn success(output: InferenceResult) -> Self {
        Self {
            status: Status::Success,
            output: Some(output),
            error: None,
            error_type: None,
            stage: None,
            timestamp: None,
            model_context: None,
            job_id: None,
        }
    }

    pub fn failure(err: &ShimError) -> Self {
        Self {
            status: Status::Error,
            output: None,
            error: Some(err.to_string()),
            error_type: Some(err.code().to_string()),
            stage: err.stage(),
            timestamp: Some(Utc::now()),
            model_context: None,
            job_id: None,
        }
    }

    pub fn with_model_context(mut self, context: Option<Value>) -> Self {
        self.model_context = context;
        self
    }

    /// A copy of this envelope carrying the given job id.
    pub fn with_job_id(&self, job_id: Option<&str>) -> Self {
        Self {
            job_id: job_id.map(str::to_string),
            ..self.clone()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

// ---------------------------------------------------------------------------
// Synchronous responses
// ---------------------------------------------------------------------------

/// Returned to the runtime when the result went to a callback URL.
///
/// Independent of whether the POST succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgment {
    /// Always `"accepted"`.
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    pub message: String,
}

impl Acknowledgment {
    pub fn accepted(job_id: Option<String>) -> Self {
        Self {
            status: "accepted".to_string(),
            job_id,
            message: "result will be delivered to the callback URL".to_string(),
        }
    }
}

/// Returned to the runtime when the result went to a signed URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Status of the job itself, not of the upload.
    pub status: Status,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    pub gcs_upload: UploadStatus,
}

/// The single value handed back to the invoking runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HandlerResponse {
    /// Signed-URL-PUT: job status plus upload outcome.
    Uploaded(UploadReceipt),
    /// Callback-POST: a minimal acknowledgment.
    Accepted(Acknowledgment),
    /// Direct-Return: the full result envelope.
    Direct(ResultEnvelope),
}

impl HandlerResponse {
    /// Serialize into a JSON value for the runtime.
    pub fn to_value(&self) -> Value {
        // Every variant is a plain struct of JSON-compatible fields.
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({"status": "error", "error": format!("serialization error: {}", e)})
        })
    }

    /// The job status as seen by the synchronous caller, if the response carries one.
    pub fn status(&self) -> Option<Status> {
        match self {
            HandlerResponse::Direct(envelope) => Some(envelope.status),
            HandlerResponse::Uploaded(receipt) => Some(receipt.status),
            HandlerResponse::Accepted(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_wire_format() {
        let mut output = InferenceResult::new("positive").with_confidence(0.9);
        output.processing_time = 0.25;
        let value = serde_json::to_value(ResultEnvelope::success(output)).unwrap();

        assert_eq!(
            value,
            json!({
                "status": "success",
                "output": {"prediction": "positive", "confidence": 0.9, "processing_time": 0.25}
            })
        );
    }

    #[test]
    fn test_error_wire_format() {
        let envelope = ResultEnvelope::failure(&ShimError::Inference("out of memory".into()));
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "inference failed: out of memory");
        assert_eq!(value["error_type"], "inference_failed");
        assert_eq!(value["stage"], "inference");
        assert!(value.get("output").is_none());
        assert!(value.get("job_id").is_none());
        assert!(value.get("model_context").is_none());

        let value = serde_json::to_value(
            envelope.with_model_context(Some(json!({"input_type": "object"}))),
        )
        .unwrap();
        assert_eq!(value["model_context"]["input_type"], "object");
    }

    #[test]
    fn test_extra_fields_flatten() {
        let output = InferenceResult::new(json!([1, 2])).with_field("model", "tiny");
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["model"], "tiny");
        assert!(value.get("confidence").is_none());

        let parsed: InferenceResult = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.extra.get("model"), Some(&json!("tiny")));
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(InferenceResult::new(1).with_confidence(1.7).confidence, Some(1.0));
        assert_eq!(InferenceResult::new(1).with_confidence(-0.1).confidence, Some(0.0));
        assert_eq!(InferenceResult::new(1).with_confidence(f64::NAN).confidence, None);
    }

    #[test]
    fn test_with_job_id_does_not_mutate_original() {
        let envelope = ResultEnvelope::success(InferenceResult::new("x"));
        let tagged = envelope.with_job_id(Some("job-9"));
        assert_eq!(tagged.job_id.as_deref(), Some("job-9"));
        assert!(envelope.job_id.is_none());
    }

    #[test]
    fn test_handler_response_shapes() {
        let ack = HandlerResponse::Accepted(Acknowledgment::accepted(Some("j1".into())));
        let value = ack.to_value();
        assert_eq!(value["status"], "accepted");
        assert_eq!(value["job_id"], "j1");
        assert_eq!(ack.status(), None);

        let receipt = HandlerResponse::Uploaded(UploadReceipt {
            status: Status::Error,
            job_id: None,
            gcs_upload: UploadStatus::Failed,
        });
        assert_eq!(
            receipt.to_value(),
            json!({"status": "error", "gcs_upload": "failed"})
        );
        assert_eq!(receipt.status(), Some(Status::Error));
    }
}
