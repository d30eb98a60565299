use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

pub const ERR_INVALID_INPUT: &str = "invalid_input";
pub const ERR_PREPROCESS_FAILED: &str = "preprocess_failed";
pub const ERR_INFERENCE_FAILED: &str = "inference_failed";
pub const ERR_POSTPROCESS_FAILED: &str = "postprocess_failed";
pub const ERR_DELIVERY_FAILED: &str = "delivery_failed";
pub const ERR_INITIALIZATION_FAILED: &str = "initialization_failed";
pub const ERR_SERIALIZATION: &str = "serialization";
pub const ERR_TRANSPORT: &str = "transport";
pub const ERR_BUILDER: &str = "builder";

// ---------------------------------------------------------------------------
// Pipeline stage
// ---------------------------------------------------------------------------

/// The point in a job's lifecycle where a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Job envelope validation and directive extraction.
    Input,
    /// Model `preprocess` hook.
    Preprocess,
    /// Model `infer` hook.
    Inference,
    /// Model `postprocess` hook.
    Postprocess,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Input => "input",
            Stage::Preprocess => "preprocess",
            Stage::Inference => "inference",
            Stage::Postprocess => "postprocess",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Main error type
// ---------------------------------------------------------------------------

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShimError {
    /// The job envelope is malformed or a delivery directive is not a valid URL.
    #[error("invalid input: {0}")]
    Input(String),

    /// The model's `preprocess` hook rejected the input.
    #[error("preprocess failed: {0}")]
    Preprocess(String),

    /// The model's `infer` hook failed.
    #[error("inference failed: {0}")]
    Inference(String),

    /// The model's `postprocess` hook could not shape the raw output.
    #[error("postprocess failed: {0}")]
    Postprocess(String),

    /// A callback POST or signed-URL PUT did not succeed.
    ///
    /// Never surfaced to the invoking runtime; downgraded to a status flag.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The model's one-time `initialize` hook failed. Fatal to the process.
    #[error("model initialization failed: {0}")]
    Initialization(String),

    /// Serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The HTTP client could not be constructed or the request never left.
    #[error("transport error: {0}")]
    Transport(String),

    /// Builder misconfiguration.
    #[error("builder error: {0}")]
    Builder(String),
}

impl ShimError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ShimError::Input(_) => ERR_INVALID_INPUT,
            ShimError::Preprocess(_) => ERR_PREPROCESS_FAILED,
            ShimError::Inference(_) => ERR_INFERENCE_FAILED,
            ShimError::Postprocess(_) => ERR_POSTPROCESS_FAILED,
            ShimError::Delivery(_) => ERR_DELIVERY_FAILED,
            ShimError::Initialization(_) => ERR_INITIALIZATION_FAILED,
            ShimError::Serialization(_) => ERR_SERIALIZATION,
            ShimError::Transport(_) => ERR_TRANSPORT,
            ShimError::Builder(_) => ERR_BUILDER,
        }
    }

    /// The job stage this error belongs to, if it is a job-level failure.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ShimError::Input(_) => Some(Stage::Input),
            ShimError::Preprocess(_) => Some(Stage::Preprocess),
            ShimError::Inference(_) => Some(Stage::Inference),
            ShimError::Postprocess(_) => Some(Stage::Postprocess),
            _ => None,
        }
    }

    /// Wrap a model hook failure in the variant for the stage that raised it.
    pub fn at_stage(stage: Stage, err: ModelError) -> Self {
        let message = err.0;
        match stage {
            Stage::Input => ShimError::Input(message),
            Stage::Preprocess => ShimError::Preprocess(message),
            Stage::Inference => ShimError::Inference(message),
            Stage::Postprocess => ShimError::Postprocess(message),
        }
    }
}

#[cfg(feature = "reqwest-transport")]
impl From<reqwest::Error> for ShimError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_status() || err.is_timeout() || err.is_connect() {
            ShimError::Delivery(err.to_string())
        } else {
            ShimError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ShimError {
    fn from(err: serde_json::Error) -> Self {
        ShimError::Serialization(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Model hook error
// ---------------------------------------------------------------------------

/// Error returned by a [`Model`](crate::Model) hook.
///
/// Carries only a message; the pipeline attaches the stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ModelError(pub String);

impl ModelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<String> for ModelError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for ModelError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Result type alias
// ---------------------------------------------------------------------------

pub type Result<T> = std::result::Result<T, ShimError>;
