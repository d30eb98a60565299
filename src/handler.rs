//! The job entry point.
//!
//! A [`Handler`] owns the shared model slot, the delivery transport and the
//! delivery config. The invoking runtime calls [`Handler::handle`] once per
//! job; every job walks the same state machine:
//!
//! ```text
//! RECEIVED -> PROCESSING -> { SUCCEEDED | FAILED } -> DELIVERED
//! ```
//!
//! Every job ends `DELIVERED`. Job-level failures become an error
//! [`ResultEnvelope`] sent through the channel the directives select; an
//! envelope whose directives cannot be read falls back to direct return.
//! The only error that escapes is a failed model initialization.

use crate::config::HandlerConfig;
use crate::delivery::DeliveryChannel;
use crate::envelope::{HandlerResponse, ResultEnvelope};
use crate::errors::{Result, ShimError};
use crate::job::JobEnvelope;
use crate::model::{Model, ModelSlot};
use crate::pipeline;
use crate::transport::DynTransport;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

// ---------------------------------------------------------------------------
// Job state
// ---------------------------------------------------------------------------

/// Lifecycle state of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Received,
    Processing,
    Succeeded,
    Failed,
    Delivered,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Received => "received",
            JobState::Processing => "processing",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Delivered => "delivered",
        }
    }

    /// Returns `true` if `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Received, JobState::Processing)
                | (JobState::Received, JobState::Failed)
                | (JobState::Processing, JobState::Succeeded)
                | (JobState::Processing, JobState::Failed)
                | (JobState::Succeeded, JobState::Delivered)
                | (JobState::Failed, JobState::Delivered)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Tracker {
    state: JobState,
}

impl Tracker {
    fn new() -> Self {
        tracing::debug!(state = %JobState::Received, "job state");
        Self {
            state: JobState::Received,
        }
    }

    fn advance(&mut self, next: JobState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal job transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, state = %next, "job state");
        self.state = next;
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`Handler`].
pub struct HandlerBuilder {
    model: Option<Arc<dyn Model>>,
    transport: Option<DynTransport>,
    config: Option<HandlerConfig>,
}

impl HandlerBuilder {
    fn new() -> Self {
        Self {
            model: None,
            transport: None,
            config: None,
        }
    }

    /// Set the model that serves every job.
    pub fn model(mut self, model: impl Model) -> Self {
        self.model = Some(Arc::new(model));
        self
    }

    /// Set an already shared model.
    pub fn model_arc(mut self, model: Arc<dyn Model>) -> Self {
        self.model = Some(model);
        self
    }

    /// Provide a custom transport. Defaults to [`HttpTransport`](crate::transport::HttpTransport).
    pub fn transport(mut self, transport: DynTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set delivery config. Defaults to [`HandlerConfig::from_env`].
    pub fn config(mut self, config: HandlerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the handler.
    pub fn build(self) -> Result<Handler> {
        let model = self
            .model
            .ok_or_else(|| ShimError::Builder("model is required".into()))?;
        let config = self.config.unwrap_or_else(HandlerConfig::from_env);

        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(&config)?,
        };

        Ok(Handler {
            model: Arc::new(ModelSlot::from_arc(model)),
            transport,
            config: Arc::new(config),
        })
    }
}

#[cfg(feature = "reqwest-transport")]
fn default_transport(config: &HandlerConfig) -> Result<DynTransport> {
    Ok(Arc::new(crate::transport::HttpTransport::new(config)?))
}

#[cfg(not(feature = "reqwest-transport"))]
fn default_transport(_config: &HandlerConfig) -> Result<DynTransport> {
    Err(ShimError::Builder(
        "transport is required without the reqwest-transport feature".into(),
    ))
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Runs one job per call and delivers its result.
///
/// `Handler` is cheap to clone and `Send + Sync`; share it across concurrent
/// invocations. The model is initialized at most once for all clones.
///
/// # Example
///
/// ```rust,no_run
/// use serverless_infer::{Handler, Model, ModelResult};
/// use serde_json::{json, Value};
///
/// struct Echo;
///
/// #[async_trait::async_trait]
/// impl Model for Echo {
///     async fn infer(&self, input: Value) -> ModelResult<Value> {
///         Ok(input["text"].clone())
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() -> serverless_infer::Result<()> {
/// let handler = Handler::new(Echo)?;
/// handler.initialize().await?;
///
/// let response = handler.handle_value(json!({"input": {"text": "hello"}})).await?;
/// println!("{}", response.to_value());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Handler {
    model: Arc<ModelSlot>,
    transport: DynTransport,
    config: Arc<HandlerConfig>,
}

impl Handler {
    pub fn builder() -> HandlerBuilder {
        HandlerBuilder::new()
    }

    /// Build a handler with the default transport and environment config.
    pub fn new(model: impl Model) -> Result<Self> {
        Self::builder().model(model).build()
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Initialize the model now instead of on the first job.
    ///
    /// Call this at process start so a broken model fails before any job is
    /// accepted.
    pub async fn initialize(&self) -> Result<()> {
        self.model.ready().await.map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        self.model.is_initialized()
    }

    /// Process a job from its JSON text.
    pub async fn handle_raw(&self, raw: &str) -> Result<HandlerResponse> {
        match JobEnvelope::from_json(raw) {
            Ok(envelope) => self.handle(envelope).await,
            Err(e) => self.reject(e, None).await,
        }
    }

    /// Process a job from a JSON value.
    pub async fn handle_value(&self, value: Value) -> Result<HandlerResponse> {
        match JobEnvelope::from_value(value) {
            Ok(envelope) => self.handle(envelope).await,
            Err(e) => self.reject(e, None).await,
        }
    }

    /// Process one job and deliver its result.
    ///
    /// Returns `Err` only for [`ShimError::Initialization`]. Every other
    /// failure is reported inside the returned [`HandlerResponse`].
    pub async fn handle(&self, envelope: JobEnvelope) -> Result<HandlerResponse> {
        let job_id = envelope.job_id();
        let span = tracing::info_span!("job", job_id = job_id.as_deref().unwrap_or("unknown"));
        self.process(envelope, job_id).instrument(span).await
    }

    async fn process(&self, envelope: JobEnvelope, job_id: Option<String>) -> Result<HandlerResponse> {
        let model = self.model.ready().await?;
        let mut tracker = Tracker::new();

        let job = match envelope.normalize() {
            Ok(job) => job,
            Err(e) => {
                // A bad payload still leaves through a valid directive; a bad directive cannot.
                let channel = envelope
                    .directives()
                    .map(|directives| DeliveryChannel::select(&directives))
                    .unwrap_or(DeliveryChannel::Direct);
                tracing::error!(channel = channel.name(), error = %e, "invalid job envelope");
                tracker.advance(JobState::Failed);
                let response = self
                    .deliver(&channel, &ResultEnvelope::failure(&e), job_id.as_deref())
                    .await;
                tracker.advance(JobState::Delivered);
                return Ok(response);
            }
        };
        let channel = DeliveryChannel::select(&job.directives);

        tracker.advance(JobState::Processing);
        let result = match pipeline::run(model, job.input).await {
            Ok(output) => {
                tracker.advance(JobState::Succeeded);
                tracing::info!(
                    processing_time = output.processing_time,
                    "inference completed"
                );
                ResultEnvelope::success(output)
            }
            Err(failure) => {
                tracker.advance(JobState::Failed);
                tracing::error!(
                    stage = failure.error.stage().map_or("unknown", |s| s.as_str()),
                    error = %failure.error,
                    "job processing failed"
                );
                ResultEnvelope::failure(&failure.error).with_model_context(failure.model_context)
            }
        };

        let response = self.deliver(&channel, &result, job_id.as_deref()).await;
        tracker.advance(JobState::Delivered);

        Ok(response)
    }

    async fn reject(&self, err: ShimError, job_id: Option<&str>) -> Result<HandlerResponse> {
        self.model.ready().await?;
        tracing::error!(error = %err, "rejected job envelope");
        Ok(self
            .deliver(&DeliveryChannel::Direct, &ResultEnvelope::failure(&err), job_id)
            .await)
    }

    async fn deliver(
        &self,
        channel: &DeliveryChannel,
        envelope: &ResultEnvelope,
        job_id: Option<&str>,
    ) -> HandlerResponse {
        let response = channel
            .deliver(envelope, job_id, &self.transport, &self.config)
            .await;
        tracing::info!(
            channel = channel.name(),
            success = envelope.is_success(),
            "job delivered"
        );
        response
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("model", &self.model)
            .field("transport", &self.transport)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Status, UploadStatus};
    use crate::errors::ModelError;
    use crate::model::ModelResult;
    use crate::testing::{FnModel, RecordingTransport};
    use crate::transport::Method;
    use serde_json::json;

    fn echo() -> FnModel {
        FnModel::new(|input: Value| async move {
            let text = input["text"].as_str().ok_or("missing text")?;
            Ok::<_, ModelError>(json!(format!("echo: {}", text)))
        })
    }

    fn handler(model: impl Model, transport: &RecordingTransport) -> Handler {
        Handler::builder()
            .model(model)
            .transport(Arc::new(transport.clone()))
            .config(HandlerConfig::new())
            .build()
            .unwrap()
    }

    #[test]
    fn test_job_state_transitions() {
        assert!(JobState::Received.can_transition_to(JobState::Processing));
        assert!(JobState::Received.can_transition_to(JobState::Failed));
        assert!(JobState::Failed.can_transition_to(JobState::Delivered));
        assert!(!JobState::Received.can_transition_to(JobState::Delivered));
        assert!(!JobState::Delivered.can_transition_to(JobState::Received));
        assert!(!JobState::Succeeded.can_transition_to(JobState::Failed));
    }

    #[test]
    fn test_builder_requires_model() {
        let err = Handler::builder().build().unwrap_err();
        assert_eq!(err.to_string(), "builder error: model is required");
    }

    #[tokio::test]
    async fn test_direct_success() {
        let transport = RecordingTransport::new();
        let handler = handler(echo(), &transport);

        let response = handler
            .handle_value(json!({"input": {"text": "hello"}}))
            .await
            .unwrap();

        let HandlerResponse::Direct(envelope) = response else {
            panic!("expected direct response");
        };
        assert_eq!(envelope.status, Status::Success);
        assert_eq!(envelope.output.unwrap().prediction, json!("echo: hello"));
        assert!(envelope.job_id.is_none());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_directive_falls_back_to_direct() {
        let transport = RecordingTransport::new();
        let handler = handler(echo(), &transport);

        let response = handler
            .handle_value(json!({"input": {"text": "hi"}, "callback_url": "nope"}))
            .await
            .unwrap();

        let HandlerResponse::Direct(envelope) = response else {
            panic!("expected direct response");
        };
        assert_eq!(envelope.status, Status::Error);
        assert_eq!(envelope.error_type.as_deref(), Some("invalid_input"));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_stage_failure_goes_through_selected_channel() {
        let transport = RecordingTransport::new();
        let model = FnModel::new(|_input: Value| async move {
            Err::<Value, _>(ModelError::new("CUDA out of memory"))
        });
        let handler = handler(model, &transport);

        let response = handler
            .handle_value(json!({
                "id": "job-7",
                "input": {"text": "hi"},
                "gcs_signed_url": "https://storage/obj?sig=1",
            }))
            .await
            .unwrap();

        let HandlerResponse::Uploaded(receipt) = response else {
            panic!("expected upload receipt");
        };
        assert_eq!(receipt.status, Status::Error);
        assert_eq!(receipt.gcs_upload, UploadStatus::Success);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Put);
        assert_eq!(requests[0].body["status"], "error");
        assert_eq!(requests[0].body["stage"], "inference");
        assert_eq!(
            requests[0].body["error"],
            "inference failed: CUDA out of memory"
        );
        assert_eq!(requests[0].body["model_context"]["stage"], "inference");
    }

    #[tokio::test]
    async fn test_initialize_failure_escapes() {
        struct Broken;

        #[async_trait::async_trait]
        impl Model for Broken {
            async fn initialize(&self) -> ModelResult<()> {
                Err(ModelError::new("no GPU"))
            }

            async fn infer(&self, input: Value) -> ModelResult<Value> {
                Ok(input)
            }
        }

        let transport = RecordingTransport::new();
        let handler = handler(Broken, &transport);

        assert!(handler.initialize().await.is_err());
        let err = handler
            .handle_value(json!({"input": {"text": "hi"}}))
            .await
            .unwrap_err();
        assert!(matches!(err, ShimError::Initialization(_)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_handle_raw_invalid_json() {
        let transport = RecordingTransport::new();
        let handler = handler(echo(), &transport);

        let response = handler.handle_raw("{oops").await.unwrap();
        assert_eq!(response.status(), Some(Status::Error));
    }

    #[tokio::test]
    async fn test_clones_share_initialization() {
        let transport = RecordingTransport::new();
        let handler = handler(echo(), &transport);
        let clone = handler.clone();

        assert!(!clone.is_initialized());
        handler.initialize().await.unwrap();
        assert!(clone.is_initialized());
    }
}
