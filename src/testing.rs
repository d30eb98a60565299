//! Test doubles for exercising a [`Handler`](crate::Handler) without a network
//! or a real model.
//!
//! # Usage
//!
//! ```rust
//! use serverless_infer::testing::{FnModel, RecordingTransport};
//! use serverless_infer::{Handler, HandlerConfig};
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let transport = RecordingTransport::new();
//! let handler = Handler::builder()
//!     .model(FnModel::new(|input: Value| async move { Ok(input) }))
//!     .transport(Arc::new(transport.clone()))
//!     .config(HandlerConfig::new())
//!     .build()
//!     .unwrap();
//!
//! handler
//!     .handle_value(json!({"input": {"x": 1}, "callback_url": "https://x/hook"}))
//!     .await
//!     .unwrap();
//!
//! assert_eq!(transport.requests().len(), 1);
//! # }
//! ```

use crate::errors::ShimError;
use crate::model::{Model, ModelResult};
use crate::transport::{BoxFuture, DeliveryRequest, Transport};
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Recording transport
// ---------------------------------------------------------------------------

/// In-memory transport that records every request.
///
/// Succeeds by default; call [`RecordingTransport::fail_with`] to make every
/// subsequent request fail.
#[derive(Clone, Debug, Default)]
pub struct RecordingTransport {
    inner: Arc<Mutex<RecordingInner>>,
}

#[derive(Debug, Default)]
struct RecordingInner {
    requests: Vec<DeliveryRequest>,
    failure: Option<String>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose requests all fail with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        let transport = Self::new();
        transport.fail_with(message);
        transport
    }

    pub fn fail_with(&self, message: impl Into<String>) {
        self.lock().failure = Some(message.into());
    }

    pub fn succeed(&self) {
        self.lock().failure = None;
    }

    /// Every request sent so far, including failed ones.
    pub fn requests(&self) -> Vec<DeliveryRequest> {
        self.lock().requests.clone()
    }

    pub fn clear(&self) {
        self.lock().requests.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecordingInner> {
        // A panicking test thread must not hide the requests from the rest.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Transport for RecordingTransport {
    fn send(&self, request: DeliveryRequest) -> BoxFuture<'_, crate::Result<()>> {
        let result = {
            let mut inner = self.lock();
            inner.requests.push(request);
            match &inner.failure {
                Some(message) => Err(ShimError::Delivery(message.clone())),
                None => Ok(()),
            }
        };
        Box::pin(async move { result })
    }
}

// ---------------------------------------------------------------------------
// Closure-backed model
// ---------------------------------------------------------------------------

type InferFn = Arc<dyn Fn(Value) -> BoxFuture<'static, ModelResult<Value>> + Send + Sync>;

/// A [`Model`] whose `infer` hook is a closure. Other hooks use the defaults.
#[derive(Clone)]
pub struct FnModel {
    infer: InferFn,
}

impl FnModel {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ModelResult<Value>> + Send + 'static,
    {
        Self {
            infer: Arc::new(move |input| Box::pin(f(input))),
        }
    }
}

#[async_trait::async_trait]
impl Model for FnModel {
    async fn infer(&self, input: Value) -> ModelResult<Value> {
        (self.infer)(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Method;
    use serde_json::json;
    use url::Url;

    fn request() -> DeliveryRequest {
        DeliveryRequest::new(
            Method::Post,
            Url::parse("https://x/hook").unwrap(),
            json!({"status": "success"}),
        )
    }

    #[tokio::test]
    async fn test_recording_transport_records_and_fails() {
        let transport = RecordingTransport::new();
        assert!(transport.send(request()).await.is_ok());

        transport.fail_with("connection refused");
        let err = transport.send(request()).await.unwrap_err();
        assert_eq!(err, ShimError::Delivery("connection refused".into()));

        assert_eq!(transport.requests().len(), 2);
        transport.clear();
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_fn_model_uses_default_hooks() {
        let model = FnModel::new(|input: Value| async move { Ok(input["n"].clone()) });
        let result = crate::pipeline::run(&model, json!({"n": 3}).as_object().unwrap().clone())
            .await
            .unwrap();
        assert_eq!(result.prediction, json!(3));
    }
}
