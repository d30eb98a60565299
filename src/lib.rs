#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::trivially_copy_pass_by_ref)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::float_cmp)]
//! # serverless-infer
//!
//! A request-handling shim for serverless inference platforms. The platform's
//! runtime hands over one job envelope per invocation; the shim runs a
//! pluggable [`Model`] over the job's input and delivers the result through
//! exactly one channel:
//!
//! | Directive present | Channel            | Synchronous return              |
//! |-------------------|--------------------|---------------------------------|
//! | `gcs_signed_url`  | PUT to signed URL  | `{status, gcs_upload}`          |
//! | `callback_url`    | POST to callback   | `{status: "accepted", job_id}`  |
//! | neither           | direct return      | the full result envelope        |
//!
//! When both directives are present the signed URL wins. Failures in any
//! stage travel the same channel success would have, as
//! `{"status": "error", "error": "..."}`. Nothing but a failed model
//! initialization escapes [`Handler::handle`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serverless_infer::{Handler, Model, ModelResult};
//! use serde_json::{json, Value};
//!
//! struct Sentiment;
//!
//! #[async_trait::async_trait]
//! impl Model for Sentiment {
//!     async fn initialize(&self) -> ModelResult<()> {
//!         // load weights...
//!         Ok(())
//!     }
//!
//!     async fn infer(&self, input: Value) -> ModelResult<Value> {
//!         let text = input["text"].as_str().ok_or("text is required")?;
//!         Ok(json!({"prediction": if text.contains("good") { "positive" } else { "negative" }}))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> serverless_infer::Result<()> {
//! let handler = Handler::new(Sentiment)?;
//! handler.initialize().await?;
//!
//! let response = handler
//!     .handle_value(json!({"input": {"text": "good stuff"}}))
//!     .await?;
//! println!("{}", response.to_value());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod delivery;
pub mod envelope;
pub mod errors;
pub mod handler;
pub mod job;
pub mod model;
pub mod pipeline;
pub mod testing;
pub mod transport;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use config::HandlerConfig;
pub use delivery::DeliveryChannel;
pub use envelope::{
    Acknowledgment, HandlerResponse, InferenceResult, ResultEnvelope, Status, UploadReceipt,
    UploadStatus,
};
pub use errors::{ModelError, Result, ShimError, Stage};
pub use handler::{Handler, HandlerBuilder, JobState};
pub use job::{Directives, JobEnvelope, NormalizedJob};
pub use model::{FailureSite, Model, ModelResult, ModelSlot};
pub use transport::{DeliveryRequest, DynTransport, Method as TransportMethod, Transport};
