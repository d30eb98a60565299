//! Delivery channels.
//!
//! Exactly one channel is selected per job, by a fixed priority over the
//! job's directives:
//!
//! 1. `gcs_signed_url` present: [`DeliveryChannel::SignedUrl`]
//! 2. else `callback_url` present: [`DeliveryChannel::Callback`]
//! 3. else: [`DeliveryChannel::Direct`]
//!
//! Channel failures never propagate. They are logged and, for the signed-URL
//! channel, surfaced as `gcs_upload: "failed"` in the synchronous response.
//! Every send is cut off after [`HandlerConfig::delivery_timeout`], whatever
//! the transport.

use crate::config::HandlerConfig;
use crate::envelope::{Acknowledgment, HandlerResponse, ResultEnvelope, UploadReceipt, UploadStatus};
use crate::errors::ShimError;
use crate::job::Directives;
use crate::transport::{DeliveryRequest, DynTransport, Method};
use std::fmt;
use std::time::Duration;
use url::Url;

/// The mechanism that carries a job's result envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryChannel {
    /// Return the envelope as the handler's result. No I/O.
    Direct,
    /// POST the envelope, with `job_id`, to the callback URL.
    Callback(Url),
    /// PUT the envelope to a pre-signed object-storage URL.
    SignedUrl(Url),
}

impl DeliveryChannel {
    /// Pick the channel for a job. First match wins.
    pub fn select(directives: &Directives) -> Self {
        if let Some(url) = &directives.signed_url {
            DeliveryChannel::SignedUrl(url.clone())
        } else if let Some(url) = &directives.callback_url {
            DeliveryChannel::Callback(url.clone())
        } else {
            DeliveryChannel::Direct
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeliveryChannel::Direct => "direct",
            DeliveryChannel::Callback(_) => "callback",
            DeliveryChannel::SignedUrl(_) => "signed_url",
        }
    }

    /// Send `envelope` through this channel and build the synchronous response.
    ///
    /// Never fails: transport errors are logged and folded into the response.
    pub async fn deliver(
        &self,
        envelope: &ResultEnvelope,
        job_id: Option<&str>,
        transport: &DynTransport,
        config: &HandlerConfig,
    ) -> HandlerResponse {
        match self {
            DeliveryChannel::Direct => HandlerResponse::Direct(envelope.clone()),

            DeliveryChannel::Callback(url) => {
                let body = envelope.with_job_id(job_id);
                let mut request = DeliveryRequest::new(Method::Post, url.clone(), to_json(&body));
                if let Some(token) = &config.callback_token {
                    request = request.header("Authorization", format!("Bearer {}", token));
                }
                let request = with_config_headers(request, config);

                if let Err(e) = send_bounded(transport, request, config.delivery_timeout).await {
                    tracing::warn!(
                        job_id = job_id.unwrap_or("unknown"),
                        channel = self.name(),
                        url = %redact(url),
                        error = %e,
                        "callback delivery failed"
                    );
                } else {
                    tracing::debug!(
                        job_id = job_id.unwrap_or("unknown"),
                        channel = self.name(),
                        "callback delivered"
                    );
                }

                HandlerResponse::Accepted(Acknowledgment::accepted(job_id.map(str::to_string)))
            }

            DeliveryChannel::SignedUrl(url) => {
                let request = DeliveryRequest::new(Method::Put, url.clone(), to_json(envelope))
                    .header("Cache-Control", "no-cache");
                let request = with_config_headers(request, config);

                let gcs_upload = match send_bounded(transport, request, config.delivery_timeout).await {
                    Ok(()) => {
                        tracing::debug!(
                            job_id = job_id.unwrap_or("unknown"),
                            channel = self.name(),
                            "signed-URL upload succeeded"
                        );
                        UploadStatus::Success
                    }
                    Err(e) => {
                        tracing::warn!(
                            job_id = job_id.unwrap_or("unknown"),
                            channel = self.name(),
                            url = %redact(url),
                            error = %e,
                            "signed-URL upload failed"
                        );
                        UploadStatus::Failed
                    }
                };

                HandlerResponse::Uploaded(UploadReceipt {
                    status: envelope.status,
                    job_id: job_id.map(str::to_string),
                    gcs_upload,
                })
            }
        }
    }
}

impl fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

async fn send_bounded(
    transport: &DynTransport,
    request: DeliveryRequest,
    timeout: Duration,
) -> crate::Result<()> {
    match tokio::time::timeout(timeout, transport.send(request)).await {
        Ok(result) => result,
        Err(_) => Err(ShimError::Delivery(format!(
            "no response within {}ms",
            timeout.as_millis()
        ))),
    }
}

/// Content-Type is owned by the transport.
fn with_config_headers(mut request: DeliveryRequest, config: &HandlerConfig) -> DeliveryRequest {
    for (key, value) in &config.headers {
        if key.eq_ignore_ascii_case("content-type") {
            continue;
        }
        request = request.header(key.clone(), value.clone());
    }
    request
}

fn to_json(envelope: &ResultEnvelope) -> serde_json::Value {
    serde_json::to_value(envelope).unwrap_or_else(|e| {
        let err = ShimError::Serialization(e.to_string());
        serde_json::to_value(ResultEnvelope::failure(&err)).unwrap_or_default()
    })
}

/// Strip the query string so signatures and tokens stay out of the logs.
fn redact(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
