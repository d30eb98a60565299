#[cfg(feature = "reqwest-transport")]
pub(crate) mod http;

#[cfg(feature = "reqwest-transport")]
pub use self::http::HttpTransport;

use serde_json::Value;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use url::Url;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A boxed future returned by transports.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// HTTP method for delivery requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// One outbound delivery: a JSON body sent to an absolute URL.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRequest {
    pub method: Method,
    pub url: Url,
    pub body: Value,
    /// Headers in addition to `Content-Type: application/json`.
    pub headers: Vec<(String, String)>,
}

impl DeliveryRequest {
    pub fn new(method: Method, url: Url, body: Value) -> Self {
        Self {
            method,
            url,
            body,
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Value of the first header with this name, compared case-insensitively.
    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// The HTTP client seam used by delivery channels.
///
/// This trait is object-safe and uses `Pin<Box<dyn Future>>` for async support.
/// The default implementation, [`HttpTransport`], uses reqwest (enabled via the
/// `reqwest-transport` feature). Implementations send the body as JSON with
/// `Content-Type: application/json`, make exactly one attempt, and return
/// [`ShimError::Delivery`](crate::ShimError::Delivery) for a non-2xx response.
///
/// # Example
///
/// ```rust
/// use serverless_infer::transport::{BoxFuture, DeliveryRequest, Transport};
///
/// #[derive(Debug)]
/// struct Discard;
///
/// impl Transport for Discard {
///     fn send(&self, _request: DeliveryRequest) -> BoxFuture<'_, serverless_infer::Result<()>> {
///         Box::pin(async { Ok(()) })
///     }
/// }
/// ```
pub trait Transport: Send + Sync + Debug {
    fn send(&self, request: DeliveryRequest) -> BoxFuture<'_, crate::Result<()>>;
}

/// A cloneable, type-erased transport handle.
pub type DynTransport = Arc<dyn Transport>;
