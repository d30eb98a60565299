use super::{BoxFuture, DeliveryRequest, Method, Transport, CONTENT_TYPE_JSON};
use crate::config::HandlerConfig;
use crate::errors::ShimError;

/// Longest slice of a rejected response body kept in the error message.
const MAX_ERROR_BODY: usize = 512;

/// reqwest-backed transport for callback POSTs and signed-URL PUTs.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client whose every request is bounded by the configured
    /// delivery timeout.
    pub fn new(config: &HandlerConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.delivery_timeout)
            .build()
            .map_err(|e| ShimError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Use a preconfigured reqwest client as-is.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn do_request(&self, request: DeliveryRequest) -> crate::Result<()> {
        let mut req = match request.method {
            Method::Post => self.client.post(request.url.clone()),
            Method::Put => self.client.put(request.url.clone()),
        };

        req = req
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE_JSON)
            .json(&request.body);

        for (key, value) in &request.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let response = req.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShimError::Delivery(rejection_message(
                request.method,
                status.as_u16(),
                &body,
            )));
        }

        Ok(())
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: DeliveryRequest) -> BoxFuture<'_, crate::Result<()>> {
        Box::pin(self.do_request(request))
    }
}

fn rejection_message(method: Method, status: u16, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return format!("{} rejected with HTTP {}", method.as_str(), status);
    }
    let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
    format!("{} rejected with HTTP {}: {}", method.as_str(), status, snippet)
}
