use std::collections::HashMap;
use std::time::Duration;

/// Environment variable holding the bearer token sent with callback POSTs.
pub const ENV_CALLBACK_TOKEN: &str = "RUNPOD_CALLBACK_TOKEN";
/// Fallback name for the callback token variable.
pub const ENV_CALLBACK_TOKEN_FALLBACK: &str = "CALLBACK_TOKEN";
/// Environment variable overriding the outbound delivery timeout, in seconds.
pub const ENV_DELIVERY_TIMEOUT_SECS: &str = "DELIVERY_TIMEOUT_SECS";

/// Upper bound on a single callback POST or signed-URL PUT.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivery settings shared by every job a [`Handler`](crate::Handler) processes.
///
/// # Example
///
/// ```rust
/// use serverless_infer::HandlerConfig;
/// use std::time::Duration;
///
/// let config = HandlerConfig::new()
///     .callback_token("s3cret")
///     .header("X-Worker", "gpu-0")
///     .delivery_timeout(Duration::from_secs(10));
///
/// assert_eq!(config.delivery_timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Bearer token attached to callback POSTs.
    pub callback_token: Option<String>,
    /// Extra headers sent with every outbound delivery request.
    pub headers: HashMap<String, String>,
    /// Timeout applied to each outbound delivery request.
    pub delivery_timeout: Duration,
}

impl HandlerConfig {
    /// Create a config with no token, no extra headers and the default timeout.
    pub fn new() -> Self {
        Self {
            callback_token: None,
            headers: HashMap::new(),
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    /// Build a config from the process environment.
    ///
    /// Reads [`ENV_CALLBACK_TOKEN`] (falling back to
    /// [`ENV_CALLBACK_TOKEN_FALLBACK`]) and [`ENV_DELIVERY_TIMEOUT_SECS`].
    /// Unparseable or zero timeouts are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new();

        config.callback_token = lookup(ENV_CALLBACK_TOKEN)
            .or_else(|| lookup(ENV_CALLBACK_TOKEN_FALLBACK))
            .filter(|token| !token.is_empty());

        if let Some(raw) = lookup(ENV_DELIVERY_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.delivery_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(
                    value = %raw,
                    "ignoring invalid {}",
                    ENV_DELIVERY_TIMEOUT_SECS
                ),
            }
        }

        config
    }

    /// Set the bearer token attached to callback POSTs.
    pub fn callback_token(mut self, token: impl Into<String>) -> Self {
        self.callback_token = Some(token.into());
        self
    }

    /// Add a header sent with every delivery request.
    ///
    /// `Content-Type` is always `application/json` and cannot be overridden.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if key.eq_ignore_ascii_case("content-type") {
            tracing::warn!(header = %key, "ignoring Content-Type override");
            return self;
        }
        self.headers.insert(key, value.into());
        self
    }

    /// Set the per-request delivery timeout. Defaults to 30 seconds.
    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self::new()
    }
}
