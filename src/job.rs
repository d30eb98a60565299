use crate::errors::{Result, ShimError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// Envelope key for the callback directive.
pub const CALLBACK_URL_KEY: &str = "callback_url";
/// Envelope key for the signed-upload directive.
pub const SIGNED_URL_KEY: &str = "gcs_signed_url";

// ---------------------------------------------------------------------------
// Job envelope
// ---------------------------------------------------------------------------

/// The single object the invoking runtime hands over per job.
///
/// Fields are kept loosely typed so that every malformation surfaces as a
/// [`ShimError::Input`] from [`JobEnvelope::normalize`] rather than as a
/// deserialization failure.
#[non_exhaustive]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobEnvelope {
    /// Opaque job identifier assigned by the runtime. Absent for local runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    /// Caller-supplied identifier, used when the runtime sets no `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Value>,

    /// Model-specific input mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,

    /// Where to POST the result envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<Value>,

    /// Pre-signed object-storage URL to PUT the result envelope to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcs_signed_url: Option<Value>,
}

impl JobEnvelope {
    /// Build an envelope around an input mapping.
    pub fn new(input: Value) -> Self {
        Self {
            input: Some(input),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(Value::String(id.into()));
        self
    }

    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(Value::String(url.into()));
        self
    }

    pub fn with_signed_url(mut self, url: impl Into<String>) -> Self {
        self.gcs_signed_url = Some(Value::String(url.into()));
        self
    }

    /// Parse an envelope from an arbitrary JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(ShimError::Input(format!(
                "job envelope must be a JSON object, got {}",
                type_name(&value)
            )));
        }
        serde_json::from_value(value).map_err(|e| ShimError::Input(e.to_string()))
    }

    /// Parse an envelope from JSON text.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| ShimError::Input(format!("invalid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// The job id as a string, if one was supplied. `id` wins over `job_id`.
    pub fn job_id(&self) -> Option<String> {
        id_string(self.id.as_ref()).or_else(|| id_string(self.job_id.as_ref()))
    }

    /// Extract the delivery directives.
    ///
    /// Top-level keys take precedence over the same keys nested inside
    /// `input`. A directive that is present but not an absolute `http(s)` URL
    /// is an input error.
    pub fn directives(&self) -> Result<Directives> {
        let nested = self.input.as_ref().and_then(Value::as_object);

        let callback_url = lookup_directive(self.callback_url.as_ref(), nested, CALLBACK_URL_KEY)?;
        let signed_url = lookup_directive(self.gcs_signed_url.as_ref(), nested, SIGNED_URL_KEY)?;

        Ok(Directives {
            callback_url,
            signed_url,
        })
    }

    /// Extract the model input mapping, with directive keys stripped.
    pub fn payload(&self) -> Result<Map<String, Value>> {
        let input = match &self.input {
            None | Some(Value::Null) => {
                return Err(ShimError::Input("no input data provided".to_string()));
            }
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(ShimError::Input(format!(
                    "input must be a JSON object, got {}",
                    type_name(other)
                )));
            }
        };

        let mut payload = input.clone();
        payload.remove(CALLBACK_URL_KEY);
        payload.remove(SIGNED_URL_KEY);

        if payload.is_empty() {
            return Err(ShimError::Input("no input data provided".to_string()));
        }

        Ok(payload)
    }

    /// Validate the envelope and split it into its typed parts.
    pub fn normalize(&self) -> Result<NormalizedJob> {
        let directives = self.directives()?;
        let input = self.payload()?;
        Ok(NormalizedJob {
            job_id: self.job_id(),
            input,
            directives,
        })
    }
}

// ---------------------------------------------------------------------------
// Normalized job
// ---------------------------------------------------------------------------

/// Optional delivery targets attached to a job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    pub callback_url: Option<Url>,
    pub signed_url: Option<Url>,
}

/// A job envelope after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedJob {
    pub job_id: Option<String>,
    pub input: Map<String, Value>,
    pub directives: Directives,
}

fn lookup_directive(
    top_level: Option<&Value>,
    nested: Option<&Map<String, Value>>,
    key: &str,
) -> Result<Option<Url>> {
    let value = match top_level {
        Some(v) if !v.is_null() => Some(v),
        _ => nested.and_then(|m| m.get(key)).filter(|v| !v.is_null()),
    };

    let raw = match value {
        None => return Ok(None),
        Some(Value::String(s)) => s.trim(),
        Some(other) => {
            return Err(ShimError::Input(format!(
                "{} must be a string, got {}",
                key,
                type_name(other)
            )));
        }
    };

    if raw.is_empty() {
        return Ok(None);
    }

    let url = Url::parse(raw).map_err(|e| ShimError::Input(format!("{} is not a valid URL: {}", key, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(Some(url)),
        scheme => Err(ShimError::Input(format!(
            "{} must use http or https, got {}",
            key, scheme
        ))),
    }
}

fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
