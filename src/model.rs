use crate::envelope::InferenceResult;
use crate::errors::{ModelError, Result, ShimError, Stage};
use crate::job::type_name;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// The result type returned by model hooks.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

// ---------------------------------------------------------------------------
// Model trait
// ---------------------------------------------------------------------------

/// Capability interface every concrete model satisfies.
///
/// Only [`Model::infer`] is required. The other hooks default to no-op or
/// pass-through behavior. A [`Handler`](crate::Handler) calls the hooks in
/// order `preprocess -> infer -> postprocess`, once per job, after
/// [`Model::initialize`] has completed exactly once for the process.
///
/// After initialization the model is shared across concurrent jobs through
/// `&self`, so any state mutated during inference needs its own
/// synchronization.
///
/// # Example
///
/// ```rust
/// use serverless_infer::{Model, ModelResult};
/// use serde_json::{json, Value};
///
/// struct Shout;
///
/// #[async_trait::async_trait]
/// impl Model for Shout {
///     async fn infer(&self, input: Value) -> ModelResult<Value> {
///         let text = input["text"].as_str().ok_or("missing text")?;
///         Ok(json!(text.to_uppercase()))
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Model: Send + Sync + 'static {
    /// One-time setup: load weights, allocate device resources.
    async fn initialize(&self) -> ModelResult<()> {
        Ok(())
    }

    /// Transform the raw input mapping into what `infer` expects.
    async fn preprocess(&self, input: Map<String, Value>) -> ModelResult<Value> {
        Ok(Value::Object(input))
    }

    /// Run the model.
    async fn infer(&self, input: Value) -> ModelResult<Value>;

    /// Shape the raw model output into an [`InferenceResult`].
    ///
    /// The default accepts an object carrying a `prediction` key (other keys
    /// become extra fields) and wraps anything else as the prediction.
    async fn postprocess(&self, output: Value) -> ModelResult<InferenceResult> {
        passthrough(output)
    }

    /// Diagnostics attached as `model_context` to the envelope of a job whose
    /// stage failed. Return `None` to leave the field out.
    ///
    /// Input errors never reach the model and get no context.
    fn error_context(&self, _error: &ShimError, site: &FailureSite) -> Option<Value> {
        Some(site.describe())
    }
}

/// The value a hook was given when it failed.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureSite {
    pub stage: Stage,
    /// JSON type of the hook's argument.
    pub input_type: &'static str,
    /// Top-level keys of the hook's argument, when it is an object.
    pub input_keys: Vec<String>,
}

impl FailureSite {
    pub fn new(stage: Stage, input: &Value) -> Self {
        let input_keys = match input {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };
        Self {
            stage,
            input_type: type_name(input),
            input_keys,
        }
    }

    pub(crate) fn of_map(stage: Stage, input: &Map<String, Value>) -> Self {
        Self {
            stage,
            input_type: "object",
            input_keys: input.keys().cloned().collect(),
        }
    }

    /// The default `model_context` object.
    pub fn describe(&self) -> Value {
        let mut context = Map::new();
        context.insert("model_ready".into(), Value::Bool(true));
        context.insert("stage".into(), self.stage.as_str().into());
        context.insert("input_type".into(), self.input_type.into());
        if !self.input_keys.is_empty() {
            context.insert("input_keys".into(), self.input_keys.clone().into());
        }
        Value::Object(context)
    }
}

/// Default `postprocess` behavior, usable from custom implementations.
pub fn passthrough(output: Value) -> ModelResult<InferenceResult> {
    match output {
        Value::Object(map) if map.contains_key("prediction") => {
            serde_json::from_value(Value::Object(map)).map_err(ModelError::from)
        }
        other => Ok(InferenceResult::new(other)),
    }
}

// ---------------------------------------------------------------------------
// Init-once slot
// ---------------------------------------------------------------------------

/// Process-wide holder for a model and its initialization state.
///
/// Lifecycle: `uninitialized -> initialized`, never back. The first caller of
/// [`ModelSlot::ready`] runs [`Model::initialize`]; concurrent callers wait on
/// the same run instead of starting their own. Once initialized the model is
/// only ever read. A failed initialization leaves the slot uninitialized and
/// is reported as [`ShimError::Initialization`], which callers treat as fatal.
pub struct ModelSlot {
    model: Arc<dyn Model>,
    initialized: OnceCell<()>,
}

impl ModelSlot {
    pub fn new(model: impl Model) -> Self {
        Self::from_arc(Arc::new(model))
    }

    pub fn from_arc(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            initialized: OnceCell::new(),
        }
    }

    /// Initialize the model if needed and return it.
    pub async fn ready(&self) -> Result<&dyn Model> {
        self.initialized
            .get_or_try_init(|| async {
                tracing::info!("initializing model");
                self.model
                    .initialize()
                    .await
                    .map_err(|e| ShimError::Initialization(e.0))?;
                tracing::info!("model initialized");
                Ok::<(), ShimError>(())
            })
            .await?;
        Ok(self.model.as_ref())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }
}

impl std::fmt::Debug for ModelSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSlot")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingModel {
        inits: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait::async_trait]
    impl Model for CountingModel {
        async fn initialize(&self) -> ModelResult<()> {
            let n = self.inits.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_first && n == 0 {
                return Err(ModelError::new("weights missing"));
            }
            Ok(())
        }

        async fn infer(&self, input: Value) -> ModelResult<Value> {
            Ok(input)
        }
    }

    #[tokio::test]
    async fn test_concurrent_ready_initializes_once() {
        let model = Arc::new(CountingModel {
            inits: AtomicUsize::new(0),
            fail_first: false,
        });
        let slot = Arc::new(ModelSlot::from_arc(model.clone()));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let slot = slot.clone();
            tasks.push(tokio::spawn(async move { slot.ready().await.is_ok() }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }

        assert_eq!(model.inits.load(Ordering::SeqCst), 1);
        assert!(slot.is_initialized());

        slot.ready().await.unwrap();
        assert_eq!(model.inits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_initialize_is_reported() {
        let slot = ModelSlot::new(CountingModel {
            inits: AtomicUsize::new(0),
            fail_first: true,
        });

        let err = slot.ready().await.err().unwrap();
        assert_eq!(
            err,
            ShimError::Initialization("weights missing".to_string())
        );
        assert!(!slot.is_initialized());
    }

    #[test]
    fn test_passthrough_wraps_scalars() {
        let result = passthrough(json!("cat")).unwrap();
        assert_eq!(result.prediction, json!("cat"));
        assert!(result.extra.is_empty());
    }

    #[test]
    fn test_passthrough_keeps_structured_output() {
        let result = passthrough(json!({"prediction": [1, 2], "confidence": 0.5, "label": "x"}))
            .unwrap();
        assert_eq!(result.prediction, json!([1, 2]));
        assert_eq!(result.confidence, Some(0.5));
        assert_eq!(result.extra.get("label"), Some(&json!("x")));
    }

    #[test]
    fn test_passthrough_wraps_objects_without_prediction() {
        let result = passthrough(json!({"label": "x"})).unwrap();
        assert_eq!(result.prediction, json!({"label": "x"}));
    }

    #[test]
    fn test_default_error_context() {
        let model = CountingModel {
            inits: AtomicUsize::new(0),
            fail_first: false,
        };
        let site = FailureSite::new(Stage::Inference, &json!({"pixels": [0, 1], "mode": "rgb"}));
        let context = model
            .error_context(&ShimError::Inference("OOM".into()), &site)
            .unwrap();

        assert_eq!(context["model_ready"], true);
        assert_eq!(context["stage"], "inference");
        assert_eq!(context["input_type"], "object");
        let mut keys: Vec<_> = context["input_keys"]
            .as_array()
            .unwrap()
            .iter()
            .map(|k| k.as_str().unwrap())
            .collect();
        keys.sort_unstable();
        assert_eq!(keys, ["mode", "pixels"]);

        let scalar = FailureSite::new(Stage::Postprocess, &json!(3.5)).describe();
        assert_eq!(scalar["input_type"], "number");
        assert!(scalar.get("input_keys").is_none());
    }

    #[test]
    fn test_passthrough_rejects_bad_confidence() {
        assert!(passthrough(json!({"prediction": 1, "confidence": "high"})).is_err());
    }
}
