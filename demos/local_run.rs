//! Run the handler locally against a toy text model.
//!
//! With no arguments, replays a few sample jobs. Otherwise each argument is
//! read as a file containing one job envelope (use `-` for stdin).
//!
//! ```sh
//! RUST_LOG=serverless_infer=debug cargo run --example local_run
//! cargo run --example local_run -- job.json
//! ```

use serde_json::{json, Map, Value};
use serverless_infer::{Handler, InferenceResult, Model, ModelError, ModelResult};
use std::io::Read;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ---------------------------------------------------------------------------
// Toy model
// ---------------------------------------------------------------------------

struct WordCount;

#[async_trait::async_trait]
impl Model for WordCount {
    async fn initialize(&self) -> ModelResult<()> {
        tracing::info!("loading word-count weights");
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }

    async fn preprocess(&self, input: Map<String, Value>) -> ModelResult<Value> {
        let text = input
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| ModelError::new("expected a `text` field"))?;
        Ok(json!(text.trim()))
    }

    async fn infer(&self, input: Value) -> ModelResult<Value> {
        let text = input.as_str().unwrap_or_default();
        if text.contains("crash") {
            return Err(ModelError::new("model crashed on input containing 'crash'"));
        }
        Ok(json!(text.split_whitespace().count()))
    }

    async fn postprocess(&self, output: Value) -> ModelResult<InferenceResult> {
        let words = output.as_u64().ok_or("word count must be an integer")?;
        Ok(InferenceResult::new(words)
            .with_confidence(1.0)
            .with_field("unit", "words"))
    }
}

fn samples() -> Vec<(&'static str, Value)> {
    vec![
        ("text input", json!({"input": {"text": "This is a sample text for testing."}})),
        ("empty input", json!({"input": {}})),
        ("model failure", json!({"input": {"text": "please crash"}})),
        ("wrong modality", json!({"input": {"image_url": "https://example.com/cat.jpg"}})),
        (
            "unreachable callback",
            json!({
                "id": "local-1",
                "input": {"text": "hello"},
                "callback_url": "http://127.0.0.1:9/webhook",
            }),
        ),
    ]
}

fn read_job(path: &str) -> std::io::Result<String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let handler = Handler::new(WordCount)?;
    handler.initialize().await?;

    let paths: Vec<String> = std::env::args().skip(1).collect();

    if paths.is_empty() {
        for (name, job) in samples() {
            println!("==== {} ====", name);
            println!("input:  {}", job);
            let response = handler.handle_value(job).await?;
            println!("output: {}", serde_json::to_string_pretty(&response.to_value())?);
        }
        return Ok(());
    }

    for path in paths {
        let raw = read_job(&path)?;
        let response = handler.handle_raw(&raw).await?;
        println!("{}", serde_json::to_string_pretty(&response.to_value())?);
    }

    Ok(())
}
