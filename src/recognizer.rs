//! Client for the remote recognition/solving service.
//!
//! One POST per submission carrying the PNG snapshot and the current variable
//! bindings; the reply is a list of structured results. Calls are instrumented
//! and log latencies and sizes, never the image payload itself.
//!
//! Wire contract:
//!   request  : { "image": "data:image/png;base64,...", "dict_of_vars": { expr: result } }
//!   response : { "data": [ { expr, result, steps, type, assign, latex }, ... ],
//!                "status"?: "success" | "error", "message"?: string }

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::domain::{Classification, ResultRecord, Step, StepKind};
use crate::error::SubmitError;
use crate::util::trunc_for_log;

#[derive(Clone, Debug, Serialize)]
pub struct RecognitionRequest {
  pub image: String,
  pub dict_of_vars: HashMap<String, String>,
}

/// Anything that can turn a snapshot + bindings into result records.
#[async_trait]
pub trait Recognizer: Send + Sync {
  async fn recognize(&self, request: RecognitionRequest) -> Result<Vec<ResultRecord>, SubmitError>;
}

#[derive(Clone)]
pub struct HttpRecognizer {
  client: reqwest::Client,
  pub endpoint: String,
}

impl HttpRecognizer {
  pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self, SubmitError> {
    let mut builder = reqwest::Client::builder();
    if let Some(t) = timeout {
      builder = builder.timeout(t);
    }
    let client = builder.build().map_err(|e| SubmitError::Transport(e.to_string()))?;
    Ok(Self { client, endpoint: endpoint.into() })
  }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
  #[instrument(
    level = "info",
    skip(self, request),
    fields(endpoint = %self.endpoint, image_len = request.image.len(), vars = request.dict_of_vars.len())
  )]
  async fn recognize(&self, request: RecognitionRequest) -> Result<Vec<ResultRecord>, SubmitError> {
    let start = Instant::now();
    let res = self.client.post(&self.endpoint)
      .header(USER_AGENT, "inkcalc-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&request).send().await?;

    let status = res.status();
    let body = res.text().await?;
    let elapsed = start.elapsed();

    if !status.is_success() {
      error!(?elapsed, %status, body = %trunc_for_log(&body, 200), "Recognition service returned an error status");
      let msg = extract_service_message(&body).unwrap_or(body);
      return Err(if status.is_server_error() {
        SubmitError::Transport(format!("HTTP {status}: {msg}"))
      } else {
        SubmitError::Service(format!("HTTP {status}: {msg}"))
      });
    }

    let records = decode_response(&body)?;
    info!(?elapsed, body_len = body.len(), records = records.len(), "Recognition response decoded");
    Ok(records)
  }
}

#[derive(Deserialize)]
struct Envelope {
  #[serde(default)] data: Option<Vec<Value>>,
  #[serde(default)] status: Option<String>,
  #[serde(default)] message: Option<String>,
}

#[derive(Deserialize)]
struct WireRecord {
  #[serde(default)] expr: Option<Value>,
  #[serde(default)] result: Option<Value>,
  #[serde(default)] steps: Option<Vec<WireStep>>,
  #[serde(default, rename = "type")] kind: Option<Classification>,
  #[serde(default)] assign: Option<bool>,
  #[serde(default)] latex: Option<String>,
}

/// Older service builds sent bare strings; newer ones send `{type, content}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireStep {
  Structured {
    #[serde(rename = "type")]
    kind: StepKind,
    content: String,
  },
  Plain(String),
}

impl From<WireStep> for Step {
  fn from(w: WireStep) -> Self {
    match w {
      WireStep::Structured { kind, content } => Step { kind, content },
      WireStep::Plain(content) => Step::text(content),
    }
  }
}

/// Decode a response body into records, in response order.
///
/// Items without `expr` or `result` are dropped; other missing fields get the
/// service's own defaults. A body that is not the expected envelope, or an item
/// with a wrongly typed field, fails the whole response.
pub fn decode_response(body: &str) -> Result<Vec<ResultRecord>, SubmitError> {
  let env: Envelope = serde_json::from_str(body)
    .map_err(|e| SubmitError::Malformed(format!("{e}; body: {}", trunc_for_log(body, 120))))?;

  if env.status.as_deref() == Some("error") {
    return Err(SubmitError::Service(env.message.unwrap_or_else(|| "unspecified error".into())));
  }
  let items = env.data.ok_or_else(|| SubmitError::Malformed("missing `data` array".into()))?;

  let mut out = Vec::with_capacity(items.len());
  for (idx, item) in items.into_iter().enumerate() {
    let wire: WireRecord = serde_json::from_value(item)
      .map_err(|e| SubmitError::Malformed(format!("item {idx}: {e}")))?;
    let (Some(expr), Some(result)) = (wire.expr.as_ref().and_then(as_text), wire.result.as_ref().and_then(as_text)) else {
      warn!(target: "submission", idx, "Dropping result item without expr/result");
      continue;
    };
    let latex = wire.latex.unwrap_or_else(|| format!("{expr} = {result}"));
    out.push(ResultRecord {
      expr,
      result,
      latex,
      steps: wire.steps.unwrap_or_default().into_iter().map(Step::from).collect(),
      classification: wire.kind.unwrap_or_default(),
      assign: wire.assign.unwrap_or(false),
    });
  }
  Ok(out)
}

fn as_text(v: &Value) -> Option<String> {
  match v {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

/// Pull `message` or `detail` out of an error body, if it is JSON.
fn extract_service_message(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EObj {
    #[serde(default)] message: Option<String>,
    #[serde(default)] detail: Option<Value>,
  }
  let e: EObj = serde_json::from_str(body).ok()?;
  e.message.or_else(|| e.detail.map(|d| match d {
    Value::String(s) => s,
    other => other.to_string(),
  }))
}
