//! Queue message formats.
//!
//! Outbound, one [`DispatchRequest`] per execution goes to the submission
//! queue, either as plain JSON or as a zstd frame in standard base64.
//! Inbound, every runner report is a flat JSON object carrying the execution
//! id next to the event's `msg_type` tag and fields:
//!
//! ```json
//! {"exec_id": "0190...", "msg_type": "reached_test", "test_id": 1, "input": "1 2"}
//! ```

use base64::{Engine as _, engine::general_purpose};
use judgeline_types::{Event, Language, ResourceParams, Submission, TestFile};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::WireError;

/// zstd level for compressed requests, 0 selects the library default.
const ZSTD_LEVEL: i32 = 0;

/// One test as sent to the runner, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchTest {
  pub id: u32,
  #[serde(flatten)]
  pub file: TestFile,
}

/// Run request sent to the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
  pub exec_id: Uuid,
  pub code: String,
  pub language: Language,
  pub tests: Vec<DispatchTest>,
  pub cpu_ms: u32,
  pub mem_kib: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub checker: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub interactor: Option<String>,
  /// Queue the runner must report progress to.
  pub res_queue: String,
}

impl DispatchRequest {
  pub fn new(
    exec_id: Uuid,
    submission: &Submission,
    language: &Language,
    tests: &[TestFile],
    params: &ResourceParams,
    res_queue: &str,
  ) -> Self {
    let tests = tests
      .iter()
      .zip(1u32..)
      .map(|(file, id)| DispatchTest {
        id,
        file: file.clone(),
      })
      .collect();

    Self {
      exec_id,
      code: submission.code.clone(),
      language: language.clone(),
      tests,
      cpu_ms: params.cpu_ms,
      mem_kib: params.mem_kib,
      checker: params.checker.clone(),
      interactor: params.interactor.clone(),
      res_queue: res_queue.to_string(),
    }
  }

  /// Serialize into a queue message body.
  pub fn encode(&self, compress: bool) -> Result<String, WireError> {
    let json = serde_json::to_string(self)?;
    if !compress {
      return Ok(json);
    }
    let compressed = zstd::encode_all(json.as_bytes(), ZSTD_LEVEL)?;
    Ok(general_purpose::STANDARD.encode(compressed))
  }

  /// Parse a queue message body, plain or compressed.
  pub fn decode(body: &str) -> Result<Self, WireError> {
    let body = body.trim();
    if body.starts_with('{') {
      return Ok(serde_json::from_str(body)?);
    }
    let compressed = general_purpose::STANDARD.decode(body)?;
    let json = zstd::decode_all(compressed.as_slice())?;
    Ok(serde_json::from_slice(&json)?)
  }
}

/// A runner report addressed to one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
  Event(Event),
  /// The envelope names an execution but its event does not decode, for
  /// example an unrecognized `msg_type`.
  Malformed {
    msg_type: Option<String>,
    error: String,
  },
}

impl Report {
  /// The `msg_type` tag the report arrived with.
  pub fn msg_type(&self) -> &str {
    match self {
      Report::Event(event) => event.kind().as_str(),
      Report::Malformed { msg_type, .. } => msg_type.as_deref().unwrap_or("<missing>"),
    }
  }
}

/// Encode a runner report for `exec_id`.
pub fn encode_result(exec_id: Uuid, event: &Event) -> Result<String, WireError> {
  let mut value = serde_json::to_value(event)?;
  let object = value.as_object_mut().ok_or(WireError::NotAnObject)?;
  object.insert("exec_id".to_string(), Value::String(exec_id.to_string()));
  Ok(serde_json::to_string(&value)?)
}

/// Decode a runner report into its execution id and report.
///
/// Fails only when the body is not a JSON object with a valid `exec_id`.
/// Once the execution is known, an event that does not decode becomes
/// [`Report::Malformed`] so it can be failed on that execution.
pub fn decode_result(body: &str) -> Result<(Uuid, Report), WireError> {
  let value: Value = serde_json::from_str(body)?;
  let exec_id = value
    .get("exec_id")
    .and_then(Value::as_str)
    .and_then(|id| Uuid::parse_str(id).ok())
    .ok_or(WireError::MissingExecId)?;
  let msg_type = value
    .get("msg_type")
    .and_then(Value::as_str)
    .map(str::to_string);

  let report = match serde_json::from_value::<Event>(value) {
    Ok(event) => Report::Event(event),
    Err(e) => Report::Malformed {
      msg_type,
      error: e.to_string(),
    },
  };
  Ok((exec_id, report))
}
