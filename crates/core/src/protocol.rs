use crate::error::WorkerError;
use crate::manifest::{AssetDescriptor, DownloadFailure};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Operation used when a request carries no `op` field.
pub const DEFAULT_OP: &str = "version";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadParams {
    /// Empty means "use the configured default asset list".
    pub urls: Vec<String>,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapParams {
    pub source_url: String,
    pub target_url: String,
    pub source_face: i64,
    pub target_face: i64,
}

/// The closed set of operations understood by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Health,
    Version,
    DownloadModels(DownloadParams),
    Swap(SwapParams),
    Unknown(String),
}

impl Operation {
    /// Reads the `input` map out of a request envelope. A missing or
    /// non-object `input` is treated as an empty map.
    pub fn from_envelope(envelope: &Value) -> Result<Self, WorkerError> {
        let empty = Map::new();
        let input = envelope
            .get("input")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        Self::from_input(input)
    }

    pub fn from_input(input: &Map<String, Value>) -> Result<Self, WorkerError> {
        let op = match input.get("op") {
            None | Some(Value::Null) => DEFAULT_OP.to_string(),
            Some(Value::String(s)) => s.trim().to_lowercase(),
            Some(other) => other.to_string().to_lowercase(),
        };

        match op.as_str() {
            "health" => Ok(Self::Health),
            "version" => Ok(Self::Version),
            "download_models" => Ok(Self::DownloadModels(DownloadParams {
                urls: parse_urls(input.get("model_url"))?,
                force: parse_bool(input.get("force"), "force")?,
            })),
            "swap" => Ok(Self::Swap(SwapParams {
                source_url: required_str(input, "source_url")?,
                target_url: required_str(input, "target_url")?,
                source_face: parse_index(input.get("source_face"), "source_face")?,
                target_face: parse_index(input.get("target_face"), "target_face")?,
            })),
            _ => Ok(Self::Unknown(op)),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Health => "health",
            Self::Version => "version",
            Self::DownloadModels(_) => "download_models",
            Self::Swap(_) => "swap",
            Self::Unknown(op) => op,
        }
    }
}

fn parse_urls(value: Option<&Value>) -> Result<Vec<String>, WorkerError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.trim().to_string()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.trim().to_string()),
                other => Err(WorkerError::validation(format!(
                    "model_url entries must be strings, got {}",
                    other
                ))),
            })
            .filter(|url| !matches!(url, Ok(s) if s.is_empty()))
            .collect(),
        Some(other) => Err(WorkerError::validation(format!(
            "model_url must be a string or an array of strings, got {}",
            other
        ))),
    }
}

fn parse_bool(value: Option<&Value>, field: &str) -> Result<bool, WorkerError> {
    match value {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(WorkerError::validation(format!(
            "{} must be a boolean, got {}",
            field, other
        ))),
    }
}

fn parse_index(value: Option<&Value>, field: &str) -> Result<i64, WorkerError> {
    match value {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if n.as_u64().is_some() {
                // Larger than i64::MAX; clamps to the last face anyway.
                Ok(i64::MAX)
            } else {
                Err(WorkerError::validation(format!(
                    "{} must be an integer, got {}",
                    field, n
                )))
            }
        }
        Some(other) => Err(WorkerError::validation(format!(
            "{} must be an integer, got {}",
            field, other
        ))),
    }
}

fn required_str(input: &Map<String, Value>, field: &str) -> Result<String, WorkerError> {
    match input.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) | None | Some(Value::Null) => Err(WorkerError::validation(
            format!("missing required field '{}'", field),
        )),
        Some(other) => Err(WorkerError::validation(format!(
            "{} must be a string, got {}",
            field, other
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Partial,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: Status,
    /// Seconds since the worker started.
    pub uptime: u64,
    /// Unix seconds at the time of the call.
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionResponse {
    pub status: Status,
    pub versions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub status: Status,
    pub dest: String,
    pub downloaded: Vec<AssetDescriptor>,
    pub errors: Vec<DownloadFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapResponse {
    pub status: Status,
    pub image_base64: String,
    pub source_face_index: usize,
    pub target_face_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: Status,
    pub kind: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            kind: kind.into(),
            error: error.into(),
        }
    }
}

impl From<&WorkerError> for ErrorResponse {
    fn from(err: &WorkerError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// What the dispatcher hands back for every request, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseEnvelope {
    Health(HealthResponse),
    Version(VersionResponse),
    Download(DownloadResponse),
    Swap(SwapResponse),
    Error(ErrorResponse),
}

impl ResponseEnvelope {
    pub fn status(&self) -> Status {
        match self {
            Self::Health(r) => r.status,
            Self::Version(r) => r.status,
            Self::Download(r) => r.status,
            Self::Swap(r) => r.status,
            Self::Error(r) => r.status,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({ "status": "error", "kind": "internal", "error": e.to_string() })
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssetEvent {
    /// Starting a fetch for the given locator
    Started(String),
    /// Bytes written so far and the expected total (0 when unknown)
    Progress(u64, u64),
    /// Asset finalized at the given path
    Complete(String),
    /// Fetch failed
    Error(String),
}
