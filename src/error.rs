//! The one error shape raised by every public method, and the normalizer
//! that produces it from raw transport outcomes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::events::{self, EventBus, EventPayload};

pub const API_ERROR: &str = "API_ERROR";
pub const CONFIGURATION_ERROR: &str = "CONFIGURATION_ERROR";
pub const TIMEOUT: &str = "TIMEOUT";
pub const CONNECTION_ERROR: &str = "CONNECTION_ERROR";
pub const DECODE_ERROR: &str = "DECODE_ERROR";
pub const STREAM_ERROR: &str = "STREAM_ERROR";
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const UNSUPPORTED_OPERATION: &str = "UNSUPPORTED_OPERATION";
pub const CLIENT_CLOSED: &str = "CLIENT_CLOSED";
pub const IO_ERROR: &str = "IO_ERROR";

const UNKNOWN_MESSAGE: &str = "Unknown error occurred";

/// Broad failure class. The `code` string is the machine-matchable part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or invalid client configuration. Raised before any request.
    Configuration,
    /// Network failure, timeout or non-2xx response.
    Transport,
    /// The transport failed after a streamed response had started.
    Stream,
    /// A required call argument was missing or blank.
    Validation,
    /// The requested operation is not available for this payload or
    /// environment. Reserved for callers building on the client.
    UnsupportedOperation,
    /// The client was closed.
    Closed,
}

/// Normalized client error.
///
/// `message` and `code` are never empty.
#[derive(Error, Debug, Clone, Serialize)]
#[error("{message} ({code})")]
pub struct ClientError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub details: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ClientError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: non_empty(code.into()).unwrap_or_else(|| API_ERROR.to_string()),
            message: non_empty(message.into()).unwrap_or_else(|| UNKNOWN_MESSAGE.to_string()),
            details: Value::Null,
            status: None,
            request_id: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, CONFIGURATION_ERROR, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, VALIDATION_ERROR, message)
    }

    /// An operation this client cannot perform, such as an upload payload
    /// kind the platform does not accept. Nothing is sent.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedOperation, UNSUPPORTED_OPERATION, message)
    }

    pub fn closed() -> Self {
        Self::new(ErrorKind::Closed, CLIENT_CLOSED, "client has been closed")
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn is_timeout(&self) -> bool {
        self.code == TIMEOUT
    }
}

/// Reject a blank required argument with a `Validation` error.
pub fn require<'a>(name: &str, value: &'a str) -> Result<&'a str, ClientError> {
    if value.trim().is_empty() {
        Err(ClientError::validation(format!("{name} is required")))
    } else {
        Ok(value)
    }
}

/// A failure as the transport produced it, before normalization.
#[derive(Debug)]
pub enum RawFailure {
    /// The server answered with a non-2xx status.
    Status {
        status: u16,
        request_id: Option<String>,
        body: String,
    },
    /// The request never produced a response.
    Transport {
        source: reqwest::Error,
        request_id: Option<String>,
    },
    /// The transport failed while a streamed body was being read.
    Stream {
        source: reqwest::Error,
        request_id: Option<String>,
    },
    /// A 2xx body could not be decoded into the expected shape.
    Decode {
        status: u16,
        request_id: Option<String>,
        source: serde_json::Error,
    },
    /// Preparing the request failed locally, e.g. reading an upload file.
    Io(std::io::Error),
    /// Already normalized; only needs reporting.
    Normalized(ClientError),
}

impl From<ClientError> for RawFailure {
    fn from(err: ClientError) -> Self {
        RawFailure::Normalized(err)
    }
}

/// Turns [`RawFailure`] values into [`ClientError`] and announces each one
/// on the bus as an `error` event until it is closed.
#[derive(Debug, Clone)]
pub struct ErrorNormalizer {
    bus: EventBus,
    closed: Arc<AtomicBool>,
}

impl ErrorNormalizer {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop announcing errors. Returns `true` if it was already closed.
    pub fn close(&self) -> bool {
        self.closed.swap(true, Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Normalize and report. Never fails.
    pub fn raise(&self, failure: impl Into<RawFailure>) -> ClientError {
        let err = normalize(failure.into());
        tracing::warn!(
            code = %err.code,
            status = ?err.status,
            request_id = ?err.request_id,
            "request failed: {}",
            err.message
        );
        if !self.is_closed() {
            self.bus.emit(events::ERROR, EventPayload::Error(err.clone()));
        }
        err
    }
}

/// Pure normalization, without any event emission.
pub fn normalize(failure: RawFailure) -> ClientError {
    match failure {
        RawFailure::Status {
            status,
            request_id,
            body,
        } => from_status(status, request_id, &body),
        RawFailure::Transport { source, request_id } => {
            let code = if source.is_timeout() {
                TIMEOUT
            } else if source.is_connect() {
                CONNECTION_ERROR
            } else {
                API_ERROR
            };
            let status = source.status().map(|s| s.as_u16());
            let mut err = ClientError::new(ErrorKind::Transport, code, source.to_string());
            err.details = synthesized_details(status, request_id.as_deref());
            err.status = status;
            err.request_id = request_id;
            err
        }
        RawFailure::Stream { source, request_id } => {
            let mut err = ClientError::new(
                ErrorKind::Stream,
                STREAM_ERROR,
                format!("stream interrupted: {source}"),
            );
            err.details = synthesized_details(None, request_id.as_deref());
            err.request_id = request_id;
            err
        }
        RawFailure::Decode {
            status,
            request_id,
            source,
        } => {
            let mut err = ClientError::new(
                ErrorKind::Transport,
                DECODE_ERROR,
                format!("failed to decode response body: {source}"),
            );
            err.details = synthesized_details(Some(status), request_id.as_deref());
            err.status = Some(status);
            err.request_id = request_id;
            err
        }
        RawFailure::Io(source) => ClientError::new(ErrorKind::Transport, IO_ERROR, source.to_string()),
        RawFailure::Normalized(err) => err,
    }
}

fn from_status(status: u16, request_id: Option<String>, body: &str) -> ClientError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);

    let message = string_at(&parsed, "/error/message")
        .or_else(|| string_at(&parsed, "/error"))
        .or_else(|| string_at(&parsed, "/message"))
        .unwrap_or_else(|| format!("request failed with status code {status}"));

    let code = string_at(&parsed, "/error/code")
        .or_else(|| string_at(&parsed, "/code"))
        .unwrap_or_else(|| API_ERROR.to_string());

    let details = present_at(&parsed, "/error/details")
        .or_else(|| present_at(&parsed, "/details"))
        .or_else(|| parsed.pointer("/error").filter(|v| v.is_object()))
        .cloned()
        .unwrap_or_else(|| synthesized_details(Some(status), request_id.as_deref()));

    ClientError {
        details,
        status: Some(status),
        request_id,
        ..ClientError::new(ErrorKind::Transport, code, message)
    }
}

/// String or number at a JSON pointer, ignoring blanks.
fn string_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) => non_empty(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn present_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a Value> {
    value.pointer(pointer).filter(|v| !v.is_null())
}

fn synthesized_details(status: Option<u16>, request_id: Option<&str>) -> Value {
    let mut details = Map::new();
    if let Some(status) = status {
        details.insert("status".into(), json!(status));
    }
    if let Some(id) = request_id {
        details.insert("requestId".into(), json!(id));
    }
    Value::Object(details)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
