//! Streamed tool-call frames.
//!
//! During a `tools/call`, the server streams [`Frame`] values over SSE, one
//! per event. Progress and log frames may appear any number of times;
//! exactly one terminal frame ([`Frame::Structured`] or [`Frame::Error`])
//! closes the stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity of a [`Frame::Log`] message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal operational message.
    Info,
    /// Something unexpected but recoverable.
    Warning,
    /// A failure worth surfacing.
    Error,
}

/// Machine-readable code carried by a terminal [`Frame::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request was cancelled cooperatively.
    Cancelled,
    /// The handler raised or violated the framework contract.
    Internal,
    /// The handler rejected its inputs at run time.
    InvalidParams,
    /// The handler reported a domain-level failure.
    ExecutionFailed,
}

/// One unit streamed over SSE during a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Frame {
    /// Intermediate progress update.
    #[serde(rename_all = "camelCase")]
    Progress {
        /// Current progress value.
        progress: u64,
        /// Total progress value, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
        /// Human-readable progress message.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Intermediate log message.
    #[serde(rename_all = "camelCase")]
    Log {
        /// Message severity.
        level: LogLevel,
        /// Log text.
        message: String,
    },

    /// Terminal success with a structured payload.
    #[serde(rename_all = "camelCase")]
    Structured {
        /// Structured result payload. Keys are camelCase on the wire.
        result: Value,
        /// Optional human-readable summary of the result.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },

    /// Terminal failure.
    #[serde(rename_all = "camelCase")]
    Error {
        /// Machine-readable failure code.
        code: ErrorCode,
        /// Human-readable failure message.
        message: String,
        /// Optional structured failure detail.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
}

impl Frame {
    /// Returns `true` if this frame closes the stream.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Structured { .. } | Self::Error { .. })
    }

    /// Creates the terminal frame emitted when a request is cancelled.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::Error {
            code: ErrorCode::Cancelled,
            message: "Request cancelled".to_owned(),
            data: None,
        }
    }

    /// Creates a terminal internal-error frame.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Error {
            code: ErrorCode::Internal,
            message: message.into(),
            data: None,
        }
    }
}
