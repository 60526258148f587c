//! Wire format types for the Canton MCP tool server.
//!
//! This crate defines the serialization-level data structures shared across
//! the cmcp stack: JSON-RPC 2.0 envelopes, MCP method results, the streaming
//! frame vocabulary, and the x402 payment wire contract. It has minimal
//! dependencies (`serde`, `serde_json`, `base64`) and is intended to be the
//! shared "lingua franca" between the framework crate and the server binary.
//!
//! # Modules
//!
//! - [`rpc`] — JSON-RPC 2.0 envelopes and error codes
//! - [`frame`] — Streamed tool-call frames (progress, log, structured, error)
//! - [`mcp`] — MCP method result types (`initialize`, `tools/list`, ...)
//! - [`x402`] — Payment requirements, envelopes, and facilitator responses
//! - [`case`] — snake_case/camelCase key translation at the wire boundary
//! - [`encoding`] — base64 + JSON codec helpers for payment headers

pub mod case;
pub mod encoding;
pub mod frame;
pub mod mcp;
pub mod rpc;
pub mod x402;

pub use frame::{ErrorCode, Frame, LogLevel};
pub use mcp::{
    InitializeResult, ListPromptsResult, ListResourcesResult, ListToolsResult, PricingAdvert,
    PromptDescriptor, ResourceDescriptor, ServerCapabilities, ServerInfo, ToolDescriptor,
    PROTOCOL_VERSION,
};
pub use rpc::{JsonRpcRequest, JsonRpcResponse, RpcError};
pub use x402::{
    PaymentEnvelope, PaymentRequired, PaymentRequirement, SettleRequest, SettleResponse,
    SettlementResult, Verdict, VerifyRequest, VerifyResponse, X402_VERSION,
};

/// Errors that can occur when decoding wire-level payment material.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The payment header is not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded bytes are not valid JSON for the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field is missing from the decoded data.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}
