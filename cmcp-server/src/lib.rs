//! Canton MCP tool server.
//!
//! Exposes the tool catalogue over MCP (JSON-RPC 2.0 on `POST /mcp` with
//! SSE streaming for `tools/call`), gates priced tools behind HTTP 402
//! x402 payments, and broadcasts DCAP telemetry over UDP.
//!
//! # Modules
//!
//! - [`server`] — Axum router, application state, `/health` and `/mcp-info`
//! - [`dispatch`] — JSON-RPC method routing and error envelopes
//! - [`stream`] — The streaming tool-call driver
//! - [`resources`] — Disk-backed resource and prompt registries
//! - [`discovery`] — Periodic `semantic_discover` broadcasting
//! - [`tools`] — The Canton/DAML tool catalogue

pub mod discovery;
pub mod dispatch;
pub mod resources;
pub mod server;
pub mod stream;
pub mod tools;
