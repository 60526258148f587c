//! Core framework for the Canton MCP tool server.
//!
//! This crate provides everything between the wire format
//! ([`cmcp_proto`]) and the HTTP transport:
//!
//! - [`tool`] — The [`Tool`](tool::Tool) trait and per-invocation
//!   [`ToolContext`](tool::ToolContext)
//! - [`registry`] — Startup-time tool registration and lookup
//! - [`pricing`] — Free / fixed / dynamic tool pricing
//! - [`gate`] — The HTTP-402 payment gate
//! - [`rail`] / [`rails`] — Payment rail trait and the EVM and Canton clients
//! - [`request`] — In-flight request tracking and cooperative cancellation
//! - [`telemetry`] — Fire-and-forget UDP performance and discovery records
//! - [`config`] — Environment-driven server configuration

pub mod config;
pub mod error;
pub mod gate;
pub mod pricing;
pub mod rail;
pub mod rails;
pub mod registry;
pub mod request;
pub mod telemetry;
pub mod tool;

/// Re-export the wire format crate.
pub use cmcp_proto as proto;
