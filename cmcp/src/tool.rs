//! The tool contract and per-invocation execution context.
//!
//! A tool is a named, schema-described unit of work. Handlers emit
//! [`Frame`]s through the [`ToolContext`]; the streaming driver owns the
//! other end of the channel and enforces the one-terminal-frame invariant.
//!
//! Handlers must poll [`ToolContext::is_cancelled`] at natural await
//! points; cancellation is cooperative and never forced.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cmcp_proto::frame::{ErrorCode, Frame, LogLevel};
use cmcp_proto::mcp::ToolDescriptor;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::pricing::Pricing;

/// A boxed, sendable future, used to keep the [`Tool`] trait dyn-compatible.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Read-only view of a verified payment, exposed to handlers.
#[derive(Debug, Clone)]
pub struct PaymentView {
    /// Scheme of the rail that verified the payment.
    pub scheme: String,
    /// Price charged for this invocation, in USD.
    pub required_usd: f64,
    /// Rail-specific amount (atomic units or USD decimal string).
    pub amount: String,
    /// Currency symbol of the rail.
    pub currency: String,
    /// Payer address, when known.
    pub payer: Option<String>,
}

/// Contract implemented by every tool.
///
/// Implementations are registered once at startup and invoked through
/// [`Tool::run`], which receives an owned [`ToolContext`] and returns a
/// `'static` future so the driver can spawn it.
pub trait Tool: Send + Sync {
    /// Stable wire-visible name (snake_case, unique).
    fn name(&self) -> &'static str;

    /// Short human description for clients.
    fn description(&self) -> &'static str;

    /// JSON schema of accepted input. Property names are camelCase.
    fn input_schema(&self) -> Value;

    /// JSON schema of the terminal structured payload, if declared.
    fn output_schema(&self) -> Option<Value> {
        None
    }

    /// Pricing declaration.
    fn pricing(&self) -> Pricing {
        Pricing::Free
    }

    /// Validates the translated (snake_case) argument object.
    ///
    /// Runs before any stream is opened; failures surface as JSON-RPC
    /// invalid-params errors with the returned detail.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the violation.
    fn validate_params(&self, args: &Value) -> Result<(), String>;

    /// Executes the tool, emitting frames through `ctx`.
    ///
    /// The handler must emit exactly one terminal frame; returning without
    /// one is a contract violation the driver surfaces as an internal
    /// error frame.
    fn run(&self, ctx: ToolContext) -> BoxFuture<'static, ()>;

    /// Builds the wire descriptor for `tools/list`.
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_owned(),
            description: self.description().to_owned(),
            input_schema: self.input_schema(),
            output_schema: self.output_schema(),
            pricing: Some(self.pricing().advert()),
        }
    }
}

/// Per-invocation execution context handed to [`Tool::run`].
#[derive(Debug, Clone)]
pub struct ToolContext {
    tool: String,
    params: Value,
    frames: mpsc::Sender<Frame>,
    cancelled: Arc<AtomicBool>,
    payment: Option<PaymentView>,
}

impl ToolContext {
    /// Creates a context. Called by the streaming driver.
    #[must_use]
    pub fn new(
        tool: impl Into<String>,
        params: Value,
        frames: mpsc::Sender<Frame>,
        cancelled: Arc<AtomicBool>,
        payment: Option<PaymentView>,
    ) -> Self {
        Self {
            tool: tool.into(),
            params,
            frames,
            cancelled,
            payment,
        }
    }

    /// The validated, snake_case argument object.
    #[must_use]
    pub fn params(&self) -> &Value {
        &self.params
    }

    /// Deserializes the argument object into a typed parameter struct.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error; [`Tool::validate_params`] ran
    /// before the stream opened, so this only fails on a handler whose
    /// parameter type diverges from its declared validation.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.params.clone())
    }

    /// The verified payment backing this invocation, if the tool is priced.
    #[must_use]
    pub fn payment(&self) -> Option<&PaymentView> {
        self.payment.as_ref()
    }

    /// Returns `true` once the client has cancelled this request.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Emits a progress frame.
    pub async fn progress(&self, progress: u64, total: Option<u64>, message: &str) {
        self.send(Frame::Progress {
            progress,
            total,
            message: (!message.is_empty()).then(|| message.to_owned()),
        })
        .await;
    }

    /// Emits a log frame, mirroring it to the server log.
    pub async fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(tool = %self.tool, "{message}"),
            LogLevel::Info => tracing::info!(tool = %self.tool, "{message}"),
            LogLevel::Warning => tracing::warn!(tool = %self.tool, "{message}"),
            LogLevel::Error => tracing::error!(tool = %self.tool, "{message}"),
        }
        self.send(Frame::Log {
            level,
            message: message.to_owned(),
        })
        .await;
    }

    /// Emits the terminal structured-success frame.
    ///
    /// `result` keys are written snake_case here; the driver translates
    /// them to camelCase at the wire boundary.
    pub async fn structured(&self, result: Value, summary: Option<String>) {
        self.send(Frame::Structured { result, summary }).await;
    }

    /// Emits a terminal error frame with an explicit code.
    pub async fn error_with_code(&self, code: ErrorCode, message: &str) {
        self.send(Frame::Error {
            code,
            message: message.to_owned(),
            data: None,
        })
        .await;
    }

    /// Emits a terminal execution-failure frame.
    pub async fn error(&self, message: &str) {
        self.error_with_code(ErrorCode::ExecutionFailed, message).await;
    }

    async fn send(&self, frame: Frame) {
        // The driver may have closed the channel (client gone, or a frame
        // after terminal); the handler keeps running either way.
        if self.frames.send(frame).await.is_err() {
            tracing::debug!(tool = %self.tool, "frame dropped: stream closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct EchoParams {
        user_input: String,
    }

    fn context(params: Value) -> (ToolContext, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(8);
        let ctx = ToolContext::new("echo", params, tx, Arc::new(AtomicBool::new(false)), None);
        (ctx, rx)
    }

    #[tokio::test]
    async fn test_params_as_typed() {
        let (ctx, _rx) = context(json!({"user_input": "hi"}));
        let params: EchoParams = ctx.params_as().unwrap();
        assert_eq!(params.user_input, "hi");
    }

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (ctx, mut rx) = context(json!({}));
        ctx.progress(1, Some(2), "first").await;
        ctx.log(LogLevel::Info, "second").await;
        ctx.structured(json!({"done": true}), None).await;

        assert!(matches!(rx.recv().await, Some(Frame::Progress { progress: 1, .. })));
        assert!(matches!(rx.recv().await, Some(Frame::Log { .. })));
        assert!(matches!(rx.recv().await, Some(Frame::Structured { .. })));
    }

    #[tokio::test]
    async fn test_send_after_close_is_silent() {
        let (ctx, rx) = context(json!({}));
        drop(rx);
        ctx.error("too late").await;
    }

    #[tokio::test]
    async fn test_cancel_flag_visible() {
        let (tx, _rx) = mpsc::channel(1);
        let flag = Arc::new(AtomicBool::new(false));
        let ctx = ToolContext::new("echo", json!({}), tx, Arc::clone(&flag), None);
        assert!(!ctx.is_cancelled());
        flag.store(true, Ordering::Relaxed);
        assert!(ctx.is_cancelled());
    }
}
