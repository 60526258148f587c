//! Streaming tool-call driver.
//!
//! Drives one handler execution: frames flow from the handler through a
//! bounded channel and out to the client. The driver enforces the framing
//! contract (exactly one terminal frame, nothing after it), polls the
//! cancel signal at every frame boundary, and runs the post-stream
//! epilogue in order: record execution time, emit telemetry, settle.
//!
//! Frames are forwarded in the exact order the handler yielded them;
//! structured payload keys are translated to camelCase on the way out.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::response::sse::Event;
use cmcp::gate::{PaymentGate, PaymentReceipt};
use cmcp::request::{RequestEntry, RequestManager, RequestState};
use cmcp::telemetry::{DcapEmitter, PerfRecord};
use cmcp::tool::{Tool, ToolContext};
use cmcp_proto::case::keys_to_camel;
use cmcp_proto::frame::Frame;
use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// Ordered frame stream for one `tools/call`.
pub type FrameStream = ReceiverStream<Frame>;

const FRAME_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 16;

/// Serializes a frame stream into SSE events (`data: <json>` per frame).
pub fn into_sse(frames: FrameStream) -> impl Stream<Item = Result<Event, Infallible>> {
    frames.map(|frame| {
        let data = serde_json::to_string(&frame).unwrap_or_default();
        Ok(Event::default().data(data))
    })
}

/// How the execution ended, as observed at the frame boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failed,
    Cancelled,
}

/// Starts a tool execution and returns its frame stream.
///
/// The gate has already admitted this call; `receipt` is present exactly
/// when a payment was verified and must be settled on success.
pub fn run_tool_call(
    requests: Arc<RequestManager>,
    gate: Arc<PaymentGate>,
    telemetry: Option<DcapEmitter>,
    tool: Arc<dyn Tool>,
    entry: Arc<RequestEntry>,
    args: Value,
    receipt: Option<PaymentReceipt>,
) -> FrameStream {
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

    tokio::spawn(drive(
        requests, gate, telemetry, tool, entry, args, receipt, event_tx,
    ));

    ReceiverStream::new(event_rx)
}

#[allow(clippy::too_many_arguments)]
async fn drive(
    requests: Arc<RequestManager>,
    gate: Arc<PaymentGate>,
    telemetry: Option<DcapEmitter>,
    tool: Arc<dyn Tool>,
    entry: Arc<RequestEntry>,
    args: Value,
    receipt: Option<PaymentReceipt>,
    event_tx: mpsc::Sender<Frame>,
) {
    let tool_name = tool.name().to_owned();
    let started = Instant::now();

    let (frame_tx, mut frame_rx) = mpsc::channel(FRAME_BUFFER);
    let ctx = ToolContext::new(
        tool_name.clone(),
        args.clone(),
        frame_tx,
        entry.cancel_flag(),
        receipt.as_ref().map(PaymentReceipt::view),
    );

    entry.set_state(RequestState::Executing);
    let handler = tokio::spawn(tool.run(ctx));

    let mut outcome = None;
    while let Some(frame) = frame_rx.recv().await {
        // The cancel signal wins over whatever the handler produced at
        // this boundary; the handler is abandoned, never killed earlier.
        if entry.is_cancelled() {
            let _ = event_tx.send(Frame::cancelled()).await;
            handler.abort();
            outcome = Some(Outcome::Cancelled);
            break;
        }

        let frame = match frame {
            Frame::Structured { result, summary } => {
                outcome = Some(Outcome::Success);
                Frame::Structured {
                    result: keys_to_camel(&result),
                    summary,
                }
            }
            Frame::Error { .. } => {
                outcome = Some(Outcome::Failed);
                frame
            }
            other => other,
        };

        let terminal = frame.is_terminal();
        // A failed send means the client dropped the stream; execution
        // and the epilogue continue regardless.
        let _ = event_tx.send(frame).await;
        if terminal {
            break;
        }
    }

    // Channel closed without a terminal frame: the handler returned early
    // or observed cancellation and bailed out.
    let outcome = match outcome {
        Some(outcome) => outcome,
        None if entry.is_cancelled() => {
            let _ = event_tx.send(Frame::cancelled()).await;
            Outcome::Cancelled
        }
        None => {
            tracing::error!(tool = %tool_name, "handler finished without a terminal frame");
            let _ = event_tx
                .send(Frame::internal("Handler produced no terminal frame"))
                .await;
            Outcome::Failed
        }
    };

    // Close the stream before the epilogue.
    drop(event_tx);

    let exec_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let success = outcome == Outcome::Success;
    tracing::info!(tool = %tool_name, exec_ms, success, "tool call finished");

    if success && receipt.is_some() {
        entry.set_state(RequestState::Settling);
    }

    if let Some(emitter) = &telemetry {
        emitter.emit_perf(PerfRecord {
            tool: tool_name.clone(),
            exec_ms,
            success,
            args,
            cost_paid: receipt.as_ref().filter(|_| success).map(|r| r.required_usd),
            currency: receipt.as_ref().filter(|_| success).map(|r| r.currency.clone()),
            payer: receipt.as_ref().and_then(|r| r.payer.clone()),
        });
    }

    if success {
        if let Some(receipt) = &receipt {
            match gate.settle(receipt).await {
                Ok(settlement) if settlement.is_settled() => {
                    tracing::info!(
                        tool = %tool_name,
                        tx_ref = settlement.tx_ref.as_deref().unwrap_or(""),
                        "payment settled"
                    );
                }
                Ok(settlement) => {
                    let reason = settlement.reason.unwrap_or_else(|| "unknown".to_owned());
                    tracing::error!(tool = %tool_name, "settlement failed: {reason}");
                    if let Some(emitter) = &telemetry {
                        emitter.emit_settlement_failure(&tool_name, &reason);
                    }
                }
                Err(e) => {
                    tracing::error!(tool = %tool_name, "settlement error: {e}");
                    if let Some(emitter) = &telemetry {
                        emitter.emit_settlement_failure(&tool_name, &e.to_string());
                    }
                }
            }
        }
    }

    let final_state = match outcome {
        Outcome::Success => RequestState::Completed,
        Outcome::Failed => RequestState::Failed,
        Outcome::Cancelled => RequestState::Cancelled,
    };
    requests.complete(entry.id(), final_state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmcp::error::RailError;
    use cmcp::rail::PaymentRail;
    use cmcp::tool::BoxFuture;
    use cmcp_proto::frame::LogLevel;
    use cmcp_proto::x402::{
        PaymentEnvelope, PaymentRequirement, SettleResponse, SettlementResult, VerifyResponse,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct ScriptedTool {
        frames: &'static str,
    }

    impl Tool for ScriptedTool {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn description(&self) -> &'static str {
            "test tool"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        fn validate_params(&self, _args: &Value) -> Result<(), String> {
            Ok(())
        }

        fn run(&self, ctx: ToolContext) -> BoxFuture<'static, ()> {
            let script = self.frames;
            Box::pin(async move {
                match script {
                    "happy" => {
                        ctx.progress(1, Some(2), "step one").await;
                        ctx.progress(2, Some(2), "step two").await;
                        ctx.structured(json!({"output_data": "hi", "items_found": 2}), None)
                            .await;
                    }
                    "fails" => {
                        ctx.log(LogLevel::Warning, "about to fail").await;
                        ctx.error("domain failure").await;
                    }
                    "no_terminal" => {
                        ctx.progress(1, None, "").await;
                    }
                    "slow_loop" => {
                        for i in 0..50u64 {
                            if ctx.is_cancelled() {
                                return;
                            }
                            ctx.progress(i, Some(50), "looping").await;
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                        ctx.structured(json!({"done": true}), None).await;
                    }
                    _ => unreachable!(),
                }
            })
        }
    }

    struct CountingRail {
        settles: Arc<AtomicUsize>,
    }

    impl PaymentRail for CountingRail {
        fn scheme(&self) -> &str {
            "exact"
        }

        fn network(&self) -> &str {
            "test-net"
        }

        fn currency_symbol(&self) -> &str {
            "USDC"
        }

        fn amount_for_usd(&self, usd: f64) -> String {
            ((usd * 1_000_000.0).round() as u64).to_string()
        }

        fn requirement(&self, usd: f64, description: &str) -> PaymentRequirement {
            PaymentRequirement {
                scheme: "exact".to_owned(),
                network: "test-net".to_owned(),
                asset: "0xAsset".to_owned(),
                max_amount_required: self.amount_for_usd(usd),
                pay_to: "0xRecipient".to_owned(),
                description: description.to_owned(),
                mime_type: None,
                max_timeout_seconds: None,
            }
        }

        fn verify<'a>(
            &'a self,
            _envelope: &'a PaymentEnvelope,
            _usd: f64,
        ) -> BoxFuture<'a, Result<VerifyResponse, RailError>> {
            Box::pin(async { Ok(VerifyResponse::verified(None)) })
        }

        fn settle<'a>(
            &'a self,
            _envelope: &'a PaymentEnvelope,
            _usd: f64,
        ) -> BoxFuture<'a, Result<SettleResponse, RailError>> {
            self.settles.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {
                Ok(SettleResponse {
                    result: SettlementResult::Settled,
                    tx_ref: Some("0xtx".to_owned()),
                    reason: None,
                })
            })
        }
    }

    fn receipt(rail: Arc<CountingRail>) -> PaymentReceipt {
        PaymentReceipt {
            amount: rail.amount_for_usd(0.10),
            currency: "USDC".to_owned(),
            rail,
            required_usd: 0.10,
            payer: Some("0xPayer".to_owned()),
            envelope: PaymentEnvelope {
                x402_version: 1,
                scheme: "exact".to_owned(),
                network: "test-net".to_owned(),
                payload: json!({}),
            },
        }
    }

    fn start(
        script: &'static str,
        receipt: Option<PaymentReceipt>,
        gate: Arc<PaymentGate>,
    ) -> (Arc<RequestEntry>, FrameStream) {
        let requests = Arc::new(RequestManager::new());
        let entry = requests.register("req-1", "tools/call");
        let stream = run_tool_call(
            requests,
            gate,
            None,
            Arc::new(ScriptedTool { frames: script }),
            Arc::clone(&entry),
            json!({}),
            receipt,
        );
        (entry, stream)
    }

    async fn collect(stream: FrameStream) -> Vec<Frame> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_frames_preserve_order_with_single_terminal() {
        let gate = Arc::new(PaymentGate::new(vec![]));
        let (_entry, stream) = start("happy", None, gate);
        let frames = collect(stream).await;

        assert_eq!(frames.len(), 3);
        assert!(matches!(frames[0], Frame::Progress { progress: 1, .. }));
        assert!(matches!(frames[1], Frame::Progress { progress: 2, .. }));
        assert!(frames[2].is_terminal());
        assert_eq!(frames.iter().filter(|f| f.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_structured_payload_is_camel_cased() {
        let gate = Arc::new(PaymentGate::new(vec![]));
        let (_entry, stream) = start("happy", None, gate);
        let frames = collect(stream).await;

        let Frame::Structured { result, .. } = &frames[2] else {
            panic!("expected structured terminal");
        };
        assert_eq!(result["outputData"], json!("hi"));
        assert_eq!(result["itemsFound"], json!(2));
        assert!(result.get("output_data").is_none());
    }

    #[tokio::test]
    async fn test_missing_terminal_becomes_internal_error() {
        let gate = Arc::new(PaymentGate::new(vec![]));
        let (entry, stream) = start("no_terminal", None, gate);
        let frames = collect(stream).await;

        let last = frames.last().unwrap();
        let encoded = serde_json::to_value(last).unwrap();
        assert_eq!(encoded["type"], json!("error"));
        assert_eq!(encoded["code"], json!("internal"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(entry.state(), RequestState::Failed);
    }

    #[tokio::test]
    async fn test_cancellation_yields_cancelled_terminal_and_no_settlement() {
        let settles = Arc::new(AtomicUsize::new(0));
        let rail = Arc::new(CountingRail {
            settles: Arc::clone(&settles),
        });
        let gate = Arc::new(PaymentGate::new(vec![
            Arc::clone(&rail) as Arc<dyn PaymentRail>
        ]));
        let (entry, stream) = start("slow_loop", Some(receipt(rail)), gate);

        tokio::time::sleep(Duration::from_millis(25)).await;
        entry.cancel_flag().store(true, Ordering::SeqCst);

        let frames = collect(stream).await;
        let encoded = serde_json::to_value(frames.last().unwrap()).unwrap();
        assert_eq!(encoded["type"], json!("error"));
        assert_eq!(encoded["code"], json!("cancelled"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(settles.load(Ordering::SeqCst), 0);
        assert_eq!(entry.state(), RequestState::Cancelled);
    }

    #[tokio::test]
    async fn test_successful_priced_call_settles_exactly_once() {
        let settles = Arc::new(AtomicUsize::new(0));
        let rail = Arc::new(CountingRail {
            settles: Arc::clone(&settles),
        });
        let gate = Arc::new(PaymentGate::new(vec![
            Arc::clone(&rail) as Arc<dyn PaymentRail>
        ]));
        let (entry, stream) = start("happy", Some(receipt(rail)), gate);

        let frames = collect(stream).await;
        assert!(matches!(frames.last(), Some(Frame::Structured { .. })));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(settles.load(Ordering::SeqCst), 1);
        assert_eq!(entry.state(), RequestState::Completed);
    }

    #[tokio::test]
    async fn test_failed_execution_never_settles() {
        let settles = Arc::new(AtomicUsize::new(0));
        let rail = Arc::new(CountingRail {
            settles: Arc::clone(&settles),
        });
        let gate = Arc::new(PaymentGate::new(vec![
            Arc::clone(&rail) as Arc<dyn PaymentRail>
        ]));
        let (entry, stream) = start("fails", Some(receipt(rail)), gate);

        let frames = collect(stream).await;
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], Frame::Log { .. }));
        let encoded = serde_json::to_value(&frames[1]).unwrap();
        assert_eq!(encoded["code"], json!("execution_failed"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(settles.load(Ordering::SeqCst), 0);
        assert_eq!(entry.state(), RequestState::Failed);
    }
}
