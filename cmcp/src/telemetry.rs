//! DCAP telemetry broadcasting.
//!
//! Emits one `perf_update` UDP datagram per tool invocation and periodic
//! `semantic_discover` advertisements of the tool catalogue. Emission is
//! fire-and-forget: producers enqueue onto a bounded channel and never
//! wait; a single sender task owns the socket. Records that would block
//! or cannot fit a datagram are dropped and counted, never retried.
//!
//! The configured address may be multicast or unicast; the multicast TTL
//! socket option is set only when the address class calls for it, matching
//! both deployment modes of the collector.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Map, Value};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Protocol version tag on every record.
pub const DCAP_VERSION: u32 = 2;

/// Largest datagram that avoids IP fragmentation on a typical LAN.
pub const UDP_SAFE_SIZE: usize = 1472;

/// Largest payload a single UDP datagram can carry at all.
pub const UDP_HARD_CAP: usize = 65507;

const CHANNEL_CAPACITY: usize = 256;
const ARG_PREVIEW_LEN: usize = 20;

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct DcapConfig {
    /// Collector address (multicast or unicast).
    pub target: SocketAddr,
    /// Stable server identifier (`sid` field).
    pub server_id: String,
    /// Human-readable server name.
    pub server_name: String,
    /// Interval between `semantic_discover` rounds.
    pub discover_interval: Duration,
}

/// One tool invocation's performance summary.
#[derive(Debug, Clone)]
pub struct PerfRecord {
    /// Tool that ran.
    pub tool: String,
    /// Wall-clock execution time in milliseconds.
    pub exec_ms: u64,
    /// Whether the invocation produced a structured result.
    pub success: bool,
    /// Raw tool arguments; anonymized before leaving the process.
    pub args: Value,
    /// Amount charged, when the invocation was paid and succeeded.
    pub cost_paid: Option<f64>,
    /// Currency of `cost_paid`.
    pub currency: Option<String>,
    /// Paying address, when known.
    pub payer: Option<String>,
}

/// Handle for enqueuing telemetry records.
#[derive(Clone)]
pub struct DcapEmitter {
    tx: mpsc::Sender<Value>,
    dropped: Arc<AtomicU64>,
    config: DcapConfig,
}

impl std::fmt::Debug for DcapEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DcapEmitter")
            .field("target", &self.config.target)
            .field("server_id", &self.config.server_id)
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .finish()
    }
}

impl DcapEmitter {
    /// Starts the sender task and returns the emitter handle.
    #[must_use]
    pub fn start(config: DcapConfig) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let dropped = Arc::new(AtomicU64::new(0));

        tokio::spawn(sender_task(config.target, rx, Arc::clone(&dropped)));

        Self {
            tx,
            dropped,
            config,
        }
    }

    /// The telemetry configuration this emitter was started with.
    #[must_use]
    pub fn config(&self) -> &DcapConfig {
        &self.config
    }

    /// Records dropped due to backpressure or oversize.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Enqueues a `perf_update` record. Never blocks.
    pub fn emit_perf(&self, record: PerfRecord) {
        let mut message = json!({
            "v": DCAP_VERSION,
            "t": "perf_update",
            "ts": unix_now(),
            "sid": self.config.server_id,
            "tool": record.tool,
            "exec_ms": record.exec_ms,
            "success": record.success,
            "ctx": {"args": anonymize_args(&record.args)},
        });

        if let Some(object) = message.as_object_mut() {
            if let Some(cost) = record.cost_paid {
                object.insert("cost_paid".to_owned(), json!(cost));
                object.insert(
                    "currency".to_owned(),
                    json!(record.currency.as_deref().unwrap_or("USDC")),
                );
            }
            if let Some(payer) = record.payer {
                object.insert("payer".to_owned(), json!(payer));
            }
        }

        self.enqueue(message);
    }

    /// Enqueues a `settlement_failed` record. Never blocks.
    pub fn emit_settlement_failure(&self, tool: &str, reason: &str) {
        self.enqueue(json!({
            "v": DCAP_VERSION,
            "t": "settlement_failed",
            "ts": unix_now(),
            "sid": self.config.server_id,
            "tool": tool,
            "reason": reason,
        }));
    }

    /// Enqueues one `semantic_discover` advertisement. Never blocks.
    ///
    /// `tool` carries the catalogue entry; `connector` describes how to
    /// reach the server (transport, auth, protocol).
    pub fn emit_discovery(&self, tool: Value, connector: Value) {
        self.enqueue(json!({
            "v": DCAP_VERSION,
            "t": "semantic_discover",
            "ts": unix_now(),
            "sid": self.config.server_id,
            "server_name": self.config.server_name,
            "tool": tool,
            "connector": connector,
        }));
    }

    fn enqueue(&self, record: Value) {
        if self.tx.try_send(record).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

async fn sender_task(target: SocketAddr, mut rx: mpsc::Receiver<Value>, dropped: Arc<AtomicU64>) {
    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(socket) => socket,
        Err(e) => {
            tracing::warn!("telemetry socket unavailable: {e}");
            while rx.recv().await.is_some() {
                dropped.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }
    };

    if target.ip().is_multicast() {
        if let Err(e) = socket.set_multicast_ttl_v4(2) {
            tracing::debug!("could not set multicast TTL: {e}");
        }
    }

    while let Some(mut record) = rx.recv().await {
        match encode_bounded(&mut record) {
            Some(bytes) => {
                if let Err(e) = socket.send_to(&bytes, target).await {
                    tracing::debug!("telemetry send failed: {e}");
                }
            }
            None => {
                tracing::warn!("telemetry record exceeds datagram cap, dropped");
                dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Anonymizes tool arguments before they leave the process.
///
/// Strings are truncated to a short preview, collections are summarized
/// to their size, scalars pass through.
#[must_use]
pub fn anonymize_args(args: &Value) -> Value {
    let Value::Object(map) = args else {
        return json!({});
    };

    let mut out = Map::with_capacity(map.len());
    for (key, value) in map {
        let masked = match value {
            Value::String(s) if s.chars().count() > ARG_PREVIEW_LEN => {
                let preview: String = s.chars().take(ARG_PREVIEW_LEN).collect();
                Value::String(format!("{preview}..."))
            }
            Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null => value.clone(),
            Value::Array(items) => Value::String(format!("[{} items]", items.len())),
            Value::Object(fields) => Value::String(format!("{{{} fields}}", fields.len())),
        };
        out.insert(key.clone(), masked);
    }
    Value::Object(out)
}

/// Serializes a record within the datagram limits.
///
/// Over [`UDP_SAFE_SIZE`], the heaviest payload fields (`ctx.args`, the
/// tool's input schema) are emptied first; a record still over
/// [`UDP_HARD_CAP`] is unsendable and returns `None`.
fn encode_bounded(record: &mut Value) -> Option<Vec<u8>> {
    let mut bytes = serde_json::to_vec(record).ok()?;

    if bytes.len() > UDP_SAFE_SIZE {
        let mut trimmed = false;
        if let Some(args) = record.pointer_mut("/ctx/args") {
            *args = json!({});
            trimmed = true;
        }
        if let Some(tool) = record.pointer_mut("/tool") {
            if let Some(object) = tool.as_object_mut() {
                trimmed |= object.remove("inputSchema").is_some();
            }
        }
        if trimmed {
            bytes = serde_json::to_vec(record).ok()?;
        }
    }

    (bytes.len() <= UDP_HARD_CAP).then_some(bytes)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
