//! Periodic `semantic_discover` broadcasting.
//!
//! Advertises every registered tool over the telemetry channel: once at
//! startup, then on the configured interval. Each record carries the
//! tool's catalogue entry plus a connector block describing how to reach
//! the server and how to pay for it.

use std::sync::Arc;

use cmcp::config::ServerConfig;
use cmcp::gate::PaymentGate;
use cmcp::registry::ToolRegistry;
use cmcp::telemetry::DcapEmitter;
use cmcp_proto::mcp::PROTOCOL_VERSION;
use serde_json::{json, Value};

/// Builds the connector block shared by all discovery records.
#[must_use]
pub fn connector_block(config: &ServerConfig, gate: &PaymentGate) -> Value {
    let auth = if gate.is_enabled() {
        let rails: Vec<Value> = gate
            .rails()
            .iter()
            .map(|rail| {
                json!({
                    "scheme": rail.scheme(),
                    "network": rail.network(),
                    "currency": rail.currency_symbol(),
                })
            })
            .collect();
        json!({"type": "x402", "details": {"rails": rails}})
    } else {
        json!({"type": "none"})
    };

    json!({
        "transport": {"type": "sse", "endpoint": config.mcp_endpoint()},
        "auth": auth,
        "mcp": {
            "protocolVersion": PROTOCOL_VERSION,
            "methods": [
                "initialize", "tools/list", "tools/call",
                "resources/list", "resources/read",
                "prompts/list", "prompts/get", "ping",
            ],
        },
    })
}

/// Broadcasts one discovery round: one record per registered tool.
pub fn broadcast_catalogue(emitter: &DcapEmitter, registry: &ToolRegistry, connector: &Value) {
    for tool in registry.iter() {
        let entry = serde_json::to_value(tool.descriptor()).unwrap_or_default();
        emitter.emit_discovery(entry, connector.clone());
    }
}

/// Spawns the broadcast loop: one round immediately, then one per
/// configured interval.
pub fn spawn_broadcast(
    emitter: DcapEmitter,
    registry: Arc<ToolRegistry>,
    config: Arc<ServerConfig>,
    gate: Arc<PaymentGate>,
) {
    tokio::spawn(async move {
        let connector = connector_block(&config, &gate);
        let interval = emitter.config().discover_interval;
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            broadcast_catalogue(&emitter, &registry, &connector);
            tracing::debug!(tools = registry.len(), "discovery round broadcast");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmcp::rails::evm::{EvmRail, EvmRailConfig};
    use std::collections::HashMap;
    use std::time::Duration;

    fn config() -> ServerConfig {
        ServerConfig::from_vars(&HashMap::new()).unwrap()
    }

    #[test]
    fn test_connector_without_rails_is_unauthenticated() {
        let connector = connector_block(&config(), &PaymentGate::new(vec![]));
        assert_eq!(connector["auth"]["type"], json!("none"));
        assert_eq!(connector["transport"]["type"], json!("sse"));
        assert_eq!(
            connector["transport"]["endpoint"],
            json!("http://localhost:7284/mcp")
        );
    }

    #[test]
    fn test_connector_lists_enabled_rails() {
        let rail = EvmRail::new(EvmRailConfig {
            facilitator_url: "http://127.0.0.1:4021".to_owned(),
            wallet_address: "0xRecipient".to_owned(),
            network: "base-sepolia".to_owned(),
            token: "USDC".to_owned(),
            verify_timeout: Duration::from_secs(3),
            settle_timeout: Duration::from_secs(30),
        });
        let gate = PaymentGate::new(vec![Arc::new(rail)]);

        let connector = connector_block(&config(), &gate);
        assert_eq!(connector["auth"]["type"], json!("x402"));
        let rails = connector["auth"]["details"]["rails"].as_array().unwrap();
        assert_eq!(rails.len(), 1);
        assert_eq!(rails[0]["scheme"], json!("exact"));
        assert_eq!(rails[0]["currency"], json!("USDC"));
    }
}
