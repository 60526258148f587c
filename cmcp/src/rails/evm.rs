//! EVM stablecoin payment rail.
//!
//! Payments are USDC transfers verified and settled by a remote x402
//! facilitator. Prices are quoted in USD and converted to the token's
//! atomic units (USDC has 6 decimals).

use std::time::Duration;

use cmcp_proto::x402::{
    PaymentEnvelope, PaymentRequirement, SettleRequest, SettleResponse, VerifyRequest,
    VerifyResponse, SCHEME_EVM_EXACT, X402_VERSION,
};

use crate::error::RailError;
use crate::rail::PaymentRail;
use crate::rails::client::FacilitatorHttp;
use crate::tool::BoxFuture;

/// USDC decimal places.
const USDC_DECIMALS: f64 = 1_000_000.0;

/// Configuration for the EVM rail.
#[derive(Debug, Clone)]
pub struct EvmRailConfig {
    /// Facilitator service base URL.
    pub facilitator_url: String,
    /// Recipient wallet address.
    pub wallet_address: String,
    /// Network name (e.g. `"base-sepolia"`).
    pub network: String,
    /// Token symbol (informational; the rail settles USDC).
    pub token: String,
    /// Verification timeout.
    pub verify_timeout: Duration,
    /// Settlement timeout.
    pub settle_timeout: Duration,
}

/// The EVM/USDC payment rail.
#[derive(Debug)]
pub struct EvmRail {
    config: EvmRailConfig,
    asset: String,
    http: FacilitatorHttp,
}

impl EvmRail {
    /// Creates the rail from its configuration.
    #[must_use]
    pub fn new(config: EvmRailConfig) -> Self {
        let http = FacilitatorHttp::new(
            &config.facilitator_url,
            config.verify_timeout,
            config.settle_timeout,
        );
        let asset = usdc_address(&config.network).to_owned();
        Self {
            config,
            asset,
            http,
        }
    }

    fn verify_request(&self, envelope: &PaymentEnvelope, usd: f64) -> VerifyRequest {
        VerifyRequest {
            x402_version: X402_VERSION,
            payment_payload: envelope.clone(),
            payment_requirements: self.requirement(usd, "MCP tool invocation"),
        }
    }
}

/// Returns the USDC contract address for a known network.
///
/// Unknown networks fall back to the Base Sepolia deployment so that a
/// misconfigured network name fails at verification rather than at startup.
fn usdc_address(network: &str) -> &'static str {
    match network {
        "base" => "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
        "ethereum" => "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
        _ => "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
    }
}

impl PaymentRail for EvmRail {
    fn scheme(&self) -> &str {
        SCHEME_EVM_EXACT
    }

    fn network(&self) -> &str {
        &self.config.network
    }

    fn currency_symbol(&self) -> &str {
        &self.config.token
    }

    fn amount_for_usd(&self, usd: f64) -> String {
        let atomic = (usd * USDC_DECIMALS).round().max(0.0) as u64;
        atomic.to_string()
    }

    fn requirement(&self, usd: f64, description: &str) -> PaymentRequirement {
        PaymentRequirement {
            scheme: SCHEME_EVM_EXACT.to_owned(),
            network: self.config.network.clone(),
            asset: self.asset.clone(),
            max_amount_required: self.amount_for_usd(usd),
            pay_to: self.config.wallet_address.clone(),
            description: description.to_owned(),
            mime_type: Some("application/json".to_owned()),
            max_timeout_seconds: Some(60),
        }
    }

    fn verify<'a>(
        &'a self,
        envelope: &'a PaymentEnvelope,
        usd: f64,
    ) -> BoxFuture<'a, Result<VerifyResponse, RailError>> {
        Box::pin(async move {
            let request = self.verify_request(envelope, usd);
            self.http.verify(&request).await
        })
    }

    fn settle<'a>(
        &'a self,
        envelope: &'a PaymentEnvelope,
        usd: f64,
    ) -> BoxFuture<'a, Result<SettleResponse, RailError>> {
        Box::pin(async move {
            let request = SettleRequest::from(self.verify_request(envelope, usd));
            self.http.settle(&request).await
        })
    }
}
