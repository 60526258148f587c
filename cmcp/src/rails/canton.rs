//! Canton Coin payment rail.
//!
//! Canton Coin is quoted 1:1 against USD; amounts travel as decimal
//! strings to preserve precision. The payee is a Canton party identifier
//! (`Party::<hex>`), and verification/settlement are delegated to the
//! Canton facilitator service.

use std::time::Duration;

use cmcp_proto::x402::{
    PaymentEnvelope, PaymentRequirement, SettleRequest, SettleResponse, VerifyRequest,
    VerifyResponse, SCHEME_CANTON_EXACT, X402_VERSION,
};

use crate::error::RailError;
use crate::rail::PaymentRail;
use crate::rails::client::FacilitatorHttp;
use crate::tool::BoxFuture;

/// Configuration for the Canton rail.
#[derive(Debug, Clone)]
pub struct CantonRailConfig {
    /// Facilitator service base URL.
    pub facilitator_url: String,
    /// Receiving party identifier (`Party::<hex>`).
    pub payee_party: String,
    /// Canton network name (e.g. `"canton-testnet"`).
    pub network: String,
    /// Verification timeout.
    pub verify_timeout: Duration,
    /// Settlement timeout.
    pub settle_timeout: Duration,
}

/// The Canton Coin payment rail.
#[derive(Debug)]
pub struct CantonRail {
    config: CantonRailConfig,
    http: FacilitatorHttp,
}

impl CantonRail {
    /// Creates the rail from its configuration.
    #[must_use]
    pub fn new(config: CantonRailConfig) -> Self {
        let http = FacilitatorHttp::new(
            &config.facilitator_url,
            config.verify_timeout,
            config.settle_timeout,
        );
        Self { config, http }
    }

    fn verify_request(&self, envelope: &PaymentEnvelope, usd: f64) -> VerifyRequest {
        VerifyRequest {
            x402_version: X402_VERSION,
            payment_payload: envelope.clone(),
            payment_requirements: self.requirement(usd, "MCP tool invocation"),
        }
    }
}

/// Formats a USD amount as a minimal decimal string (`0.1`, not `0.100000`).
fn decimal_string(usd: f64) -> String {
    let formatted = format!("{:.6}", usd.max(0.0));
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_owned()
    } else {
        trimmed.to_owned()
    }
}

impl PaymentRail for CantonRail {
    fn scheme(&self) -> &str {
        SCHEME_CANTON_EXACT
    }

    fn network(&self) -> &str {
        &self.config.network
    }

    fn currency_symbol(&self) -> &str {
        "CC"
    }

    fn amount_for_usd(&self, usd: f64) -> String {
        decimal_string(usd)
    }

    fn requirement(&self, usd: f64, description: &str) -> PaymentRequirement {
        PaymentRequirement {
            scheme: SCHEME_CANTON_EXACT.to_owned(),
            network: self.config.network.clone(),
            asset: "CC".to_owned(),
            max_amount_required: self.amount_for_usd(usd),
            pay_to: self.config.payee_party.clone(),
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

#[cfg(test)]
mod tests {
    use super::*;

    fn rail() -> CantonRail {
        CantonRail::new(CantonRailConfig {
            facilitator_url: "http://127.0.0.1:4022".to_owned(),
            payee_party: "Party::deadbeef".to_owned(),
            network: "canton-testnet".to_owned(),
            verify_timeout: Duration::from_secs(3),
            settle_timeout: Duration::from_secs(30),
        })
    }

    #[test]
    fn test_decimal_strings_are_minimal() {
        assert_eq!(decimal_string(0.1), "0.1");
        assert_eq!(decimal_string(0.25), "0.25");
        assert_eq!(decimal_string(1.0), "1");
        assert_eq!(decimal_string(0.0475), "0.0475");
        assert_eq!(decimal_string(0.0), "0");
    }

    #[test]
    fn test_requirement_shape() {
        let req = rail().requirement(0.10, "MCP Tool: validate");
        assert_eq!(req.scheme, "exact-canton");
        assert_eq!(req.asset, "CC");
        assert_eq!(req.max_amount_required, "0.1");
        assert_eq!(req.pay_to, "Party::deadbeef");
    }

    #[test]
    fn test_currency_symbol() {
        assert_eq!(rail().currency_symbol(), "CC");
    }
}
