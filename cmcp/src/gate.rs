//! The HTTP-402 payment gate.
//!
//! For each `tools/call` the gate prices the invocation, demands payment
//! when the price is positive, routes the client's envelope to the
//! matching rail for verification, and settles after successful
//! execution. Everything here runs before any SSE stream is opened; once
//! a stream exists, payment can no longer fail the request.
//!
//! Rails are stored in registration order, which pins the `accepts`
//! ordering in 402 bodies (EVM first, Canton second).

use std::sync::Arc;

use cmcp_proto::encoding::decode_base64_json;
use cmcp_proto::x402::{PaymentEnvelope, PaymentRequired, SettleResponse};
use http::HeaderMap;
use serde_json::Value;

use crate::error::RailError;
use crate::pricing::Pricing;
use crate::rail::PaymentRail;
use crate::tool::PaymentView;

/// Header carrying the client's payment envelope.
pub const PAYMENT_HEADER: &str = "X-PAYMENT";

/// Header carrying the internal bypass key.
pub const INTERNAL_KEY_HEADER: &str = "X-Internal-API-Key";

/// A verified payment, held until settlement.
pub struct PaymentReceipt {
    /// The rail that verified the payment and will settle it.
    pub rail: Arc<dyn PaymentRail>,
    /// Price charged, in USD.
    pub required_usd: f64,
    /// Rail-specific wire amount.
    pub amount: String,
    /// Currency symbol of the rail.
    pub currency: String,
    /// Payer address, from the facilitator or the envelope.
    pub payer: Option<String>,
    /// The verified envelope, re-submitted at settlement.
    pub envelope: PaymentEnvelope,
}

impl std::fmt::Debug for PaymentReceipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentReceipt")
            .field("scheme", &self.envelope.scheme)
            .field("required_usd", &self.required_usd)
            .field("amount", &self.amount)
            .field("currency", &self.currency)
            .field("payer", &self.payer)
            .finish_non_exhaustive()
    }
}

impl PaymentReceipt {
    /// Read-only view exposed to the handler's context.
    #[must_use]
    pub fn view(&self) -> PaymentView {
        PaymentView {
            scheme: self.envelope.scheme.clone(),
            required_usd: self.required_usd,
            amount: self.amount.clone(),
            currency: self.currency.clone(),
            payer: self.payer.clone(),
        }
    }
}

/// Outcome of the pre-execution payment check.
#[derive(Debug)]
pub enum GateOutcome {
    /// The invocation is free (zero price, no rails, or internal bypass).
    Free,

    /// Payment verified; execute, then settle with the receipt.
    Verified(Box<PaymentReceipt>),

    /// Payment missing or rejected; respond HTTP 402 with this body.
    Required(PaymentRequired),

    /// The envelope named an unknown scheme; respond HTTP 400.
    UnknownScheme(String),
}

/// The payment gate.
pub struct PaymentGate {
    rails: Vec<Arc<dyn PaymentRail>>,
    internal_key: Option<String>,
}

impl std::fmt::Debug for PaymentGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let schemes: Vec<&str> = self.rails.iter().map(|r| r.scheme()).collect();
        f.debug_struct("PaymentGate")
            .field("rails", &schemes)
            .field("has_internal_key", &self.internal_key.is_some())
            .finish()
    }
}

impl PaymentGate {
    /// Creates a gate over the enabled rails, in `accepts` order.
    #[must_use]
    pub fn new(rails: Vec<Arc<dyn PaymentRail>>) -> Self {
        Self {
            rails,
            internal_key: None,
        }
    }

    /// Sets the internal bypass key.
    #[must_use]
    pub fn with_internal_key(mut self, key: Option<String>) -> Self {
        self.internal_key = key.filter(|k| !k.is_empty());
        self
    }

    /// Returns `true` if at least one rail is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.rails.is_empty()
    }

    /// The enabled rails, in `accepts` order.
    #[must_use]
    pub fn rails(&self) -> &[Arc<dyn PaymentRail>] {
        &self.rails
    }

    /// Runs the pre-execution payment check for one tool call.
    pub async fn check(
        &self,
        headers: &HeaderMap,
        tool_name: &str,
        pricing: &Pricing,
        args: &Value,
    ) -> GateOutcome {
        let usd = pricing.price_for(args);
        if usd <= 0.0 || self.rails.is_empty() {
            return GateOutcome::Free;
        }

        if self.is_bypassed(headers) {
            tracing::debug!(tool = %tool_name, "internal key verified, payment bypassed");
            return GateOutcome::Free;
        }

        let description = format!("MCP Tool: {tool_name}");

        let Some(header) = headers.get(PAYMENT_HEADER) else {
            tracing::info!(tool = %tool_name, usd, "payment required");
            return GateOutcome::Required(self.demand(usd, &description, None));
        };

        let envelope: PaymentEnvelope = match decode_base64_json(header.as_bytes()) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(tool = %tool_name, "invalid payment header: {e}");
                return GateOutcome::Required(
                    self.demand(usd, &description, Some("Invalid payment header format".to_owned())),
                );
            }
        };

        let Some(rail) = self.rail_for_scheme(&envelope.scheme) else {
            return GateOutcome::UnknownScheme(envelope.scheme);
        };

        match rail.verify(&envelope, usd).await {
            Ok(response) if response.is_verified() => {
                tracing::info!(tool = %tool_name, usd, scheme = %envelope.scheme, "payment verified");
                let payer = response.payer.or_else(|| envelope.payer_address());
                GateOutcome::Verified(Box::new(PaymentReceipt {
                    amount: rail.amount_for_usd(usd),
                    currency: rail.currency_symbol().to_owned(),
                    rail: Arc::clone(rail),
                    required_usd: usd,
                    payer,
                    envelope,
                }))
            }
            Ok(response) => {
                let reason = response.reason.unwrap_or_else(|| "payment rejected".to_owned());
                tracing::warn!(tool = %tool_name, "payment verification failed: {reason}");
                GateOutcome::Required(self.demand(usd, &description, Some(reason)))
            }
            Err(e) => {
                tracing::warn!(tool = %tool_name, "payment verification error: {e}");
                GateOutcome::Required(self.demand(usd, &description, Some(e.to_string())))
            }
        }
    }

    /// Settles a verified payment. Attempted exactly once per receipt,
    /// after successful execution; failures are logged by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`RailError`] if the facilitator call fails.
    pub async fn settle(&self, receipt: &PaymentReceipt) -> Result<SettleResponse, RailError> {
        receipt.rail.settle(&receipt.envelope, receipt.required_usd).await
    }

    /// Builds the 402 body listing one requirement per enabled rail.
    fn demand(&self, usd: f64, description: &str, error: Option<String>) -> PaymentRequired {
        let accepts = self
            .rails
            .iter()
            .map(|rail| rail.requirement(usd, description))
            .collect();

        let mut body = PaymentRequired::new(accepts);
        if let Some(error) = error {
            body = body.with_error(error);
        }
        body
    }

    fn rail_for_scheme(&self, scheme: &str) -> Option<&Arc<dyn PaymentRail>> {
        self.rails.iter().find(|rail| rail.scheme() == scheme)
    }

    fn is_bypassed(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.internal_key else {
            return false;
        };
        headers
            .get(INTERNAL_KEY_HEADER)
            .is_some_and(|presented| constant_time_eq(presented.as_bytes(), expected.as_bytes()))
    }
}

/// Constant-time byte comparison for the bypass key.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::BoxFuture;
    use cmcp_proto::encoding::encode_json_base64;
    use cmcp_proto::x402::{PaymentRequirement, SettlementResult, VerifyResponse};
    use http::HeaderValue;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRail {
        scheme: &'static str,
        verdict: VerifyResponse,
        settles: AtomicUsize,
    }

    impl FakeRail {
        fn verified(scheme: &'static str) -> Self {
            Self {
                scheme,
                verdict: VerifyResponse::verified(Some("0xPayer".to_owned())),
                settles: AtomicUsize::new(0),
            }
        }

        fn rejected(scheme: &'static str, reason: &str) -> Self {
            Self {
                scheme,
                verdict: VerifyResponse::rejected(reason),
                settles: AtomicUsize::new(0),
            }
        }
    }

    impl PaymentRail for FakeRail {
        fn scheme(&self) -> &str {
            self.scheme
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
                scheme: self.scheme.to_owned(),
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
            let verdict = self.verdict.clone();
            Box::pin(async move { Ok(verdict) })
        }

        fn settle<'a>(
            &'a self,
            _envelope: &'a PaymentEnvelope,
            _usd: f64,
        ) -> BoxFuture<'a, Result<SettleResponse, RailError>> {
            self.settles.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                Ok(SettleResponse {
                    result: SettlementResult::Settled,
                    tx_ref: Some("0xtx".to_owned()),
                    reason: None,
                })
            })
        }
    }

    fn payment_header(scheme: &str) -> HeaderValue {
        let envelope = PaymentEnvelope {
            x402_version: 1,
            scheme: scheme.to_owned(),
            network: "test-net".to_owned(),
            payload: json!({"authorization": {"from": "0xFromEnvelope"}}),
        };
        HeaderValue::from_str(&encode_json_base64(&envelope).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_free_tool_bypasses_gate() {
        let gate = PaymentGate::new(vec![Arc::new(FakeRail::verified("exact"))]);
        let outcome = gate
            .check(&HeaderMap::new(), "echo", &Pricing::Free, &json!({}))
            .await;
        assert!(matches!(outcome, GateOutcome::Free));
    }

    #[tokio::test]
    async fn test_no_rails_means_free() {
        let gate = PaymentGate::new(vec![]);
        let outcome = gate
            .check(&HeaderMap::new(), "validate", &Pricing::fixed(0.10), &json!({}))
            .await;
        assert!(matches!(outcome, GateOutcome::Free));
    }

    #[tokio::test]
    async fn test_missing_header_demands_both_rails_in_order() {
        let gate = PaymentGate::new(vec![
            Arc::new(FakeRail::verified("exact")),
            Arc::new(FakeRail::verified("exact-canton")),
        ]);
        let outcome = gate
            .check(&HeaderMap::new(), "validate", &Pricing::fixed(0.10), &json!({}))
            .await;

        let GateOutcome::Required(body) = outcome else {
            panic!("expected Required");
        };
        assert_eq!(body.accepts.len(), 2);
        assert_eq!(body.accepts[0].scheme, "exact");
        assert_eq!(body.accepts[1].scheme, "exact-canton");
        assert_eq!(body.accepts[0].max_amount_required, "100000");
        assert!(body.error.is_none());
    }

    #[tokio::test]
    async fn test_garbled_header_demands_with_reason() {
        let gate = PaymentGate::new(vec![Arc::new(FakeRail::verified("exact"))]);
        let mut headers = HeaderMap::new();
        headers.insert(PAYMENT_HEADER, HeaderValue::from_static("!!not-base64!!"));

        let outcome = gate
            .check(&headers, "validate", &Pricing::fixed(0.10), &json!({}))
            .await;
        let GateOutcome::Required(body) = outcome else {
            panic!("expected Required");
        };
        assert_eq!(body.error.as_deref(), Some("Invalid payment header format"));
    }

    #[tokio::test]
    async fn test_unknown_scheme_is_bad_request() {
        let gate = PaymentGate::new(vec![Arc::new(FakeRail::verified("exact"))]);
        let mut headers = HeaderMap::new();
        headers.insert(PAYMENT_HEADER, payment_header("exact-solana"));

        let outcome = gate
            .check(&headers, "validate", &Pricing::fixed(0.10), &json!({}))
            .await;
        assert!(matches!(outcome, GateOutcome::UnknownScheme(s) if s == "exact-solana"));
    }

    #[tokio::test]
    async fn test_rejected_verification_returns_reason() {
        let gate = PaymentGate::new(vec![Arc::new(FakeRail::rejected("exact", "insufficient"))]);
        let mut headers = HeaderMap::new();
        headers.insert(PAYMENT_HEADER, payment_header("exact"));

        let outcome = gate
            .check(&headers, "validate", &Pricing::fixed(0.10), &json!({}))
            .await;
        let GateOutcome::Required(body) = outcome else {
            panic!("expected Required");
        };
        assert_eq!(body.error.as_deref(), Some("insufficient"));
    }

    #[tokio::test]
    async fn test_verified_payment_builds_receipt() {
        let gate = PaymentGate::new(vec![Arc::new(FakeRail::verified("exact"))]);
        let mut headers = HeaderMap::new();
        headers.insert(PAYMENT_HEADER, payment_header("exact"));

        let outcome = gate
            .check(&headers, "validate", &Pricing::fixed(0.10), &json!({}))
            .await;
        let GateOutcome::Verified(receipt) = outcome else {
            panic!("expected Verified");
        };
        assert_eq!(receipt.required_usd, 0.10);
        assert_eq!(receipt.amount, "100000");
        assert_eq!(receipt.currency, "USDC");
        assert_eq!(receipt.payer.as_deref(), Some("0xPayer"));
    }

    #[tokio::test]
    async fn test_settle_delegates_to_rail() {
        let rail = Arc::new(FakeRail::verified("exact"));
        let gate = PaymentGate::new(vec![Arc::clone(&rail) as Arc<dyn PaymentRail>]);
        let mut headers = HeaderMap::new();
        headers.insert(PAYMENT_HEADER, payment_header("exact"));

        let GateOutcome::Verified(receipt) = gate
            .check(&headers, "validate", &Pricing::fixed(0.10), &json!({}))
            .await
        else {
            panic!("expected Verified");
        };

        let settlement = gate.settle(&receipt).await.unwrap();
        assert!(settlement.is_settled());
        assert_eq!(rail.settles.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_internal_key_bypass() {
        let gate = PaymentGate::new(vec![Arc::new(FakeRail::verified("exact"))])
            .with_internal_key(Some("secret-key".to_owned()));

        let mut headers = HeaderMap::new();
        headers.insert(INTERNAL_KEY_HEADER, HeaderValue::from_static("secret-key"));
        let outcome = gate
            .check(&headers, "validate", &Pricing::fixed(0.10), &json!({}))
            .await;
        assert!(matches!(outcome, GateOutcome::Free));

        let mut wrong = HeaderMap::new();
        wrong.insert(INTERNAL_KEY_HEADER, HeaderValue::from_static("wrong"));
        let outcome = gate
            .check(&wrong, "validate", &Pricing::fixed(0.10), &json!({}))
            .await;
        assert!(matches!(outcome, GateOutcome::Required(_)));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
