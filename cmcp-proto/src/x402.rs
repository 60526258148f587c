//! x402 payment wire contract.
//!
//! Defines the HTTP 402 response body, the decoded `X-PAYMENT` envelope,
//! and the request/response shapes of the facilitator `POST /verify` and
//! `POST /settle` endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current x402 protocol version tag, carried in 402 bodies and envelopes.
pub const X402_VERSION: u32 = 1;

/// Payment scheme identifier for the EVM stablecoin rail.
pub const SCHEME_EVM_EXACT: &str = "exact";

/// Payment scheme identifier for the Canton native rail.
pub const SCHEME_CANTON_EXACT: &str = "exact-canton";

/// One accepted payment method inside a 402 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirement {
    /// Payment scheme identifier (e.g. `"exact"`, `"exact-canton"`).
    pub scheme: String,

    /// Network identifier for the rail.
    pub network: String,

    /// Asset identifier (token contract address, or `"CC"` for Canton Coin).
    pub asset: String,

    /// Required amount: atomic units for token rails, a USD decimal string
    /// for the Canton rail.
    pub max_amount_required: String,

    /// Recipient: a wallet address or a `Party::<hex>` identifier.
    pub pay_to: String,

    /// Human-readable description of what is being paid for.
    pub description: String,

    /// MIME type of the paid-for response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Maximum payment validity in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,
}

/// Body of an HTTP 402 Payment Required response.
///
/// `accepts` lists one entry per enabled rail, in a deterministic order;
/// the client picks one and retries with an `X-PAYMENT` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version.
    pub x402_version: u32,

    /// Optional reason the previous attempt was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Accepted payment methods.
    pub accepts: Vec<PaymentRequirement>,
}

impl PaymentRequired {
    /// Creates a 402 body from the accepted payment methods.
    #[must_use]
    pub fn new(accepts: Vec<PaymentRequirement>) -> Self {
        Self {
            x402_version: X402_VERSION,
            error: None,
            accepts,
        }
    }

    /// Attaches a rejection reason.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// A decoded client payment envelope from the `X-PAYMENT` header.
///
/// The header value is base64-encoded JSON; `payload` stays opaque to the
/// server and is forwarded to the facilitator verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEnvelope {
    /// Protocol version.
    #[serde(default = "default_version")]
    pub x402_version: u32,

    /// Payment scheme the client selected; routes to the matching rail.
    pub scheme: String,

    /// Network the payment targets.
    pub network: String,

    /// Scheme-specific signed payment material.
    pub payload: Value,
}

impl PaymentEnvelope {
    /// Best-effort extraction of the payer address from the signed payload.
    ///
    /// Checks the authorization object first, then the payload top level.
    /// Returns `None` when no recognizable address field is present.
    #[must_use]
    pub fn payer_address(&self) -> Option<String> {
        const KEYS: [&str; 5] = ["from", "payer", "sender", "walletAddress", "address"];

        let pick = |obj: &Value| {
            KEYS.iter()
                .find_map(|k| obj.get(k).and_then(Value::as_str))
                .map(str::to_owned)
        };

        self.payload
            .get("authorization")
            .and_then(|auth| pick(auth))
            .or_else(|| pick(&self.payload))
    }
}

const fn default_version() -> u32 {
    X402_VERSION
}

/// Body of a facilitator `POST /verify` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Protocol version.
    pub x402_version: u32,

    /// The client's payment envelope.
    pub payment_payload: PaymentEnvelope,

    /// The requirement the envelope must satisfy (amount and payee).
    pub payment_requirements: PaymentRequirement,
}

/// Facilitator verdict on a proposed payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// The payment is valid and may be settled after execution.
    Verified,
    /// The payment was rejected.
    Rejected,
}

/// Response of a facilitator `POST /verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Whether the payment may proceed.
    pub verdict: Verdict,

    /// Rejection reason when `verdict` is `rejected`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// The payer's address, when the facilitator recovered it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl VerifyResponse {
    /// Creates a verified response.
    #[must_use]
    pub fn verified(payer: impl Into<Option<String>>) -> Self {
        Self {
            verdict: Verdict::Verified,
            reason: None,
            payer: payer.into(),
        }
    }

    /// Creates a rejected response with a reason.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Rejected,
            reason: Some(reason.into()),
            payer: None,
        }
    }

    /// Returns `true` if the payment was verified.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        matches!(self.verdict, Verdict::Verified)
    }
}

/// Body of a facilitator `POST /settle` request.
///
/// Settlement re-submits the verified envelope; the facilitator is the
/// source of truth for idempotency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    /// Protocol version.
    pub x402_version: u32,

    /// The previously verified payment envelope.
    pub payment_payload: PaymentEnvelope,

    /// The requirement the payment was verified against.
    pub payment_requirements: PaymentRequirement,
}

impl From<VerifyRequest> for SettleRequest {
    fn from(req: VerifyRequest) -> Self {
        Self {
            x402_version: req.x402_version,
            payment_payload: req.payment_payload,
            payment_requirements: req.payment_requirements,
        }
    }
}

/// Outcome of a settlement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementResult {
    /// Funds moved.
    Settled,
    /// Settlement failed; the reason explains why.
    Failed,
}

/// Response of a facilitator `POST /settle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    /// Settlement outcome.
    pub result: SettlementResult,

    /// Transaction reference on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,

    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SettleResponse {
    /// Returns `true` if the settlement went through.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self.result, SettlementResult::Settled)
    }
}
