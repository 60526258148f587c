//! Payment rail trait.
//!
//! A rail is one payment network (EVM stablecoin, Canton native) backed by
//! an external facilitator service. All rails share the same verify/settle
//! shape; the gate selects one from the client envelope's `scheme` field,
//! so adding a rail is a registration, not a code path.
//!
//! The trait is dyn-compatible so heterogeneous rails can be stored in the
//! gate as `Arc<dyn PaymentRail>`.

use std::sync::Arc;

use cmcp_proto::x402::{PaymentEnvelope, PaymentRequirement, SettleResponse, VerifyResponse};

use crate::error::RailError;
use crate::tool::BoxFuture;

/// One payment network with its facilitator client.
pub trait PaymentRail: Send + Sync {
    /// Scheme identifier carried in 402 bodies and client envelopes.
    fn scheme(&self) -> &str;

    /// Network identifier the rail settles on.
    fn network(&self) -> &str;

    /// Currency symbol for telemetry and receipts.
    fn currency_symbol(&self) -> &str;

    /// Converts a USD price to the rail's wire amount.
    ///
    /// Token rails emit atomic units; the Canton rail emits a USD decimal
    /// string.
    fn amount_for_usd(&self, usd: f64) -> String;

    /// Builds this rail's entry in a 402 `accepts` list.
    fn requirement(&self, usd: f64, description: &str) -> PaymentRequirement;

    /// Verifies a client payment envelope against the required amount.
    ///
    /// Bounded by a short timeout: verification gates the client's visible
    /// response.
    fn verify<'a>(
        &'a self,
        envelope: &'a PaymentEnvelope,
        usd: f64,
    ) -> BoxFuture<'a, Result<VerifyResponse, RailError>>;

    /// Settles a previously verified payment.
    ///
    /// Runs after the response was delivered, under a longer timeout.
    /// Never retried: the facilitator is the source of truth on ambiguous
    /// outcomes.
    fn settle<'a>(
        &'a self,
        envelope: &'a PaymentEnvelope,
        usd: f64,
    ) -> BoxFuture<'a, Result<SettleResponse, RailError>>;
}

impl<T: PaymentRail> PaymentRail for Arc<T> {
    fn scheme(&self) -> &str {
        self.as_ref().scheme()
    }

    fn network(&self) -> &str {
        self.as_ref().network()
    }

    fn currency_symbol(&self) -> &str {
        self.as_ref().currency_symbol()
    }

    fn amount_for_usd(&self, usd: f64) -> String {
        self.as_ref().amount_for_usd(usd)
    }

    fn requirement(&self, usd: f64, description: &str) -> PaymentRequirement {
        self.as_ref().requirement(usd, description)
    }

    fn verify<'a>(
        &'a self,
        envelope: &'a PaymentEnvelope,
        usd: f64,
    ) -> BoxFuture<'a, Result<VerifyResponse, RailError>> {
        self.as_ref().verify(envelope, usd)
    }

    fn settle<'a>(
        &'a self,
        envelope: &'a PaymentEnvelope,
        usd: f64,
    ) -> BoxFuture<'a, Result<SettleResponse, RailError>> {
        self.as_ref().settle(envelope, usd)
    }
}
