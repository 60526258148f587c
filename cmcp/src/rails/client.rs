//! Shared HTTP client for facilitator verify/settle endpoints.

use std::time::Duration;

use cmcp_proto::x402::{SettleRequest, SettleResponse, VerifyRequest, VerifyResponse};

use crate::error::RailError;

/// HTTP client for one facilitator service.
///
/// Verification carries a short timeout because it gates the client's
/// visible response; settlement gets a longer one because it runs after
/// the response was delivered.
pub struct FacilitatorHttp {
    base_url: String,
    client: reqwest::Client,
    verify_timeout: Duration,
    settle_timeout: Duration,
}

impl std::fmt::Debug for FacilitatorHttp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacilitatorHttp")
            .field("base_url", &self.base_url)
            .field("verify_timeout", &self.verify_timeout)
            .field("settle_timeout", &self.settle_timeout)
            .finish_non_exhaustive()
    }
}

impl FacilitatorHttp {
    /// Creates a client for the facilitator at `base_url`.
    #[must_use]
    pub fn new(base_url: &str, verify_timeout: Duration, settle_timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client: reqwest::Client::new(),
            verify_timeout,
            settle_timeout,
        }
    }

    /// `POST {base}/verify`.
    ///
    /// # Errors
    ///
    /// Returns [`RailError`] on transport failure, non-success status, or
    /// an unparseable response.
    pub async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, RailError> {
        let response = self
            .client
            .post(format!("{}/verify", self.base_url))
            .timeout(self.verify_timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RailError::Facilitator {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| RailError::Protocol(e.to_string()))
    }

    /// `POST {base}/settle`.
    ///
    /// # Errors
    ///
    /// Returns [`RailError`] on transport failure, non-success status, or
    /// an unparseable response.
    pub async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, RailError> {
        let response = self
            .client
            .post(format!("{}/settle", self.base_url))
            .timeout(self.settle_timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RailError::Facilitator {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| RailError::Protocol(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmcp_proto::x402::{
        PaymentEnvelope, PaymentRequirement, SettlementResult, VerifyResponse, X402_VERSION,
    };
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> FacilitatorHttp {
        FacilitatorHttp::new(
            base_url,
            Duration::from_millis(500),
            Duration::from_millis(500),
        )
    }

    fn test_requirement() -> PaymentRequirement {
        PaymentRequirement {
            scheme: "exact".to_owned(),
            network: "base-sepolia".to_owned(),
            asset: "0xAsset".to_owned(),
            max_amount_required: "100000".to_owned(),
            pay_to: "0xRecipient".to_owned(),
            description: "MCP Tool: validate".to_owned(),
            mime_type: None,
            max_timeout_seconds: Some(60),
        }
    }

    fn test_verify_request() -> VerifyRequest {
        VerifyRequest {
            x402_version: X402_VERSION,
            payment_payload: PaymentEnvelope {
                x402_version: X402_VERSION,
                scheme: "exact".to_owned(),
                network: "base-sepolia".to_owned(),
                payload: json!({"signature": "0xsig"}),
            },
            payment_requirements: test_requirement(),
        }
    }

    fn test_settle_request() -> SettleRequest {
        SettleRequest::from(test_verify_request())
    }

    #[tokio::test]
    async fn test_verify_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&VerifyResponse::verified(
                Some("0xPayer".to_owned()),
            )))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let response = client.verify(&test_verify_request()).await.unwrap();
        assert!(response.is_verified());
        assert_eq!(response.payer.as_deref(), Some("0xPayer"));
    }

    #[tokio::test]
    async fn test_verify_rejected_verdict_passes_through() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(&VerifyResponse::rejected("insufficient")),
            )
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let response = client.verify(&test_verify_request()).await.unwrap();
        assert!(!response.is_verified());
        assert_eq!(response.reason.as_deref(), Some("insufficient"));
    }

    #[tokio::test]
    async fn test_verify_bad_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let Err(RailError::Facilitator { status, body }) =
            client.verify(&test_verify_request()).await
        else {
            panic!("expected Facilitator error");
        };
        assert_eq!(status, 503);
        assert_eq!(body, "upstream down");
    }

    #[tokio::test]
    async fn test_verify_malformed_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let result = client.verify(&test_verify_request()).await;
        assert!(matches!(result, Err(RailError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_verify_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(&VerifyResponse::verified(None))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let client = FacilitatorHttp::new(
            &mock_server.uri(),
            Duration::from_millis(50),
            Duration::from_millis(50),
        );
        let result = client.verify(&test_verify_request()).await;
        assert!(matches!(result, Err(RailError::Transport(_))));
    }

    #[tokio::test]
    async fn test_settle_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&SettleResponse {
                result: SettlementResult::Settled,
                tx_ref: Some("0xtx".to_owned()),
                reason: None,
            }))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let response = client.settle(&test_settle_request()).await.unwrap();
        assert!(response.is_settled());
        assert_eq!(response.tx_ref.as_deref(), Some("0xtx"));
    }

    #[tokio::test]
    async fn test_settle_bad_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad settle request"))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let Err(RailError::Facilitator { status, body }) =
            client.settle(&test_settle_request()).await
        else {
            panic!("expected Facilitator error");
        };
        assert_eq!(status, 400);
        assert_eq!(body, "bad settle request");
    }

    #[tokio::test]
    async fn test_settle_malformed_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"half\": "))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let result = client.settle(&test_settle_request()).await;
        assert!(matches!(result, Err(RailError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_trailing_slash_is_trimmed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&VerifyResponse::verified(None)))
            .mount(&mock_server)
            .await;

        let client = test_client(&format!("{}/", mock_server.uri()));
        let response = client.verify(&test_verify_request()).await.unwrap();
        assert!(response.is_verified());
    }
}
