//! Payment processor client
//!
//! The processor turns our offer list into an L402 payment request and
//! hands back an opaque payment-context token. It later reports the
//! outcome through the webhook handled by [`crate::reconciler`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::catalog::Offer;
use crate::{Error, Result};

/// Default processor API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.fewsats.com";

/// Processor reply to an offer-creation request
///
/// Returned verbatim to the caller as the 402 body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferResponse {
    pub offers: Vec<serde_json::Value>,
    pub payment_context_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_request_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// External payment processor
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Register `offers` and obtain a fresh payment-context token
    ///
    /// # Errors
    ///
    /// Returns `ProcessorUnavailable` on any transport or protocol failure
    async fn create_offers(&self, offers: &[Offer]) -> Result<OfferResponse>;
}

#[derive(Serialize)]
struct CreateOffersRequest<'a> {
    offers: &'a [Offer],
}

/// Fewsats L402 offers API client
#[derive(Debug)]
pub struct FewsatsClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl FewsatsClient {
    /// Create a client with a bounded request timeout
    ///
    /// # Errors
    ///
    /// Returns `Config` if the base URL does not parse or the HTTP client
    /// cannot be built
    pub fn new(base_url: &str, api_key: SecretString, timeout: Duration) -> Result<Self> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid processor URL {base_url}: {e}")))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build processor client: {e}")))?;

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl PaymentProcessor for FewsatsClient {
    async fn create_offers(&self, offers: &[Offer]) -> Result<OfferResponse> {
        let url = format!("{}/v0/l402/offers", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Token {}", self.api_key.expose_secret()),
            )
            .json(&CreateOffersRequest { offers })
            .send()
            .await
            .map_err(|e| Error::ProcessorUnavailable(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ProcessorUnavailable(format!(
                "processor API error: {status} - {body}"
            )));
        }

        let offers: OfferResponse = response
            .json()
            .await
            .map_err(|e| Error::ProcessorUnavailable(format!("invalid processor response: {e}")))?;

        if offers.payment_context_token.trim().is_empty() {
            return Err(Error::ProcessorUnavailable(
                "processor returned an empty payment context token".to_string(),
            ));
        }

        Ok(offers)
    }
}
