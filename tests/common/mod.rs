//! Shared test utilities

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use credit_gateway::api::{self, ApiState};
use credit_gateway::{
    Error, MeteredOperation, Offer, OfferResponse, OperationError, PaymentProcessor, Result,
    WeatherReport,
};
use secrecy::SecretString;

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test";

/// Processor that hands out sequential tokens, or fails when switched off
#[derive(Default)]
pub struct FakeProcessor {
    issued: AtomicUsize,
    down: AtomicBool,
}

impl FakeProcessor {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn create_offers(&self, offers: &[Offer]) -> Result<OfferResponse> {
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::ProcessorUnavailable("connection refused".to_string()));
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(OfferResponse {
            offers: offers
                .iter()
                .map(|o| serde_json::to_value(o).expect("offer serializes"))
                .collect(),
            payment_context_token: format!("ctx-{n}"),
            payment_request_url: Some("https://api.fewsats.com/v0/l402/payment-request".to_string()),
            version: Some("0.2.2".to_string()),
        })
    }
}

/// Weather stand-in keyed on the location string
///
/// `"Nowhere"` is invalid input, `"Down"` is an upstream failure and
/// `"Slow"` never answers within the test timeout.
pub struct FakeWeather;

#[async_trait]
impl MeteredOperation for FakeWeather {
    type Output = WeatherReport;

    async fn invoke(&self, input: &str) -> std::result::Result<WeatherReport, OperationError> {
        match input {
            "Nowhere" => Err(OperationError::InvalidInput(format!("Invalid location: {input}"))),
            "Down" => Err(OperationError::TransientFailure("weather API returned 503".to_string())),
            "Slow" => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(OperationError::TransientFailure("unreachable".to_string()))
            }
            _ => Ok(WeatherReport {
                temperature: 18.5,
                condition: "Partly cloudy".to_string(),
                location: format!("{input}, Testland"),
                humidity: 70,
                wind_kph: 12.0,
                feels_like: 17.0,
                last_updated: "2026-10-18 09:00".to_string(),
                is_placeholder: false,
            }),
        }
    }
}

/// Test harness around the full router
pub struct TestGateway {
    pub state: Arc<ApiState>,
    pub processor: Arc<FakeProcessor>,
}

impl TestGateway {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_webhook_secret() -> Self {
        Self::build(Some(TEST_WEBHOOK_SECRET))
    }

    fn build(secret: Option<&str>) -> Self {
        let processor = Arc::new(FakeProcessor::default());
        let mut builder = ApiState::builder(processor.clone(), Arc::new(FakeWeather))
            .operation_timeout(Duration::from_millis(100))
            .processor_timeout(Duration::from_secs(1));
        if let Some(secret) = secret {
            builder = builder.webhook_secret(SecretString::new(secret.into()));
        }
        Self {
            state: Arc::new(builder.build()),
            processor,
        }
    }

    pub fn router(&self) -> Router {
        api::router(self.state.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;

        self.router()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Sign up and return the bearer token
    pub async fn signup(&self) -> String {
        let response = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/signup")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        let json = body_json(response).await;
        json["user_id"].as_str().expect("user_id").to_string()
    }

    pub async fn weather(&self, token: &str, location: Option<&str>) -> Response<Body> {
        let uri = match location {
            Some(loc) => format!("/weather?location={loc}"),
            None => "/weather".to_string(),
        };
        self.send(
            Request::builder()
                .uri(uri)
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn webhook(&self, payload: &serde_json::Value, signature: Option<String>) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhook/fewsats")
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            builder = builder.header("x-webhook-signature", sig);
        }
        self.send(builder.body(Body::from(payload.to_string())).unwrap())
            .await
    }
}

/// Completed payment notification for an offer
pub fn payment(offer_id: &str, token: &str, amount: u64) -> serde_json::Value {
    serde_json::json!({
        "offer_id": offer_id,
        "payment_context_token": token,
        "amount": amount,
        "currency": "USD",
        "status": "completed",
        "timestamp": "2026-10-18T09:00:00Z"
    })
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
