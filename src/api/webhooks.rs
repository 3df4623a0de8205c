//! Payment processor webhook
//!
//! Always answers with a `{status, message?, user_id?, credits?}` body.
//! Benign outcomes (intermediate status, duplicate delivery) are 200 so
//! the processor stops retrying; an inconsistent payment is a 500 so the
//! processor keeps alerting until an operator steps in.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;

use super::ApiState;
use crate::Error;
use crate::reconciler::{PaymentNotification, Reconciliation, SIGNATURE_HEADER};

/// Webhook response body
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits: Option<u64>,
}

impl WebhookResponse {
    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: Some(message.into()),
            user_id: None,
            credits: None,
        }
    }
}

/// Handle a payment notification
async fn payment_webhook(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookResponse>) {
    if let Some(verifier) = &state.signature {
        let header = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        if let Err(e) = verifier.verify(header, &body) {
            tracing::warn!("rejected payment webhook with bad signature");
            return (StatusCode::UNAUTHORIZED, Json(WebhookResponse::error(e.to_string())));
        }
    }

    let notification: PaymentNotification = match serde_json::from_slice(&body) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(error = %e, "malformed payment webhook");
            return (
                StatusCode::BAD_REQUEST,
                Json(WebhookResponse::error(format!("invalid payload: {e}"))),
            );
        }
    };

    tracing::info!(
        offer_id = %notification.offer_id,
        token = %notification.payment_context_token,
        status = %notification.status,
        timestamp = %notification.timestamp,
        "payment webhook received"
    );

    match state.reconciler.reconcile(&notification) {
        Ok(Reconciliation::Credited {
            user_id, balance, ..
        }) => (
            StatusCode::OK,
            Json(WebhookResponse {
                status: "success",
                message: None,
                user_id: Some(user_id.to_string()),
                credits: Some(balance),
            }),
        ),
        Ok(Reconciliation::NotCompleted { status }) => (
            StatusCode::OK,
            Json(WebhookResponse::error(format!(
                "Payment status is {status}, not completed"
            ))),
        ),
        Err(Error::UnknownPaymentContext) => (
            StatusCode::OK,
            Json(WebhookResponse::error("Payment context token not found")),
        ),
        Err(e) => (e.status().0, Json(WebhookResponse::error(e.to_string()))),
    }
}

/// Build webhooks router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/webhook/fewsats", post(payment_webhook))
        .with_state(state)
}
