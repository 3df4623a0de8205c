//! Metered weather endpoint

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use super::{ApiState, AuthUser};
use crate::Result;
use crate::gate::Metered;

/// Balance left after a served call
pub const CREDITS_REMAINING_HEADER: HeaderName = HeaderName::from_static("x-credits-remaining");

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    /// City name or coordinates
    pub location: Option<String>,
}

/// Current weather for a location, one credit per successful call
///
/// Answers 402 with a payment offer when the balance is empty.
async fn get_weather(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Query(query): Query<WeatherQuery>,
) -> Result<Response> {
    let location = query
        .location
        .unwrap_or_else(|| state.default_location.clone());

    let metered = state
        .gate
        .meter(&user.id, Arc::clone(&state.weather), location)
        .await?;

    Ok(match metered {
        Metered::Served { output, remaining } => (
            StatusCode::OK,
            [(CREDITS_REMAINING_HEADER, HeaderValue::from(remaining))],
            Json(output),
        )
            .into_response(),
        Metered::PaymentRequired(offer) => (StatusCode::PAYMENT_REQUIRED, Json(offer)).into_response(),
    })
}

/// Build weather router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/weather", get(get_weather))
        .with_state(state)
}
