//! Error types for the credit gateway

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the credit gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Missing, malformed, or unknown bearer token
    #[error("unauthenticated")]
    Unauthenticated,

    /// Balance too low for the requested debit
    #[error("insufficient credit: balance {balance}, requested {requested}")]
    InsufficientCredit { balance: u64, requested: u64 },

    /// Ledger has no record for the identifier
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// Credit would push the balance past `u64::MAX`
    #[error("balance overflow: balance {balance}, adding {amount}")]
    BalanceOverflow { balance: u64, amount: u64 },

    /// Zero-credit mutation requested
    #[error("invalid credit amount: {0}")]
    InvalidAmount(u64),

    /// Payment processor call failed or returned garbage
    #[error("payment processor unavailable: {0}")]
    ProcessorUnavailable(String),

    /// Payment context token never minted or already redeemed
    #[error("payment context token not found")]
    UnknownPaymentContext,

    /// Offer id missing from the catalog
    #[error("unknown offer ID: {0}")]
    UnknownOffer(String),

    /// Token was redeemed but no credit could be granted
    #[error("inconsistent payment for token {token}: {reason}")]
    InconsistentPayment { token: String, reason: String },

    /// Caller input rejected by the metered operation
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Metered operation failed upstream; the credit was refunded
    #[error("upstream error: {0}")]
    UpstreamError(String),

    /// Webhook signature missing or wrong
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Config file read error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file parse error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Status code and machine-readable code for the HTTP surface
    #[must_use]
    pub const fn status(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            Self::InvalidSignature => (StatusCode::UNAUTHORIZED, "invalid_signature"),
            Self::InsufficientCredit { .. } => (StatusCode::PAYMENT_REQUIRED, "insufficient_credit"),
            Self::UnknownUser(_) => (StatusCode::NOT_FOUND, "unknown_user"),
            Self::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "invalid_amount"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::ProcessorUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "processor_unavailable")
            }
            Self::UnknownPaymentContext => (StatusCode::NOT_FOUND, "unknown_payment_context"),
            Self::UnknownOffer(_) => (StatusCode::NOT_FOUND, "unknown_offer"),
            Self::UpstreamError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "upstream_error"),
            Self::InconsistentPayment { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "inconsistent_payment")
            }
            Self::BalanceOverflow { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "balance_overflow"),
            Self::Config(_) | Self::Io(_) | Self::Toml(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        } else {
            tracing::debug!(error = %self, code, "request rejected");
        }

        (
            status,
            Json(ErrorResponse {
                error: ErrorBody {
                    code,
                    message: self.to_string(),
                },
            }),
        )
            .into_response()
    }
}
