//! Metering gate
//!
//! Sits in front of every credit-consuming operation:
//!
//! 1. Take one credit with an atomic conditional decrement.
//! 2. If the balance is empty, mint a payment context and answer with a
//!    payment offer instead of running the operation.
//! 3. Otherwise run the operation under a timeout; on any failure give the
//!    credit back before surfacing the error.
//!
//! Step 3 runs on its own task so a caller that disconnects mid-flight
//! cannot skip the refund.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::ledger::{UserId, UserLedger};
use crate::payments::{OfferResponse, PaymentContextStore};
use crate::{Error, Result};

/// Default bound on a metered operation
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Credits consumed per metered call
const CALL_COST: u64 = 1;

/// Typed failure reported by a metered operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// The caller's input was rejected; retrying unchanged will not help
    #[error("{0}")]
    InvalidInput(String),

    /// The upstream failed; the caller may retry
    #[error("{0}")]
    TransientFailure(String),
}

impl From<OperationError> for Error {
    fn from(err: OperationError) -> Self {
        match err {
            OperationError::InvalidInput(msg) => Self::BadRequest(msg),
            OperationError::TransientFailure(msg) => Self::UpstreamError(msg),
        }
    }
}

/// An operation that costs one credit per call
#[async_trait]
pub trait MeteredOperation: Send + Sync {
    type Output: Send + 'static;

    /// Run the operation for a single free-text input
    async fn invoke(&self, input: &str) -> std::result::Result<Self::Output, OperationError>;
}

/// Result of passing through the gate
#[derive(Debug)]
pub enum Metered<T> {
    /// The operation ran; one credit was consumed
    Served { output: T, remaining: u64 },
    /// The balance was empty; pay using this offer
    PaymentRequired(OfferResponse),
}

/// Credit check, debit, invoke and refund around a metered operation
#[derive(Clone)]
pub struct MeteringGate {
    ledger: Arc<UserLedger>,
    contexts: Arc<PaymentContextStore>,
    timeout: Duration,
}

impl MeteringGate {
    #[must_use]
    pub fn new(ledger: Arc<UserLedger>, contexts: Arc<PaymentContextStore>) -> Self {
        Self {
            ledger,
            contexts,
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Override the operation timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `operation` on behalf of `user_id`, charging one credit
    ///
    /// # Errors
    ///
    /// - `Unauthenticated` if the user does not exist
    /// - `ProcessorUnavailable` if a payment offer was needed but could not
    ///   be minted
    /// - `BadRequest` / `UpstreamError` if the operation failed; the credit
    ///   has already been refunded
    pub async fn meter<O>(
        &self,
        user_id: &UserId,
        operation: Arc<O>,
        input: String,
    ) -> Result<Metered<O::Output>>
    where
        O: MeteredOperation + ?Sized + 'static,
    {
        let remaining = match self.ledger.debit(user_id, CALL_COST) {
            Ok(remaining) => remaining,
            Err(Error::InsufficientCredit { .. }) => {
                tracing::info!(user_id = %user_id, "balance empty, issuing payment offer");
                let offer = self.contexts.mint(user_id).await?;
                return Ok(Metered::PaymentRequired(offer));
            }
            Err(Error::UnknownUser(_)) => return Err(Error::Unauthenticated),
            Err(e) => return Err(e),
        };

        let ledger = Arc::clone(&self.ledger);
        let user = user_id.clone();
        let timeout = self.timeout;

        let call = tokio::spawn(async move {
            let outcome = tokio::time::timeout(timeout, operation.invoke(&input))
                .await
                .unwrap_or_else(|_| {
                    Err(OperationError::TransientFailure(format!(
                        "operation timed out after {}ms",
                        timeout.as_millis()
                    )))
                });

            match outcome {
                Ok(output) => Ok(output),
                Err(e) => {
                    refund(&ledger, &user);
                    Err(e)
                }
            }
        });

        match call.await {
            Ok(Ok(output)) => Ok(Metered::Served { output, remaining }),
            Ok(Err(e)) => {
                tracing::warn!(user_id = %user_id, error = %e, "metered operation failed, credit refunded");
                Err(e.into())
            }
            Err(join) => {
                // Task panicked before reaching its own refund
                refund(&self.ledger, user_id);
                Err(Error::UpstreamError(format!("metered operation aborted: {join}")))
            }
        }
    }
}

fn refund(ledger: &UserLedger, user_id: &UserId) {
    if let Err(e) = ledger.credit(user_id, CALL_COST) {
        tracing::error!(user_id = %user_id, error = %e, "failed to refund credit");
    }
}
