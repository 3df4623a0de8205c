//! Payment webhook reconciliation
//!
//! Turns a processor's "payment completed" notification into credits on
//! the right account. The payment-context token is redeemed before the
//! grant is applied, so a duplicate delivery finds nothing to redeem and
//! never credits twice. A redeemed token that could not be credited is
//! quarantined, and every redelivery of it fails again.

pub mod signature;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use signature::{SIGNATURE_HEADER, SignatureVerifier};

use crate::catalog::OfferCatalog;
use crate::ledger::{UserId, UserLedger};
use crate::payments::PaymentContextStore;
use crate::{Error, Result};

/// Processor status for a settled payment
pub const STATUS_COMPLETED: &str = "completed";

/// Payment notification as delivered by the processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub offer_id: String,
    pub payment_context_token: String,
    /// Minor currency units
    pub amount: u64,
    pub currency: String,
    pub status: String,
    pub timestamp: String,
}

/// Outcome of a well-formed notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Credits were granted
    Credited {
        user_id: UserId,
        granted: u64,
        balance: u64,
    },
    /// Intermediate processor state; nothing changed
    NotCompleted { status: String },
}

/// Applies completed payments to the ledger
pub struct WebhookReconciler {
    ledger: Arc<UserLedger>,
    contexts: Arc<PaymentContextStore>,
    catalog: Arc<OfferCatalog>,
}

impl WebhookReconciler {
    #[must_use]
    pub fn new(
        ledger: Arc<UserLedger>,
        contexts: Arc<PaymentContextStore>,
        catalog: Arc<OfferCatalog>,
    ) -> Self {
        Self {
            ledger,
            contexts,
            catalog,
        }
    }

    /// Process one notification
    ///
    /// # Errors
    ///
    /// - `UnknownPaymentContext` if the token was never minted or was
    ///   already redeemed (duplicate delivery)
    /// - `InconsistentPayment` if the token was consumed but no credit
    ///   could be granted, now or on an earlier delivery; this needs an
    ///   operator
    pub fn reconcile(&self, notification: &PaymentNotification) -> Result<Reconciliation> {
        if notification.status != STATUS_COMPLETED {
            tracing::info!(
                token = %notification.payment_context_token,
                status = %notification.status,
                "ignoring payment notification that is not completed"
            );
            return Ok(Reconciliation::NotCompleted {
                status: notification.status.clone(),
            });
        }

        let user_id = self
            .contexts
            .redeem(&notification.payment_context_token)
            .inspect_err(|e| match e {
                Error::UnknownPaymentContext => tracing::warn!(
                    token = %notification.payment_context_token,
                    offer_id = %notification.offer_id,
                    "payment context token not found (duplicate or never issued)"
                ),
                e => tracing::error!(
                    token = %notification.payment_context_token,
                    offer_id = %notification.offer_id,
                    error = %e,
                    "redelivery of a quarantined payment"
                ),
            })?;

        let granted = match self.catalog.resolve_credit_grant(&notification.offer_id) {
            Ok(granted) => granted,
            Err(e) => return Err(self.quarantine(notification, &user_id, &e)),
        };

        self.check_price(notification);

        let balance = match self.ledger.credit(&user_id, granted) {
            Ok(balance) => balance,
            Err(e) => return Err(self.quarantine(notification, &user_id, &e)),
        };

        tracing::info!(
            user_id = %user_id,
            offer_id = %notification.offer_id,
            granted,
            balance,
            "payment reconciled"
        );

        Ok(Reconciliation::Credited {
            user_id,
            granted,
            balance,
        })
    }

    /// Log a consumed-but-uncredited payment, park its token and build
    /// the error for it
    fn quarantine(&self, notification: &PaymentNotification, user_id: &UserId, cause: &Error) -> Error {
        let err = inconsistent(notification, user_id, cause);
        self.contexts.quarantine(
            &notification.payment_context_token,
            user_id,
            &notification.offer_id,
            &cause.to_string(),
        );
        err
    }

    /// Warn when the collected amount differs from the catalog price
    fn check_price(&self, notification: &PaymentNotification) {
        let Some(offer) = self.catalog.get(&notification.offer_id) else {
            return;
        };
        if offer.amount != notification.amount
            || !offer.currency.eq_ignore_ascii_case(&notification.currency)
        {
            tracing::warn!(
                offer_id = %offer.offer_id,
                expected_amount = offer.amount,
                expected_currency = %offer.currency,
                paid_amount = notification.amount,
                paid_currency = %notification.currency,
                "payment amount does not match offer price"
            );
        }
    }
}

/// Log a consumed-but-uncredited payment and build the error for it
fn inconsistent(notification: &PaymentNotification, user_id: &UserId, cause: &Error) -> Error {
    tracing::error!(
        token = %notification.payment_context_token,
        user_id = %user_id,
        offer_id = %notification.offer_id,
        amount = notification.amount,
        currency = %notification.currency,
        timestamp = %notification.timestamp,
        error = %cause,
        "payment collected but no credits granted, manual reconciliation required"
    );
    Error::InconsistentPayment {
        token: notification.payment_context_token.clone(),
        reason: cause.to_string(),
    }
}
