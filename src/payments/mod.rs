//! Payment context store
//!
//! Binds each payment-context token minted by the processor to the user
//! who must be credited when that payment completes. A binding lives from
//! `mint` until the webhook reconciler redeems it; redemption removes it
//! in the same critical section as the lookup, so a token can be redeemed
//! at most once.
//!
//! A redeemed token whose payment could not be turned into credits is
//! quarantined rather than forgotten: every later redemption of it fails
//! with `InconsistentPayment`, so processor redeliveries keep failing
//! until an operator settles the account by hand.

pub mod processor;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

pub use processor::{FewsatsClient, OfferResponse, PaymentProcessor};

use crate::catalog::OfferCatalog;
use crate::ledger::UserId;
use crate::{Error, Result};

/// Default bound on a processor round trip
pub const DEFAULT_PROCESSOR_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct PendingPayment {
    user_id: UserId,
    issued_at: DateTime<Utc>,
}

/// A paid token that granted no credits
#[derive(Debug, Clone)]
struct QuarantinedPayment {
    user_id: UserId,
    offer_id: String,
    reason: String,
}

#[derive(Debug, Default)]
struct Contexts {
    pending: HashMap<String, PendingPayment>,
    quarantined: HashMap<String, QuarantinedPayment>,
}

/// Token → user bindings for outstanding payment offers
pub struct PaymentContextStore {
    processor: Arc<dyn PaymentProcessor>,
    catalog: Arc<OfferCatalog>,
    timeout: Duration,
    contexts: Mutex<Contexts>,
}

impl PaymentContextStore {
    #[must_use]
    pub fn new(processor: Arc<dyn PaymentProcessor>, catalog: Arc<OfferCatalog>) -> Self {
        Self {
            processor,
            catalog,
            timeout: DEFAULT_PROCESSOR_TIMEOUT,
            contexts: Mutex::new(Contexts::default()),
        }
    }

    /// Override the processor round-trip bound
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ask the processor for a payment offer and bind its token to `user_id`
    ///
    /// No lock is held while the processor call is in flight.
    ///
    /// # Errors
    ///
    /// Returns `ProcessorUnavailable` if the processor fails, times out, or
    /// hands back a token that is already bound
    pub async fn mint(&self, user_id: &UserId) -> Result<OfferResponse> {
        let response = tokio::time::timeout(
            self.timeout,
            self.processor.create_offers(self.catalog.offers()),
        )
        .await
        .map_err(|_| {
            Error::ProcessorUnavailable(format!(
                "processor did not answer within {}ms",
                self.timeout.as_millis()
            ))
        })??;

        let token = response.payment_context_token.clone();
        {
            let mut contexts = self.lock();
            if contexts.quarantined.contains_key(&token) {
                return Err(Error::ProcessorUnavailable(
                    "processor reissued a quarantined payment context token".to_string(),
                ));
            }
            match contexts.pending.entry(token.clone()) {
                Entry::Occupied(_) => {
                    return Err(Error::ProcessorUnavailable(
                        "processor reissued a payment context token that is still pending"
                            .to_string(),
                    ));
                }
                Entry::Vacant(slot) => {
                    slot.insert(PendingPayment {
                        user_id: user_id.clone(),
                        issued_at: Utc::now(),
                    });
                }
            }
        }

        tracing::info!(user_id = %user_id, token = %token, "payment context minted");
        Ok(response)
    }

    /// Look up the user bound to `token` without consuming it
    ///
    /// # Errors
    ///
    /// Returns `UnknownPaymentContext` if no binding exists
    pub fn resolve(&self, token: &str) -> Result<UserId> {
        self.lock()
            .pending
            .get(token)
            .map(|p| p.user_id.clone())
            .ok_or(Error::UnknownPaymentContext)
    }

    /// Atomically look up and remove the binding for `token`
    ///
    /// # Errors
    ///
    /// Returns `UnknownPaymentContext` if the token was never minted or
    /// has already been redeemed, and `InconsistentPayment` if it was
    /// quarantined
    pub fn redeem(&self, token: &str) -> Result<UserId> {
        let removed = {
            let mut contexts = self.lock();
            if let Some(q) = contexts.quarantined.get(token) {
                return Err(Error::InconsistentPayment {
                    token: token.to_string(),
                    reason: format!(
                        "still unresolved for user {} and offer {}: {}",
                        q.user_id, q.offer_id, q.reason
                    ),
                });
            }
            contexts.pending.remove(token)
        };
        let pending = removed.ok_or(Error::UnknownPaymentContext)?;

        let age = Utc::now() - pending.issued_at;
        tracing::info!(
            user_id = %pending.user_id,
            token = %token,
            age_secs = age.num_seconds(),
            "payment context redeemed"
        );
        Ok(pending.user_id)
    }

    /// Park a redeemed token whose payment granted no credits
    pub fn quarantine(&self, token: &str, user_id: &UserId, offer_id: &str, reason: &str) {
        self.lock().quarantined.insert(
            token.to_string(),
            QuarantinedPayment {
                user_id: user_id.clone(),
                offer_id: offer_id.to_string(),
                reason: reason.to_string(),
            },
        );
        tracing::warn!(
            token = %token,
            user_id = %user_id,
            offer_id = %offer_id,
            "payment context quarantined"
        );
    }

    /// Number of tokens awaiting payment
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Number of paid tokens awaiting manual reconciliation
    #[must_use]
    pub fn quarantined_count(&self) -> usize {
        self.lock().quarantined.len()
    }

    #[must_use]
    pub fn catalog(&self) -> &OfferCatalog {
        &self.catalog
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Contexts> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::catalog::Offer;

    /// Issues `tok-1`, `tok-2`, ... or fails when `fail` is set
    struct CountingProcessor {
        issued: AtomicUsize,
        fail: bool,
    }

    impl CountingProcessor {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                issued: AtomicUsize::new(0),
                fail: false,
            })
        }
    }

    #[async_trait]
    impl PaymentProcessor for CountingProcessor {
        async fn create_offers(&self, offers: &[Offer]) -> Result<OfferResponse> {
            if self.fail {
                return Err(Error::ProcessorUnavailable("503".to_string()));
            }
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(OfferResponse {
                offers: offers
                    .iter()
                    .map(|o| serde_json::to_value(o).unwrap())
                    .collect(),
                payment_context_token: format!("tok-{n}"),
                payment_request_url: None,
                version: None,
            })
        }
    }

    struct StuckProcessor;

    #[async_trait]
    impl PaymentProcessor for StuckProcessor {
        async fn create_offers(&self, _offers: &[Offer]) -> Result<OfferResponse> {
            std::future::pending().await
        }
    }

    struct RepeatingProcessor;

    #[async_trait]
    impl PaymentProcessor for RepeatingProcessor {
        async fn create_offers(&self, _offers: &[Offer]) -> Result<OfferResponse> {
            Ok(OfferResponse {
                offers: Vec::new(),
                payment_context_token: "same".to_string(),
                payment_request_url: None,
                version: None,
            })
        }
    }

    fn store(processor: Arc<dyn PaymentProcessor>) -> PaymentContextStore {
        PaymentContextStore::new(processor, Arc::new(OfferCatalog::default()))
    }

    #[tokio::test]
    async fn mint_binds_token_to_user() {
        let store = store(CountingProcessor::ok());
        let user = UserId::from("u1");

        let offer = store.mint(&user).await.unwrap();

        assert_eq!(offer.payment_context_token, "tok-1");
        assert_eq!(offer.offers.len(), 2);
        assert_eq!(store.resolve("tok-1").unwrap(), user);
        assert_eq!(store.pending_count(), 1);
    }

    #[tokio::test]
    async fn redeem_is_at_most_once() {
        let store = store(CountingProcessor::ok());
        let user = UserId::from("u1");
        store.mint(&user).await.unwrap();

        assert_eq!(store.redeem("tok-1").unwrap(), user);
        assert!(matches!(
            store.redeem("tok-1"),
            Err(Error::UnknownPaymentContext)
        ));
        assert!(matches!(
            store.resolve("tok-1"),
            Err(Error::UnknownPaymentContext)
        ));
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn never_minted_token_is_unknown() {
        let store = store(CountingProcessor::ok());
        assert!(matches!(
            store.redeem("forged"),
            Err(Error::UnknownPaymentContext)
        ));
    }

    #[tokio::test]
    async fn processor_failure_propagates() {
        let store = store(Arc::new(CountingProcessor {
            issued: AtomicUsize::new(0),
            fail: true,
        }));
        let err = store.mint(&UserId::from("u1")).await.unwrap_err();
        assert!(matches!(err, Error::ProcessorUnavailable(_)));
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn processor_timeout_is_unavailable() {
        let store = store(Arc::new(StuckProcessor)).with_timeout(Duration::from_millis(20));
        let err = store.mint(&UserId::from("u1")).await.unwrap_err();
        assert!(matches!(err, Error::ProcessorUnavailable(_)));
    }

    #[tokio::test]
    async fn reissued_token_keeps_first_binding() {
        let store = store(Arc::new(RepeatingProcessor));
        store.mint(&UserId::from("first")).await.unwrap();

        let err = store.mint(&UserId::from("second")).await.unwrap_err();
        assert!(matches!(err, Error::ProcessorUnavailable(_)));
        assert_eq!(store.resolve("same").unwrap(), UserId::from("first"));
    }

    #[tokio::test]
    async fn quarantined_token_keeps_failing() {
        let store = store(CountingProcessor::ok());
        let user = UserId::from("u1");
        store.mint(&user).await.unwrap();

        store.redeem("tok-1").unwrap();
        store.quarantine("tok-1", &user, "offer_9", "unknown offer ID: offer_9");

        for _ in 0..2 {
            let err = store.redeem("tok-1").unwrap_err();
            assert!(matches!(err, Error::InconsistentPayment { ref token, .. } if token == "tok-1"));
        }
        assert_eq!(store.quarantined_count(), 1);
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_redeem_has_one_winner() {
        let store = Arc::new(store(CountingProcessor::ok()));
        store.mint(&UserId::from("u1")).await.unwrap();

        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.redeem("tok-1").is_ok() })
            })
            .collect();

        let mut winners = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
