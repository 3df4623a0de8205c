//! Offer catalog
//!
//! Static, read-only list of purchasable credit packages. Each offer
//! carries the price the payment processor collects and the number of
//! credits this service grants once that payment completes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A purchasable credit package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub offer_id: String,
    pub title: String,
    pub description: String,
    /// Price in minor currency units (e.g. cents)
    pub amount: u64,
    pub currency: String,
    pub payment_methods: Vec<String>,
    /// Credits granted on redemption; never sent to the processor
    #[serde(skip_serializing, default)]
    pub credits: u64,
}

/// Immutable offer table, loaded at startup
#[derive(Debug, Clone)]
pub struct OfferCatalog {
    offers: Vec<Offer>,
}

impl OfferCatalog {
    /// Build a catalog from a list of offers
    ///
    /// # Errors
    ///
    /// Returns `Config` if the list is empty, an id repeats, or an offer
    /// grants zero credits
    pub fn new(offers: Vec<Offer>) -> Result<Self> {
        if offers.is_empty() {
            return Err(Error::Config("offer catalog is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for offer in &offers {
            if !seen.insert(offer.offer_id.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate offer id: {}",
                    offer.offer_id
                )));
            }
            if offer.credits == 0 {
                return Err(Error::Config(format!(
                    "offer {} grants no credits",
                    offer.offer_id
                )));
            }
        }

        Ok(Self { offers })
    }

    /// All offers, in configuration order
    #[must_use]
    pub fn offers(&self) -> &[Offer] {
        &self.offers
    }

    /// Look up an offer by id
    #[must_use]
    pub fn get(&self, offer_id: &str) -> Option<&Offer> {
        self.offers.iter().find(|o| o.offer_id == offer_id)
    }

    /// Credits granted by redeeming `offer_id`
    ///
    /// # Errors
    ///
    /// Returns `UnknownOffer` if the id is not in the catalog
    pub fn resolve_credit_grant(&self, offer_id: &str) -> Result<u64> {
        self.get(offer_id)
            .map(|o| o.credits)
            .ok_or_else(|| Error::UnknownOffer(offer_id.to_string()))
    }
}

impl Default for OfferCatalog {
    fn default() -> Self {
        Self {
            offers: default_offers(),
        }
    }
}

/// Built-in packages used when the config file defines none
#[must_use]
pub fn default_offers() -> Vec<Offer> {
    vec![
        Offer {
            offer_id: "offer_1".to_string(),
            title: "1 credit package".to_string(),
            description: "Add 1 credit to your account.".to_string(),
            amount: 1,
            currency: "USD".to_string(),
            payment_methods: vec!["lightning".to_string()],
            credits: 1,
        },
        Offer {
            offer_id: "offer_2".to_string(),
            title: "1000 credit package".to_string(),
            description: "Add 1000 credits to your account.".to_string(),
            amount: 500,
            currency: "USD".to_string(),
            payment_methods: vec!["lightning".to_string(), "credit_card".to_string()],
            credits: 1000,
        },
    ]
}
