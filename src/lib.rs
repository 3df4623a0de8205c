//! Credit Gateway - Prepaid credits in front of a paid upstream API
//!
//! This library provides the core functionality for the credit gateway:
//! - A user ledger with atomic conditional debits
//! - A metering gate that charges one credit per successful call
//! - Payment offers minted through the Fewsats L402 API
//! - Webhook reconciliation that credits completed payments exactly once
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    HTTP API                          │
//! │  /signup  │  /user  │  /weather  │  /webhook/fewsats │
//! └────────────┬───────────────────────────┬────────────┘
//!              │                           │
//! ┌────────────▼────────────┐  ┌───────────▼────────────┐
//! │      Metering Gate      │  │   Webhook Reconciler   │
//! │ debit → call → refund?  │  │  redeem → grant credit │
//! └──────┬─────────┬────────┘  └───────────┬────────────┘
//!        │         │                       │
//! ┌──────▼───┐ ┌───▼───────────────────────▼────────────┐
//! │ Weather  │ │  User Ledger  │  Payment Context Store │
//! │ upstream │ │               │  (Fewsats offers)      │
//! └──────────┘ └────────────────────────────────────────┘
//! ```

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod payments;
pub mod reconciler;
pub mod weather;

pub use catalog::{Offer, OfferCatalog};
pub use config::Config;
pub use error::{Error, Result};
pub use gate::{Metered, MeteredOperation, MeteringGate, OperationError};
pub use ledger::{User, UserId, UserLedger};
pub use payments::{FewsatsClient, OfferResponse, PaymentContextStore, PaymentProcessor};
pub use reconciler::{PaymentNotification, Reconciliation, SignatureVerifier, WebhookReconciler};
pub use weather::{WeatherClient, WeatherReport};
