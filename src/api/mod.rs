//! HTTP API server for the credit gateway

mod auth;
pub mod health;
pub mod users;
pub mod weather;
pub mod webhooks;

pub use auth::AuthUser;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use secrecy::SecretString;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::catalog::OfferCatalog;
use crate::config::{Config, ServerConfig};
use crate::gate::{DEFAULT_OPERATION_TIMEOUT, MeteredOperation, MeteringGate};
use crate::ledger::UserLedger;
use crate::payments::{
    DEFAULT_PROCESSOR_TIMEOUT, FewsatsClient, PaymentContextStore, PaymentProcessor,
};
use crate::reconciler::{SignatureVerifier, WebhookReconciler};
use crate::weather::{DEFAULT_LOCATION, WeatherClient, WeatherReport};
use crate::{Error, Result};

/// The metered operation as stored in shared state
pub type SharedWeather = Arc<dyn MeteredOperation<Output = WeatherReport>>;

/// Shared state for API handlers
pub struct ApiState {
    pub ledger: Arc<UserLedger>,
    pub contexts: Arc<PaymentContextStore>,
    pub gate: MeteringGate,
    pub reconciler: WebhookReconciler,
    pub weather: SharedWeather,
    /// Present only when a webhook secret is configured
    pub signature: Option<SignatureVerifier>,
    pub default_location: String,
}

impl ApiState {
    /// Start building state around the two external collaborators
    #[must_use]
    pub fn builder(processor: Arc<dyn PaymentProcessor>, weather: SharedWeather) -> ApiStateBuilder {
        ApiStateBuilder {
            processor,
            weather,
            catalog: OfferCatalog::default(),
            webhook_secret: None,
            processor_timeout: DEFAULT_PROCESSOR_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            default_location: DEFAULT_LOCATION.to_string(),
        }
    }

    /// Wire real clients from configuration
    ///
    /// # Errors
    ///
    /// Returns `Config` if `FEWSATS_API_KEY` is missing, a URL is invalid,
    /// or the offer catalog is malformed
    pub fn from_config(config: Config) -> Result<Self> {
        let api_key = config.processor.api_key.ok_or_else(|| {
            Error::Config("FEWSATS_API_KEY is not set".to_string())
        })?;
        let processor = FewsatsClient::new(
            &config.processor.base_url,
            api_key,
            config.processor.timeout,
        )?;
        let weather = WeatherClient::new(
            &config.weather.base_url,
            config.weather.api_key,
            config.weather.timeout,
        )?;
        let catalog = OfferCatalog::new(config.offers)?;

        if config.webhook_secret.is_none() {
            tracing::warn!("WEBHOOK_SECRET not set, payment webhooks are accepted without verification");
        }

        let mut builder = Self::builder(Arc::new(processor), Arc::new(weather))
            .catalog(catalog)
            .processor_timeout(config.processor.timeout)
            .operation_timeout(config.weather.timeout)
            .default_location(config.weather.default_location);
        if let Some(secret) = config.webhook_secret {
            builder = builder.webhook_secret(secret);
        }
        Ok(builder.build())
    }
}

/// Builder for [`ApiState`]
pub struct ApiStateBuilder {
    processor: Arc<dyn PaymentProcessor>,
    weather: SharedWeather,
    catalog: OfferCatalog,
    webhook_secret: Option<SecretString>,
    processor_timeout: Duration,
    operation_timeout: Duration,
    default_location: String,
}

impl ApiStateBuilder {
    /// Replace the built-in offer catalog
    #[must_use]
    pub fn catalog(mut self, catalog: OfferCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Require signed webhooks
    #[must_use]
    pub fn webhook_secret(mut self, secret: SecretString) -> Self {
        self.webhook_secret = Some(secret);
        self
    }

    /// Bound on a processor round trip
    #[must_use]
    pub fn processor_timeout(mut self, timeout: Duration) -> Self {
        self.processor_timeout = timeout;
        self
    }

    /// Bound on a metered call
    #[must_use]
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Location used when the caller omits one
    #[must_use]
    pub fn default_location(mut self, location: String) -> Self {
        self.default_location = location;
        self
    }

    #[must_use]
    pub fn build(self) -> ApiState {
        let catalog = Arc::new(self.catalog);
        let ledger = Arc::new(UserLedger::new());
        let contexts = Arc::new(
            PaymentContextStore::new(self.processor, Arc::clone(&catalog))
                .with_timeout(self.processor_timeout),
        );
        let gate = MeteringGate::new(Arc::clone(&ledger), Arc::clone(&contexts))
            .with_timeout(self.operation_timeout);
        let reconciler =
            WebhookReconciler::new(Arc::clone(&ledger), Arc::clone(&contexts), catalog);

        ApiState {
            ledger,
            contexts,
            gate,
            reconciler,
            weather: self.weather,
            signature: self.webhook_secret.map(SignatureVerifier::new),
            default_location: self.default_location,
        }
    }
}

/// Build the router with all routes
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(users::router(state.clone()))
        .merge(weather::router(state.clone()))
        .merge(webhooks::router(state.clone()))
        .merge(health::router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    host: String,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub fn new(state: ApiState, server: &ServerConfig) -> Self {
        Self {
            state: Arc::new(state),
            host: server.host.clone(),
            port: server.port,
        }
    }

    /// Run the API server until Ctrl-C
    ///
    /// In-flight metered calls finish their refund bookkeeping on their own
    /// tasks even while the listener is draining.
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind API server on {addr}: {e}")))?;

        tracing::info!(addr = %addr, "API server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown signal received");
                }
            })
            .await
            .map_err(|e| Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}
