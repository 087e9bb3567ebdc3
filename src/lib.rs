pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod jsonapi;
pub mod middleware;
pub mod models;
pub mod permissions;
pub mod services;
pub mod store;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use permissions::{AccessPolicy, StoreAccessPolicy};
use services::mail::{LogMailer, Mailer, SmtpMailer};
use services::payment::{PaymentGateway, StripeClient};
use services::pdf::{PdfTicketWriter, TicketDocuments};
use services::storage::LocalStorage;
use services::ticketing::{PricingEngine, TicketingManager};
use store::{MemoryStore, PgStore, Store};

// Shared state for the whole application
#[derive(Clone)]
pub struct AppState {
    pub config: config::Config,
    pub store: Arc<dyn Store>,
    pub access: Arc<dyn AccessPolicy>,
    pub documents: Arc<dyn TicketDocuments>,
    pub mailer: Arc<dyn Mailer>,
    pub pricing: Arc<dyn PricingEngine>,
    pub payments: Arc<dyn PaymentGateway>,
}

impl AppState {
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        if config.is_production() && config.jwt.secret == "change-me" {
            anyhow::bail!("JWT_SECRET must be set in production");
        }

        let store: Arc<dyn Store> = match database::Database::from_config(&config.database).await? {
            Some(db) => {
                db.run_migrations().await?;
                info!("Database connected");
                Arc::new(PgStore::new(db))
            }
            None => {
                warn!("DATABASE_URL is not set, using the in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        let mailer: Arc<dyn Mailer> = match &config.mail.smtp_host {
            Some(host) => Arc::new(SmtpMailer::new(&config.mail, host)?),
            None => {
                warn!("SMTP_HOST is not set, attendee mail is only logged");
                Arc::new(LogMailer)
            }
        };

        let storage = LocalStorage::from_config(&config.storage);
        let payments = StripeClient::from_config(&config.payment, &config.circuit_breaker)?;

        Ok(Arc::new(Self {
            access: Arc::new(StoreAccessPolicy::new(store.clone())),
            documents: Arc::new(PdfTicketWriter::new(storage)),
            pricing: Arc::new(TicketingManager),
            payments: Arc::new(payments),
            mailer,
            store,
            config,
        }))
    }
}

/// The HTTP application with all routes and layers.
pub fn app(state: Arc<AppState>) -> Router {
    let media = ServeDir::new(&state.config.storage.media_dir);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/v1", controllers::routes())
        .nest_service("/static/media", media)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
