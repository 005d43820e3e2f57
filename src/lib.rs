//! Stockroom API Library
//!
//! Multi-user inventory ledger: items, stock-in/stock-out transactions,
//! low-stock alerts, and read-only dashboards and reports over them.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod rate_limiter;
pub mod services;
pub mod tracing;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware, Router,
};
use sea_orm::DatabaseConnection;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};

use crate::auth::{AuthConfig, AuthService};
use crate::handlers::inventory::InventoryHandlerState;
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::services::{
    alerts::AlertService, inventory::InventoryService, ledger::StockLedger,
    reports::ReportService, PageLimits,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: events::EventSender,
    pub auth: Arc<AuthService>,
    pub ledger: StockLedger,
    pub inventory: InventoryService,
    pub alerts: AlertService,
    pub reports: ReportService,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let auth = Arc::new(AuthService::new(AuthConfig::from(&config)));
        let limits = PageLimits::from(&config);
        Self {
            ledger: StockLedger::new(db.clone(), event_sender.clone()),
            inventory: InventoryService::new(db.clone(), limits),
            alerts: AlertService::new(db.clone()),
            reports: ReportService::new(db.clone()),
            auth,
            event_sender,
            config: Arc::new(config),
            db,
        }
    }
}

impl InventoryHandlerState for AppState {
    fn ledger(&self) -> &StockLedger {
        &self.ledger
    }

    fn inventory(&self) -> &InventoryService {
        &self.inventory
    }
}

/// Authenticated API surface, mounted under `/api`.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/inventory", handlers::inventory::inventory_routes::<AppState>())
        .nest("/transactions", handlers::transactions::transaction_routes())
        .nest("/alerts", handlers::alerts::alert_routes())
        .nest("/dashboard", handlers::dashboard::dashboard_routes())
        .nest("/reports", handlers::reports::report_routes())
}

fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!(
            environment = %cfg.environment,
            "using permissive CORS because explicit origins were not configured"
        );
        CorsLayer::permissive()
    } else {
        // Validation rejects this combination; deny cross-origin requests if it slips through.
        CorsLayer::new()
    }
}

/// Full application router: `/api` (rate limited, authenticated), `/health`,
/// and the shared request id, tracing, CORS, timeout, compression and body
/// limit layers.
pub fn build_router(state: AppState) -> Router {
    let cfg = state.config.clone();
    let limiter = RateLimiter::new(RateLimitConfig::from(cfg.as_ref()));
    tokio::spawn(rate_limiter::start_cleanup_task(
        limiter.clone(),
        Duration::from_secs(cfg.rate_limit_window_seconds.max(1)),
    ));

    let api = api_v1_routes()
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth::auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            limiter,
            rate_limiter::rate_limit_middleware,
        ))
        .with_state(state.clone());

    Router::new()
        .nest("/api", api)
        .nest("/health", health::health_routes(state.db.clone()))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(cfg.max_body_size))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(cfg.request_timeout_secs)))
        .layer(cors_layer(&cfg))
        .layer(tracing::configure_http_tracing())
        .layer(middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
}

async fn not_found(uri: axum::http::Uri) -> errors::ServiceError {
    errors::ServiceError::NotFound(format!("No route for {}", uri.path()))
}
