#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use stockroom_api::{
    build_router,
    config::AppConfig,
    db,
    entities::inventory_item,
    events::{self, EventSender},
    services::ledger::NewItem,
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// Configuration for an isolated in-memory SQLite database.
pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        TEST_JWT_SECRET.to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );
    // A second pooled connection would open a second, empty in-memory database.
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg.cors_allow_any_origin = true;
    cfg.rate_limit_requests_per_window = 10_000;
    cfg
}

/// Configuration for a SQLite file database served by several pooled
/// connections, so transactions really overlap. Keep `dir` alive for the
/// duration of the test.
pub fn file_database_config(dir: &tempfile::TempDir, connections: u32) -> AppConfig {
    let mut cfg = test_config();
    cfg.database_url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("stockroom.db").display()
    );
    cfg.db_max_connections = connections;
    cfg.db_min_connections = 1;
    cfg
}

/// Connected and migrated database plus a running event worker.
pub async fn test_database(cfg: &AppConfig) -> (Arc<DatabaseConnection>, EventSender, tokio::task::JoinHandle<()>) {
    let pool = db::connect(cfg)
        .await
        .expect("failed to create test database");
    db::migrate(&pool)
        .await
        .expect("failed to run migrations in tests");

    let (event_tx, event_rx) = mpsc::channel(256);
    let event_task = tokio::spawn(events::process_events(event_rx));
    (Arc::new(pool), EventSender::new(event_tx), event_task)
}

/// Helper harness for spinning up the full router backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub user_id: Uuid,
    token: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        let (db, event_sender, event_task) = test_database(&cfg).await;
        let state = AppState::new(db, cfg, event_sender);
        let router = build_router(state.clone());

        let user_id = Uuid::new_v4();
        let token = state
            .auth
            .issue_token(user_id, chrono::Duration::hours(1))
            .expect("issue test token");

        Self {
            router,
            state,
            user_id,
            token,
            _event_task: event_task,
        }
    }

    /// Bearer token for the default test user.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Token for some other user of the same deployment.
    pub fn token_for(&self, user_id: Uuid) -> String {
        self.state
            .auth
            .issue_token(user_id, chrono::Duration::hours(1))
            .expect("issue test token")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Convenience helper for authenticated JSON requests as the default user.
    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(method, uri, body, Some(self.token())).await
    }

    /// Create an item directly through the ledger, bypassing HTTP.
    pub async fn seed_item(&self, name: &str, quantity: i32, reorder_point: i32) -> inventory_item::Model {
        self.state
            .ledger
            .create_item(self.user_id, new_item(name, quantity, reorder_point))
            .await
            .expect("seed item for tests")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn new_item(name: &str, quantity: i32, reorder_point: i32) -> NewItem {
    NewItem {
        name: name.to_string(),
        description: Some(format!("{} for tests", name)),
        category: "Hardware".to_string(),
        quantity,
        unit_price: Decimal::new(250, 2),
        reorder_point,
    }
}

/// Read the response body as JSON.
pub async fn read_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is JSON")
}
