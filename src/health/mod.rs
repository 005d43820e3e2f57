/*!
 * # Health Check Module
 *
 * - Liveness (`/health`): process is up, with version and uptime
 * - Readiness (`/health/ready`): database answers a ping, 503 otherwise
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::db;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessInfo {
    pub ready: bool,
    pub database: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: Arc<DatabaseConnection>,
    pub start_time: Instant,
}

impl HealthState {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self {
            db_pool,
            start_time: Instant::now(),
        }
    }

    pub fn uptime(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

pub async fn health_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    Json(HealthInfo {
        status: HealthStatus::Up,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime(),
        timestamp: Utc::now(),
    })
}

pub async fn readiness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let (status_code, info) = match db::ping(&state.db_pool).await {
        Ok(()) => (
            StatusCode::OK,
            ReadinessInfo {
                ready: true,
                database: HealthStatus::Up,
                message: None,
                timestamp: Utc::now(),
            },
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            ReadinessInfo {
                ready: false,
                database: HealthStatus::Down,
                message: Some(e.response_message()),
                timestamp: Utc::now(),
            },
        ),
    };

    (status_code, Json(info))
}

pub fn health_routes(db_pool: Arc<DatabaseConnection>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .with_state(Arc::new(HealthState::new(db_pool)))
}
