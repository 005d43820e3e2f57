use axum::{extract::State, response::Response, routing::get, Router};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::handlers::common::{success_response, ApiQuery};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct VolumeQuery {
    pub days: Option<u32>,
}

pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/transactions", get(transaction_volume))
        .route("/categories", get(categories))
}

/// Totals plus the five newest ledger entries
pub async fn stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ServiceError> {
    let stats = state.reports.dashboard_stats(user.user_id).await?;
    Ok(success_response(stats))
}

pub async fn transaction_volume(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<VolumeQuery>,
) -> Result<Response, ServiceError> {
    let volume = state
        .reports
        .transaction_volume(user.user_id, query.days)
        .await?;
    Ok(success_response(volume))
}

pub async fn categories(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ServiceError> {
    let distribution = state.reports.category_distribution(user.user_id).await?;
    Ok(success_response(distribution))
}
