use axum::{extract::State, response::Response, routing::get, Router};

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::handlers::common::{success_response, ApiQuery};
use crate::services::reports::{InventoryReportQuery, TransactionReportQuery};
use crate::AppState;

pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/inventory", get(inventory_report))
        .route("/transactions", get(transaction_report))
}

pub async fn inventory_report(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<InventoryReportQuery>,
) -> Result<Response, ServiceError> {
    let rows = state.reports.inventory_report(user.user_id, query).await?;
    Ok(success_response(rows))
}

pub async fn transaction_report(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<TransactionReportQuery>,
) -> Result<Response, ServiceError> {
    let rows = state.reports.transaction_report(user.user_id, query).await?;
    Ok(success_response(rows))
}
