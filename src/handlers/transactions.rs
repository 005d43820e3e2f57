use axum::{extract::State, response::Response, routing::get, Router};

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::handlers::common::{success_response, ApiQuery};
use crate::services::inventory::TransactionListQuery;
use crate::AppState;

pub fn transaction_routes() -> Router<AppState> {
    Router::new().route("/", get(list_transactions))
}

/// Ledger history for the caller, newest first
pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<TransactionListQuery>,
) -> Result<Response, ServiceError> {
    let page = state
        .inventory
        .list_transactions(user.user_id, query)
        .await?;
    Ok(success_response(page))
}
