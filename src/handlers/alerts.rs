use axum::{
    extract::State,
    response::Response,
    routing::{delete, get},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::handlers::common::{success_response, Acknowledgement, ApiPath, ApiQuery};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertFilters {
    pub item_id: Option<Uuid>,
}

pub fn alert_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_alerts))
        .route("/:id", delete(dismiss_alert))
}

pub async fn list_alerts(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(filters): ApiQuery<AlertFilters>,
) -> Result<Response, ServiceError> {
    let alerts = state.alerts.list(user.user_id, filters.item_id).await?;
    Ok(success_response(alerts))
}

pub async fn dismiss_alert(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Response, ServiceError> {
    state.alerts.dismiss(user.user_id, id).await?;
    Ok(success_response(Acknowledgement::new("Alert dismissed")))
}
