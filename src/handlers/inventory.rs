use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::handlers::common::{created_response, success_response, Acknowledgement, ApiJson, ApiPath, ApiQuery};
use crate::services::inventory::{InventoryService, ItemListQuery};
use crate::services::ledger::{ItemUpdate, LedgerEntry, NewItem, StockLedger, StockMovement};
use axum::{
    extract::State,
    response::Response,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Access to the services the inventory handlers need.
pub trait InventoryHandlerState: Clone + Send + Sync + 'static {
    fn ledger(&self) -> &StockLedger;
    fn inventory(&self) -> &InventoryService;
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

/// Body of a successful stock-in or stock-out.
#[derive(Debug, Serialize)]
pub struct StockMovementResponse {
    pub success: bool,
    #[serde(flatten)]
    pub entry: LedgerEntry,
}

/// Create the inventory router
pub fn inventory_routes<S>() -> Router<S>
where
    S: InventoryHandlerState,
{
    Router::new()
        .route("/", get(list_items::<S>).post(create_item::<S>))
        .route("/search", get(search_items::<S>))
        .route("/stock-in", post(stock_in::<S>))
        .route("/stock-out", post(stock_out::<S>))
        .route(
            "/:id",
            get(get_item::<S>)
                .put(update_item::<S>)
                .delete(delete_item::<S>),
        )
}

/// Paged listing of the caller's items, most recently updated first
pub async fn list_items<S>(
    State(state): State<S>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<ItemListQuery>,
) -> Result<Response, ServiceError>
where
    S: InventoryHandlerState,
{
    let page = state.inventory().list_items(user.user_id, query).await?;
    Ok(success_response(page))
}

pub async fn search_items<S>(
    State(state): State<S>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Response, ServiceError>
where
    S: InventoryHandlerState,
{
    let term = query.q.unwrap_or_default();
    let items = state.inventory().search_items(user.user_id, &term).await?;
    Ok(success_response(items))
}

pub async fn get_item<S>(
    State(state): State<S>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Response, ServiceError>
where
    S: InventoryHandlerState,
{
    let item = state.inventory().get_item(user.user_id, id).await?;
    Ok(success_response(item))
}

/// Create an item with its opening stock
pub async fn create_item<S>(
    State(state): State<S>,
    user: AuthUser,
    ApiJson(payload): ApiJson<NewItem>,
) -> Result<Response, ServiceError>
where
    S: InventoryHandlerState,
{
    let item = state.ledger().create_item(user.user_id, payload).await?;
    Ok(created_response(item))
}

/// Update descriptive fields; the body is checked against the allowed keys
/// before it is deserialized.
pub async fn update_item<S>(
    State(state): State<S>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<Value>,
) -> Result<Response, ServiceError>
where
    S: InventoryHandlerState,
{
    let update = ItemUpdate::from_json(body)?;
    let item = state.ledger().update_item(user.user_id, id, update).await?;
    Ok(success_response(item))
}

pub async fn delete_item<S>(
    State(state): State<S>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Response, ServiceError>
where
    S: InventoryHandlerState,
{
    state.ledger().delete_item(user.user_id, id).await?;
    Ok(success_response(Acknowledgement::new("Item deleted")))
}

pub async fn stock_in<S>(
    State(state): State<S>,
    user: AuthUser,
    ApiJson(movement): ApiJson<StockMovement>,
) -> Result<Response, ServiceError>
where
    S: InventoryHandlerState,
{
    let entry = state.ledger().stock_in(user.user_id, movement).await?;
    Ok(success_response(StockMovementResponse {
        success: true,
        entry,
    }))
}

pub async fn stock_out<S>(
    State(state): State<S>,
    user: AuthUser,
    ApiJson(movement): ApiJson<StockMovement>,
) -> Result<Response, ServiceError>
where
    S: InventoryHandlerState,
{
    let entry = state.ledger().stock_out(user.user_id, movement).await?;
    Ok(success_response(StockMovementResponse {
        success: true,
        entry,
    }))
}
