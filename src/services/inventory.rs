use std::sync::Arc;

use sea_orm::{
    sea_query::{Expr, Func, LikeExpr, SimpleExpr},
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::{inventory_item, stock_transaction, TransactionType},
    errors::ServiceError,
    services::{Page, PageLimits, PageRequest},
};

/// Maximum number of hits returned by the quick search.
pub const SEARCH_LIMIT: u64 = 10;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemListQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionListQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub item_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
}

/// Read side of the inventory: item lookup, listing, search and the ledger history.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    limits: PageLimits,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, limits: PageLimits) -> Self {
        Self { db, limits }
    }

    #[instrument(skip(self))]
    pub async fn get_item(
        &self,
        owner_id: Uuid,
        item_id: Uuid,
    ) -> Result<inventory_item::Model, ServiceError> {
        inventory_item::Entity::find_by_id(item_id)
            .filter(inventory_item::Column::CreatedBy.eq(owner_id))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::item_not_found(item_id))
    }

    /// Owner's items, most recently updated first.
    #[instrument(skip(self))]
    pub async fn list_items(
        &self,
        owner_id: Uuid,
        query: ItemListQuery,
    ) -> Result<Page<inventory_item::Model>, ServiceError> {
        let request = PageRequest::resolve(query.page, query.page_size, self.limits);

        let mut select =
            inventory_item::Entity::find().filter(inventory_item::Column::CreatedBy.eq(owner_id));
        if let Some(category) = query.category.as_deref().map(str::trim) {
            if !category.is_empty() {
                select = select.filter(inventory_item::Column::Category.eq(category));
            }
        }

        let paginator = select
            .order_by_desc(inventory_item::Column::UpdatedAt)
            .order_by_asc(inventory_item::Column::Id)
            .paginate(self.db.as_ref(), request.page_size);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(request.page - 1).await?;

        Ok(Page::new(items, total, request))
    }

    /// Case-insensitive substring match over name, description and category.
    #[instrument(skip(self))]
    pub async fn search_items(
        &self,
        owner_id: Uuid,
        term: &str,
    ) -> Result<Vec<inventory_item::Model>, ServiceError> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let matches = Condition::any()
            .add(contains_ignore_case(inventory_item::Column::Name, term))
            .add(contains_ignore_case(inventory_item::Column::Description, term))
            .add(contains_ignore_case(inventory_item::Column::Category, term));

        Ok(inventory_item::Entity::find()
            .filter(inventory_item::Column::CreatedBy.eq(owner_id))
            .filter(matches)
            .order_by_asc(inventory_item::Column::Name)
            .limit(SEARCH_LIMIT)
            .all(self.db.as_ref())
            .await?)
    }

    /// Owner's ledger entries, newest first.
    #[instrument(skip(self))]
    pub async fn list_transactions(
        &self,
        owner_id: Uuid,
        query: TransactionListQuery,
    ) -> Result<Page<stock_transaction::Model>, ServiceError> {
        let request = PageRequest::resolve(query.page, query.page_size, self.limits);

        let mut select = stock_transaction::Entity::find()
            .filter(stock_transaction::Column::CreatedBy.eq(owner_id));
        if let Some(item_id) = query.item_id {
            select = select.filter(stock_transaction::Column::ItemId.eq(item_id));
        }
        if let Some(kind) = query.transaction_type {
            select = select.filter(stock_transaction::Column::TransactionType.eq(kind));
        }

        let paginator = select
            .order_by_desc(stock_transaction::Column::Date)
            .order_by_asc(stock_transaction::Column::Id)
            .paginate(self.db.as_ref(), request.page_size);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(request.page - 1).await?;

        Ok(Page::new(items, total, request))
    }
}

fn contains_ignore_case(column: inventory_item::Column, needle: &str) -> SimpleExpr {
    let escaped = needle
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Expr::expr(Func::lower(Expr::col(column)))
        .like(LikeExpr::new(format!("%{}%", escaped)).escape('\\'))
}
