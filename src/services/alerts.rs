//! Low-stock alert reconciliation and the alert listing/dismissal service.
//!
//! A `low_stock` alert exists for an item iff `quantity <= reorder_point`.
//! Every write path that can move either side of that comparison calls
//! [`reconcile_low_stock`] inside its own database transaction.
//!
//! `out_of_stock` alerts are one-shot notifications raised when a stock-out
//! empties an item; they may be dismissed and are cleared by the next stock-in.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        alert::{self, AlertPriority, AlertType},
        inventory_item,
    },
    errors::ServiceError,
};

/// What reconciliation must do to bring the alert set in line with stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertAction {
    /// OK -> LOW
    Raise,
    /// LOW -> OK
    Clear,
    /// LOW -> LOW or OK -> OK
    Keep,
}

/// Pure transition function of the low-stock state machine.
pub fn reconcile_action(quantity: i32, reorder_point: i32, active_alerts: u64) -> AlertAction {
    let low = quantity <= reorder_point;
    match (low, active_alerts) {
        (true, 0) => AlertAction::Raise,
        (false, n) if n > 0 => AlertAction::Clear,
        _ => AlertAction::Keep,
    }
}

/// Outcome of a reconciliation pass, reported to callers for event emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertChange {
    Raised(alert::Model),
    Cleared { removed: u64 },
}

pub fn low_stock_message(item: &inventory_item::Model) -> String {
    format!(
        "Low stock alert: {} is at or below reorder point ({} remaining, reorder point {})",
        item.name, item.quantity, item.reorder_point
    )
}

/// Brings the item's `low_stock` alert in line with its current quantity.
/// Must run on the same transaction that wrote the item.
pub async fn reconcile_low_stock<C>(
    conn: &C,
    item: &inventory_item::Model,
) -> Result<Option<AlertChange>, ServiceError>
where
    C: ConnectionTrait,
{
    let active = alert::Entity::find()
        .filter(alert::Column::ItemId.eq(item.id))
        .filter(alert::Column::AlertType.eq(AlertType::LowStock))
        .count(conn)
        .await?;

    match reconcile_action(item.quantity, item.reorder_point, active) {
        AlertAction::Raise => {
            let created = alert::ActiveModel {
                id: Set(Uuid::new_v4()),
                item_id: Set(item.id),
                alert_type: Set(AlertType::LowStock),
                message: Set(low_stock_message(item)),
                priority: Set(AlertPriority::Medium),
                created_by: Set(item.created_by),
                created_at: Set(Utc::now()),
            }
            .insert(conn)
            .await?;
            debug!(item_id = %item.id, alert_id = %created.id, "low stock alert raised");
            Ok(Some(AlertChange::Raised(created)))
        }
        AlertAction::Clear => {
            let removed = alert::Entity::delete_many()
                .filter(alert::Column::ItemId.eq(item.id))
                .filter(alert::Column::AlertType.eq(AlertType::LowStock))
                .exec(conn)
                .await?
                .rows_affected;
            debug!(item_id = %item.id, removed, "low stock alert cleared");
            Ok(Some(AlertChange::Cleared { removed }))
        }
        AlertAction::Keep => Ok(None),
    }
}

/// Raises an `out_of_stock` notification when a stock-out empties the item,
/// unless one is already pending.
pub async fn notify_out_of_stock<C>(
    conn: &C,
    item: &inventory_item::Model,
) -> Result<Option<alert::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    if item.quantity > 0 {
        return Ok(None);
    }

    let pending = alert::Entity::find()
        .filter(alert::Column::ItemId.eq(item.id))
        .filter(alert::Column::AlertType.eq(AlertType::OutOfStock))
        .count(conn)
        .await?;
    if pending > 0 {
        return Ok(None);
    }

    let created = alert::ActiveModel {
        id: Set(Uuid::new_v4()),
        item_id: Set(item.id),
        alert_type: Set(AlertType::OutOfStock),
        message: Set(format!(
            "Warning: {} is out of stock. Consider restocking soon.",
            item.name
        )),
        priority: Set(AlertPriority::High),
        created_by: Set(item.created_by),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;
    Ok(Some(created))
}

/// Removes stale `out_of_stock` notifications once the item has stock again.
pub async fn clear_out_of_stock<C>(
    conn: &C,
    item: &inventory_item::Model,
) -> Result<u64, ServiceError>
where
    C: ConnectionTrait,
{
    if item.quantity == 0 {
        return Ok(0);
    }
    let removed = alert::Entity::delete_many()
        .filter(alert::Column::ItemId.eq(item.id))
        .filter(alert::Column::AlertType.eq(AlertType::OutOfStock))
        .exec(conn)
        .await?
        .rows_affected;
    Ok(removed)
}

/// Read/dismiss access to a user's alerts.
#[derive(Clone)]
pub struct AlertService {
    db: Arc<DatabaseConnection>,
}

impl AlertService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// All of the owner's alerts, newest first.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        owner_id: Uuid,
        item_id: Option<Uuid>,
    ) -> Result<Vec<alert::Model>, ServiceError> {
        let mut query = alert::Entity::find().filter(alert::Column::CreatedBy.eq(owner_id));
        if let Some(item_id) = item_id {
            query = query.filter(alert::Column::ItemId.eq(item_id));
        }
        Ok(query
            .order_by_desc(alert::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    /// Dismisses a notification. `low_stock` alerts follow stock levels and
    /// cannot be dismissed by hand.
    #[instrument(skip(self))]
    pub async fn dismiss(&self, owner_id: Uuid, alert_id: Uuid) -> Result<(), ServiceError> {
        let existing = alert::Entity::find_by_id(alert_id)
            .filter(alert::Column::CreatedBy.eq(owner_id))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Alert {} not found", alert_id)))?;

        if existing.alert_type == AlertType::LowStock {
            return Err(ServiceError::Conflict(
                "Low stock alerts are cleared automatically when the item is restocked".into(),
            ));
        }

        alert::Entity::delete_by_id(alert_id)
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }
}
