//! The stock ledger: every write that touches an item's quantity.
//!
//! Invariants upheld by this module:
//! * `item.quantity == Σ stock-in − Σ stock-out` over the item's transactions.
//! * `item.quantity` never goes negative; a stock-out larger than the
//!   available quantity is rejected with `InsufficientStock`.
//! * exactly one `low_stock` alert exists iff `quantity <= reorder_point`.
//!
//! Each operation is a single database transaction whose first statement is
//! an `UPDATE` of the item row. That takes the row lock on Postgres and the
//! write lock on SQLite before anything is read; a SQLite transaction that
//! reads first cannot wait for a concurrent writer and fails with
//! `database is locked`. Stock movements use a guarded `UPDATE`
//! (`quantity >= n` for stock-out), so concurrent stock-outs cannot both
//! consume the same units.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    db::with_transaction,
    entities::{alert, inventory_item, stock_transaction, TransactionType},
    errors::ServiceError,
    events::{Event, EventSender},
    services::alerts::{self, AlertChange},
};

/// Fields the general-purpose update may touch. `quantity` is deliberately
/// absent: it only moves through stock-in/stock-out.
pub const ALLOWED_UPDATE_FIELDS: [&str; 5] =
    ["name", "description", "category", "unitPrice", "reorderPoint"];

pub const INITIAL_STOCK_NOTE: &str = "Initial stock";

/// Largest unit price the `numeric(14, 4)` column holds.
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 4);

/// Exclusive bound of the `numeric(16, 4)` transaction value column.
pub const TOTAL_VALUE_LIMIT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Monetary value of `quantity` units at `unit_price`. Values the ledger
/// cannot store are rejected as invalid input.
pub fn total_value(quantity: i32, unit_price: Decimal) -> Result<Decimal, ServiceError> {
    Decimal::from(quantity)
        .checked_mul(unit_price)
        .filter(|value| value.abs() < TOTAL_VALUE_LIMIT)
        .ok_or_else(|| {
            ServiceError::InvalidInput(format!(
                "Total value of {} units at {} exceeds the supported range",
                quantity, unit_price
            ))
        })
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

fn validate_unit_price(price: &Decimal) -> Result<(), ValidationError> {
    let message = if *price < Decimal::ZERO {
        "Unit price must not be negative"
    } else if *price > MAX_UNIT_PRICE {
        "Unit price must be below 10000000000"
    } else if price.normalize().scale() > 4 {
        "Unit price supports at most 4 decimal places"
    } else {
        return Ok(());
    };
    let mut err = ValidationError::new("unit_price");
    err.message = Some(message.into());
    Err(err)
}

/// Payload for creating an item together with its opening stock.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    #[validate(length(min = 1, max = 200), custom = "validate_not_blank")]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    pub category: String,
    #[serde(default)]
    #[validate(range(min = 0, message = "Quantity must not be negative"))]
    pub quantity: i32,
    #[validate(custom = "validate_unit_price")]
    pub unit_price: Decimal,
    #[serde(default)]
    #[validate(range(min = 0, message = "Reorder point must not be negative"))]
    pub reorder_point: i32,
}

/// Restricted update; see [`ALLOWED_UPDATE_FIELDS`].
///
/// `description` distinguishes an absent key (`None`, left unchanged) from
/// an explicit `null` (`Some(None)`, cleared).
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_update_description"))]
pub struct ItemUpdate {
    #[validate(length(min = 1, max = 200), custom = "validate_not_blank")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    pub category: Option<String>,
    #[validate(custom = "validate_unit_price")]
    pub unit_price: Option<Decimal>,
    #[validate(range(min = 0, message = "Reorder point must not be negative"))]
    pub reorder_point: Option<i32>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn validate_update_description(update: &ItemUpdate) -> Result<(), ValidationError> {
    match &update.description {
        Some(Some(text)) if text.chars().count() > 2000 => {
            let mut err = ValidationError::new("length");
            err.message = Some("Description must be at most 2000 characters".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

impl ItemUpdate {
    /// Parses a raw JSON body, rejecting any key outside the allowed set.
    pub fn from_json(body: Value) -> Result<Self, ServiceError> {
        let Value::Object(fields) = &body else {
            return Err(ServiceError::InvalidInput(
                "Invalid updates: request body must be a JSON object".into(),
            ));
        };

        if let Some(field) = fields
            .keys()
            .find(|key| !ALLOWED_UPDATE_FIELDS.contains(&key.as_str()))
        {
            return Err(ServiceError::InvalidInput(format!(
                "Invalid updates: field '{}' cannot be modified",
                field
            )));
        }

        let update: ItemUpdate = serde_json::from_value(body)
            .map_err(|e| ServiceError::InvalidInput(format!("Invalid updates: {}", e)))?;
        update.validate()?;
        Ok(update)
    }
}

/// Body of stock-in and stock-out requests.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub item_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be greater than 0"))]
    pub quantity: i32,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Result of a ledger movement: the item after the change and the appended entry.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub item: inventory_item::Model,
    pub transaction: stock_transaction::Model,
}

#[derive(Clone)]
pub struct StockLedger {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl StockLedger {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Creates an item and, when it starts with stock, the matching
    /// "Initial stock" stock-in transaction.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_item(
        &self,
        owner_id: Uuid,
        input: NewItem,
    ) -> Result<inventory_item::Model, ServiceError> {
        input.validate()?;

        let (item, initial, change) =
            with_transaction(self.db.as_ref(), "create_item", move |txn| {
                Box::pin(async move {
                    let now = Utc::now();
                    let item = inventory_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        name: Set(input.name.trim().to_string()),
                        description: Set(input.description),
                        category: Set(input.category.trim().to_string()),
                        quantity: Set(input.quantity),
                        unit_price: Set(input.unit_price),
                        reorder_point: Set(input.reorder_point),
                        created_by: Set(owner_id),
                        created_at: Set(now),
                        updated_at: Set(now),
                    }
                    .insert(txn)
                    .await?;

                    let initial = if item.quantity > 0 {
                        Some(
                            record_transaction(
                                txn,
                                &item,
                                TransactionType::StockIn,
                                item.quantity,
                                Some(INITIAL_STOCK_NOTE.to_string()),
                            )
                            .await?,
                        )
                    } else {
                        None
                    };

                    let change = alerts::reconcile_low_stock(txn, &item).await?;
                    Ok((item, initial, change))
                })
            })
            .await?;

        info!(item_id = %item.id, quantity = item.quantity, "inventory item created");
        counter!("stockroom_ledger.items_created", 1);

        self.event_sender
            .send_or_log(Event::ItemCreated {
                item_id: item.id,
                owner_id,
                quantity: item.quantity,
            })
            .await;
        if let Some(transaction) = &initial {
            self.publish_movement(&item, transaction).await;
        }
        self.publish_alert_change(&item, change).await;

        Ok(item)
    }

    /// Adds stock. Clears the low-stock alert once quantity rises above the
    /// reorder point.
    #[instrument(skip(self, movement), fields(item_id = %movement.item_id, quantity = movement.quantity))]
    pub async fn stock_in(
        &self,
        owner_id: Uuid,
        movement: StockMovement,
    ) -> Result<LedgerEntry, ServiceError> {
        self.apply_movement(owner_id, TransactionType::StockIn, movement)
            .await
    }

    /// Removes stock. Fails with `InsufficientStock` when the request exceeds
    /// what is on hand; nothing is written in that case.
    #[instrument(skip(self, movement), fields(item_id = %movement.item_id, quantity = movement.quantity))]
    pub async fn stock_out(
        &self,
        owner_id: Uuid,
        movement: StockMovement,
    ) -> Result<LedgerEntry, ServiceError> {
        self.apply_movement(owner_id, TransactionType::StockOut, movement)
            .await
    }

    async fn apply_movement(
        &self,
        owner_id: Uuid,
        kind: TransactionType,
        movement: StockMovement,
    ) -> Result<LedgerEntry, ServiceError> {
        let kind_label: &'static str = kind.into();
        if let Err(err) = movement.validate() {
            counter!("stockroom_ledger.rejected", 1, "type" => kind_label, "reason" => "invalid_input");
            return Err(err.into());
        }

        let result = with_transaction(self.db.as_ref(), kind_label, move |txn| {
            Box::pin(async move {
                let StockMovement {
                    item_id,
                    quantity,
                    notes,
                } = movement;
                let delta = match kind {
                    TransactionType::StockIn => Expr::col(inventory_item::Column::Quantity).add(quantity),
                    TransactionType::StockOut => Expr::col(inventory_item::Column::Quantity).sub(quantity),
                };
                let guard = match kind {
                    TransactionType::StockIn => {
                        inventory_item::Column::Quantity.lte(i32::MAX - quantity)
                    }
                    TransactionType::StockOut => inventory_item::Column::Quantity.gte(quantity),
                };
                let moved = inventory_item::Entity::update_many()
                    .col_expr(inventory_item::Column::Quantity, delta)
                    .col_expr(inventory_item::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(inventory_item::Column::Id.eq(item_id))
                    .filter(inventory_item::Column::CreatedBy.eq(owner_id))
                    .filter(guard)
                    .exec(txn)
                    .await?
                    .rows_affected;
                if moved != 1 {
                    // Missing item or failed guard; the read tells them apart.
                    let current = load_owned_item(txn, owner_id, item_id).await?;
                    return Err(match kind {
                        TransactionType::StockIn => ServiceError::InvalidInput(format!(
                            "Stock-in of {} would overflow the quantity of item {}",
                            quantity, item_id
                        )),
                        TransactionType::StockOut => insufficient_stock(&current, quantity),
                    });
                }

                let item = load_owned_item(txn, owner_id, item_id).await?;
                let transaction = record_transaction(txn, &item, kind, quantity, notes).await?;

                let change = alerts::reconcile_low_stock(txn, &item).await?;
                match kind {
                    TransactionType::StockIn => {
                        alerts::clear_out_of_stock(txn, &item).await?;
                    }
                    TransactionType::StockOut => {
                        alerts::notify_out_of_stock(txn, &item).await?;
                    }
                }

                Ok((item, transaction, change))
            })
        })
        .await;

        let (item, transaction, change) = match result {
            Ok(parts) => parts,
            Err(err) => {
                counter!("stockroom_ledger.rejected", 1, "type" => kind_label, "reason" => err.kind());
                return Err(err);
            }
        };

        info!(
            item_id = %item.id,
            transaction_id = %transaction.id,
            new_quantity = item.quantity,
            "stock {} recorded",
            kind
        );
        counter!("stockroom_ledger.movements", 1, "type" => kind_label);

        self.publish_movement(&item, &transaction).await;
        self.publish_alert_change(&item, change).await;

        Ok(LedgerEntry { item, transaction })
    }

    /// Updates descriptive fields and the reorder point; re-evaluates the
    /// low-stock alert in the same transaction.
    #[instrument(skip(self, update))]
    pub async fn update_item(
        &self,
        owner_id: Uuid,
        item_id: Uuid,
        update: ItemUpdate,
    ) -> Result<inventory_item::Model, ServiceError> {
        update.validate()?;

        let (item, change) = with_transaction(self.db.as_ref(), "update_item", move |txn| {
            Box::pin(async move {
                let current = lock_owned_item(txn, owner_id, item_id).await?;
                let mut active: inventory_item::ActiveModel = current.into();

                if let Some(name) = update.name {
                    active.name = Set(name.trim().to_string());
                }
                if let Some(description) = update.description {
                    active.description = Set(description.filter(|text| !text.trim().is_empty()));
                }
                if let Some(category) = update.category {
                    active.category = Set(category.trim().to_string());
                }
                if let Some(unit_price) = update.unit_price {
                    active.unit_price = Set(unit_price);
                }
                if let Some(reorder_point) = update.reorder_point {
                    active.reorder_point = Set(reorder_point);
                }

                let item = active.update(txn).await?;
                let change = alerts::reconcile_low_stock(txn, &item).await?;
                Ok((item, change))
            })
        })
        .await?;

        self.event_sender
            .send_or_log(Event::ItemUpdated {
                item_id: item.id,
                owner_id,
            })
            .await;
        self.publish_alert_change(&item, change).await;

        Ok(item)
    }

    /// Deletes an item that has no ledger history. Items referenced by any
    /// stock transaction are kept and the call fails with `Conflict`.
    #[instrument(skip(self))]
    pub async fn delete_item(&self, owner_id: Uuid, item_id: Uuid) -> Result<(), ServiceError> {
        with_transaction(self.db.as_ref(), "delete_item", move |txn| {
            Box::pin(async move {
                let item = lock_owned_item(txn, owner_id, item_id).await?;

                let history = stock_transaction::Entity::find()
                    .filter(stock_transaction::Column::ItemId.eq(item.id))
                    .count(txn)
                    .await?;
                if history > 0 {
                    return Err(ServiceError::Conflict(format!(
                        "Cannot delete item {}: {} stock transaction(s) reference it",
                        item.id, history
                    )));
                }

                alert::Entity::delete_many()
                    .filter(alert::Column::ItemId.eq(item.id))
                    .exec(txn)
                    .await?;
                inventory_item::Entity::delete_by_id(item.id)
                    .exec(txn)
                    .await?;
                Ok(())
            })
        })
        .await?;

        info!(%item_id, "inventory item deleted");
        self.event_sender
            .send_or_log(Event::ItemDeleted { item_id, owner_id })
            .await;
        Ok(())
    }

    async fn publish_movement(
        &self,
        item: &inventory_item::Model,
        transaction: &stock_transaction::Model,
    ) {
        self.event_sender
            .send_or_log(Event::StockMoved {
                item_id: item.id,
                transaction_id: transaction.id,
                transaction_type: transaction.transaction_type,
                quantity: transaction.quantity,
                new_quantity: item.quantity,
            })
            .await;
    }

    async fn publish_alert_change(&self, item: &inventory_item::Model, change: Option<AlertChange>) {
        let event = match change {
            Some(AlertChange::Raised(alert)) => Event::LowStockRaised {
                item_id: item.id,
                alert_id: alert.id,
                quantity: item.quantity,
                reorder_point: item.reorder_point,
            },
            Some(AlertChange::Cleared { .. }) => Event::LowStockCleared {
                item_id: item.id,
                quantity: item.quantity,
            },
            None => return,
        };
        self.event_sender.send_or_log(event).await;
    }
}

fn insufficient_stock(item: &inventory_item::Model, requested: i32) -> ServiceError {
    warn!(
        item_id = %item.id,
        available = item.quantity,
        requested,
        "stock-out rejected"
    );
    ServiceError::InsufficientStock(format!(
        "Insufficient stock for {}: {} available, {} requested",
        item.name, item.quantity, requested
    ))
}

/// Loads an item owned by `owner_id`. Items owned by someone else are
/// reported as not found.
async fn load_owned_item<C>(
    conn: &C,
    owner_id: Uuid,
    item_id: Uuid,
) -> Result<inventory_item::Model, ServiceError>
where
    C: ConnectionTrait,
{
    inventory_item::Entity::find_by_id(item_id)
        .filter(inventory_item::Column::CreatedBy.eq(owner_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::item_not_found(item_id))
}

/// Write-locks the item by touching `updated_at`, then loads it. Must be the
/// first statement of the transaction.
async fn lock_owned_item<C>(
    conn: &C,
    owner_id: Uuid,
    item_id: Uuid,
) -> Result<inventory_item::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let touched = inventory_item::Entity::update_many()
        .col_expr(inventory_item::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(inventory_item::Column::Id.eq(item_id))
        .filter(inventory_item::Column::CreatedBy.eq(owner_id))
        .exec(conn)
        .await?
        .rows_affected;
    if touched == 0 {
        return Err(ServiceError::item_not_found(item_id));
    }
    load_owned_item(conn, owner_id, item_id).await
}

async fn record_transaction<C>(
    conn: &C,
    item: &inventory_item::Model,
    kind: TransactionType,
    quantity: i32,
    notes: Option<String>,
) -> Result<stock_transaction::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let transaction = stock_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        item_id: Set(item.id),
        quantity: Set(quantity),
        transaction_type: Set(kind),
        date: Set(Utc::now()),
        notes: Set(notes),
        total_value: Set(total_value(quantity, item.unit_price)?),
        created_by: Set(item.created_by),
    }
    .insert(conn)
    .await?;
    Ok(transaction)
}
