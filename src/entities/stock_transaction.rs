use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Direction of a ledger entry.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum TransactionType {
    #[sea_orm(string_value = "stock-in")]
    #[serde(rename = "stock-in")]
    #[strum(serialize = "stock-in")]
    StockIn,
    #[sea_orm(string_value = "stock-out")]
    #[serde(rename = "stock-out")]
    #[strum(serialize = "stock-out")]
    StockOut,
}

impl TransactionType {
    /// Signed effect of `quantity` units of this type on an item's stock.
    pub fn signed(self, quantity: i32) -> i64 {
        match self {
            TransactionType::StockIn => i64::from(quantity),
            TransactionType::StockOut => -i64::from(quantity),
        }
    }
}

/// Immutable ledger entry. Rows are inserted, never updated.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_transactions")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub item_id: Uuid,
    pub quantity: i32,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub date: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub notes: Option<String>,
    pub total_value: Decimal,
    pub created_by: Uuid,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inventory_item::Entity",
        from = "Column::ItemId",
        to = "super::inventory_item::Column::Id"
    )]
    InventoryItem,
}

impl Related<super::inventory_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
