use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// A stocked item owned by a single user. `quantity` is only ever changed
/// through the stock ledger.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_items")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(nullable)]
    pub description: Option<String>,
    pub category: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub reorder_point: i32,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// At or below the reorder point.
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.reorder_point
    }

    /// Value of the units on hand at the current unit price.
    pub fn stock_value(&self) -> Result<Decimal, ServiceError> {
        Decimal::from(self.quantity)
            .checked_mul(self.unit_price)
            .ok_or_else(|| {
                ServiceError::InvalidInput(format!("Stock value of item {} overflows", self.id))
            })
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_transaction::Entity")]
    StockTransactions,
    #[sea_orm(has_many = "super::alert::Entity")]
    Alerts,
}

impl Related<super::stock_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockTransactions.def()
    }
}

impl Related<super::alert::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Alerts.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();
        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
        }
        active_model.updated_at = Set(now);
        Ok(active_model)
    }
}
