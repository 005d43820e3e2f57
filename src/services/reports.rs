//! Read-only aggregation behind the dashboard and report endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::{inventory_item, stock_transaction, TransactionType},
    errors::ServiceError,
};

pub const RECENT_TRANSACTIONS: u64 = 5;
pub const DEFAULT_VOLUME_DAYS: u32 = 7;
pub const MAX_VOLUME_DAYS: u32 = 365;

const DELETED_ITEM_NAME: &str = "Deleted Item";
const UNKNOWN_CATEGORY: &str = "N/A";

/// A ledger entry joined with the item it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRow {
    pub id: Uuid,
    pub item_id: Uuid,
    pub item_name: String,
    pub item_category: String,
    pub quantity: i32,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub date: DateTime<Utc>,
    pub notes: Option<String>,
    pub total_value: Decimal,
}

impl TransactionRow {
    fn from_parts(
        transaction: stock_transaction::Model,
        item: Option<inventory_item::Model>,
    ) -> Self {
        let (item_name, item_category) = match item {
            Some(item) => (item.name, item.category),
            None => (DELETED_ITEM_NAME.to_string(), UNKNOWN_CATEGORY.to_string()),
        };
        Self {
            id: transaction.id,
            item_id: transaction.item_id,
            item_name,
            item_category,
            quantity: transaction.quantity,
            transaction_type: transaction.transaction_type,
            date: transaction.date,
            notes: transaction.notes,
            total_value: transaction.total_value,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_products: u64,
    pub low_stock_products: u64,
    pub total_value: Decimal,
    pub total_transactions: u64,
    pub recent_transactions: Vec<TransactionRow>,
}

/// Daily stock-in/stock-out volume, oldest day first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionVolume {
    pub labels: Vec<String>,
    pub stock_in: Vec<i64>,
    pub stock_out: Vec<i64>,
    pub transactions: Vec<TransactionRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryDistribution {
    pub labels: Vec<String>,
    pub data: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReportRow {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub quantity: i32,
    pub reorder_point: i32,
    pub stock_in: i64,
    pub stock_out: i64,
    pub turnover: Decimal,
    pub value: Decimal,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReportQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(alias = "type")]
    pub transaction_type: Option<TransactionType>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReportQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub category: Option<String>,
}

/// Inclusive calendar-day range in UTC: from 00:00:00.000 on the start day to
/// 23:59:59.999 on the end day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateBounds {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateBounds {
    pub fn resolve(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, ServiceError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(ServiceError::InvalidInput(format!(
                    "startDate {} is after endDate {}",
                    start, end
                )));
            }
        }
        let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
        Ok(Self {
            from: start.map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN))),
            to: end.map(|d| Utc.from_utc_datetime(&d.and_time(end_of_day))),
        })
    }

    fn apply(
        &self,
        mut select: sea_orm::Select<stock_transaction::Entity>,
    ) -> sea_orm::Select<stock_transaction::Entity> {
        if let Some(from) = self.from {
            select = select.filter(stock_transaction::Column::Date.gte(from));
        }
        if let Some(to) = self.to {
            select = select.filter(stock_transaction::Column::Date.lte(to));
        }
        select
    }
}

/// Labels for the `days` calendar days ending with `today`, oldest first.
pub fn day_labels(today: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..days)
        .rev()
        .filter_map(|offset| today.checked_sub_days(Days::new(u64::from(offset))))
        .collect()
}

/// `stock_out / max(quantity, 1)`, rounded to four places.
pub fn turnover(stock_out: i64, quantity: i32) -> Decimal {
    let on_hand = Decimal::from(quantity.max(1));
    (Decimal::from(stock_out) / on_hand).round_dp(4)
}

#[derive(Clone)]
pub struct ReportService {
    db: Arc<DatabaseConnection>,
}

impl ReportService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn dashboard_stats(&self, owner_id: Uuid) -> Result<DashboardStats, ServiceError> {
        let items = inventory_item::Entity::find()
            .filter(inventory_item::Column::CreatedBy.eq(owner_id))
            .all(self.db.as_ref())
            .await?;

        let low_stock_products = items.iter().filter(|item| item.is_low_stock()).count() as u64;
        let total_value = items.iter().try_fold(Decimal::ZERO, |total, item| {
            total.checked_add(item.stock_value()?).ok_or_else(|| {
                ServiceError::InvalidInput("Total inventory value overflows".into())
            })
        })?;

        let total_transactions = stock_transaction::Entity::find()
            .filter(stock_transaction::Column::CreatedBy.eq(owner_id))
            .count(self.db.as_ref())
            .await?;

        let recent_transactions = stock_transaction::Entity::find()
            .filter(stock_transaction::Column::CreatedBy.eq(owner_id))
            .find_also_related(inventory_item::Entity)
            .order_by_desc(stock_transaction::Column::Date)
            .limit(RECENT_TRANSACTIONS)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|(transaction, item)| TransactionRow::from_parts(transaction, item))
            .collect();

        Ok(DashboardStats {
            total_products: items.len() as u64,
            low_stock_products,
            total_value,
            total_transactions,
            recent_transactions,
        })
    }

    /// Per-day volume for the last `days` days, today included.
    #[instrument(skip(self))]
    pub async fn transaction_volume(
        &self,
        owner_id: Uuid,
        days: Option<u32>,
    ) -> Result<TransactionVolume, ServiceError> {
        let days = days.unwrap_or(DEFAULT_VOLUME_DAYS);
        if !(1..=MAX_VOLUME_DAYS).contains(&days) {
            return Err(ServiceError::InvalidInput(format!(
                "days must be between 1 and {}",
                MAX_VOLUME_DAYS
            )));
        }

        let labels = day_labels(Utc::now().date_naive(), days);
        let bounds = DateBounds::resolve(labels.first().copied(), None)?;

        let rows: Vec<TransactionRow> = bounds
            .apply(
                stock_transaction::Entity::find()
                    .filter(stock_transaction::Column::CreatedBy.eq(owner_id)),
            )
            .find_also_related(inventory_item::Entity)
            .order_by_desc(stock_transaction::Column::Date)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|(transaction, item)| TransactionRow::from_parts(transaction, item))
            .collect();

        let index: HashMap<NaiveDate, usize> = labels
            .iter()
            .enumerate()
            .map(|(position, day)| (*day, position))
            .collect();
        let mut stock_in = vec![0i64; labels.len()];
        let mut stock_out = vec![0i64; labels.len()];
        for row in &rows {
            if let Some(&position) = index.get(&row.date.date_naive()) {
                match row.transaction_type {
                    TransactionType::StockIn => stock_in[position] += i64::from(row.quantity),
                    TransactionType::StockOut => stock_out[position] += i64::from(row.quantity),
                }
            }
        }

        Ok(TransactionVolume {
            labels: labels.iter().map(|day| day.format("%Y-%m-%d").to_string()).collect(),
            stock_in,
            stock_out,
            transactions: rows,
        })
    }

    /// Total quantity on hand per category, largest first.
    #[instrument(skip(self))]
    pub async fn category_distribution(
        &self,
        owner_id: Uuid,
    ) -> Result<CategoryDistribution, ServiceError> {
        let items = inventory_item::Entity::find()
            .filter(inventory_item::Column::CreatedBy.eq(owner_id))
            .all(self.db.as_ref())
            .await?;

        let mut totals: HashMap<String, i64> = HashMap::new();
        for item in items {
            *totals.entry(item.category).or_default() += i64::from(item.quantity);
        }

        let mut ranked: Vec<(String, i64)> = totals.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let (labels, data) = ranked.into_iter().unzip();
        Ok(CategoryDistribution { labels, data })
    }

    #[instrument(skip(self))]
    pub async fn transaction_report(
        &self,
        owner_id: Uuid,
        query: TransactionReportQuery,
    ) -> Result<Vec<TransactionRow>, ServiceError> {
        let bounds = DateBounds::resolve(query.start_date, query.end_date)?;

        let mut select = bounds.apply(
            stock_transaction::Entity::find()
                .filter(stock_transaction::Column::CreatedBy.eq(owner_id)),
        );
        if let Some(kind) = query.transaction_type {
            select = select.filter(stock_transaction::Column::TransactionType.eq(kind));
        }

        Ok(select
            .find_also_related(inventory_item::Entity)
            .order_by_desc(stock_transaction::Column::Date)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|(transaction, item)| TransactionRow::from_parts(transaction, item))
            .collect())
    }

    /// Per-item movement totals within the range, with turnover and stock value.
    #[instrument(skip(self))]
    pub async fn inventory_report(
        &self,
        owner_id: Uuid,
        query: InventoryReportQuery,
    ) -> Result<Vec<InventoryReportRow>, ServiceError> {
        let bounds = DateBounds::resolve(query.start_date, query.end_date)?;

        let mut items = inventory_item::Entity::find()
            .filter(inventory_item::Column::CreatedBy.eq(owner_id));
        if let Some(category) = query.category.as_deref().map(str::trim) {
            if !category.is_empty() {
                items = items.filter(inventory_item::Column::Category.eq(category));
            }
        }
        let items = items
            .order_by_asc(inventory_item::Column::Name)
            .all(self.db.as_ref())
            .await?;

        let transactions = bounds
            .apply(
                stock_transaction::Entity::find()
                    .filter(stock_transaction::Column::CreatedBy.eq(owner_id)),
            )
            .all(self.db.as_ref())
            .await?;

        let mut movements: HashMap<Uuid, (i64, i64)> = HashMap::new();
        for transaction in transactions {
            let entry = movements.entry(transaction.item_id).or_default();
            match transaction.transaction_type {
                TransactionType::StockIn => entry.0 += i64::from(transaction.quantity),
                TransactionType::StockOut => entry.1 += i64::from(transaction.quantity),
            }
        }

        items
            .into_iter()
            .map(|item| {
                let (stock_in, stock_out) = movements.get(&item.id).copied().unwrap_or_default();
                Ok(InventoryReportRow {
                    id: item.id,
                    value: item.stock_value()?,
                    turnover: turnover(stock_out, item.quantity),
                    name: item.name,
                    category: item.category,
                    quantity: item.quantity,
                    reorder_point: item.reorder_point,
                    stock_in,
                    stock_out,
                    updated_at: item.updated_at,
                })
            })
            .collect()
    }
}
