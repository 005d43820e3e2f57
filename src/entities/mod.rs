pub mod alert;
pub mod inventory_item;
pub mod stock_transaction;

pub use alert::{AlertPriority, AlertType};
pub use stock_transaction::TransactionType;
