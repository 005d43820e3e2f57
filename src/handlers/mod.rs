pub mod alerts;
pub mod common;
pub mod dashboard;
pub mod inventory;
pub mod reports;
pub mod transactions;
