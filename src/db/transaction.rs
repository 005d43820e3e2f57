//! Transaction helper that keeps the caller's error type intact.
//!
//! Commits when the closure returns `Ok`, rolls back otherwise.

use crate::errors::ServiceError;
use metrics::{counter, histogram};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionError, TransactionTrait};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute `f` inside a database transaction.
///
/// ```rust,ignore
/// let item = with_transaction(&db, "stock_in", |txn| {
///     Box::pin(async move {
///         let item = load_item(txn, id).await?;
///         record_transaction(txn, &item).await?;
///         Ok(item)
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<F, T>(
    db: &DatabaseConnection,
    operation: &'static str,
    f: F,
) -> Result<T, ServiceError>
where
    F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T, ServiceError>> + Send,
    T: Send,
{
    let start = std::time::Instant::now();
    counter!("stockroom_db.transaction.started", 1, "operation" => operation);

    let result = db.transaction::<_, T, ServiceError>(f).await;

    let elapsed = start.elapsed();
    histogram!("stockroom_db.transaction.duration", elapsed, "operation" => operation);

    match result {
        Ok(value) => {
            counter!("stockroom_db.transaction.committed", 1, "operation" => operation);
            debug!(operation, ?elapsed, "transaction committed");
            Ok(value)
        }
        Err(err) => {
            counter!("stockroom_db.transaction.rolled_back", 1, "operation" => operation);
            let err = match err {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            };
            warn!(operation, ?elapsed, error = %err, "transaction rolled back");
            Err(err)
        }
    }
}
