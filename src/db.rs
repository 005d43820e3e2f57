//! Connection pool setup and schema management.

pub mod transaction;

use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbBackend};
use sea_orm_migration::MigratorTrait;
use tracing::{debug, error, info, warn};

use crate::{config::AppConfig, errors::ServiceError, migrator::Migrator};

pub use transaction::with_transaction;

/// Pool sizing and timeouts resolved from [`AppConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl PoolSettings {
    pub fn backend(&self) -> DbBackend {
        if self.url.starts_with("postgres") {
            DbBackend::Postgres
        } else {
            DbBackend::Sqlite
        }
    }

    /// Each connection to `sqlite::memory:` opens its own empty database,
    /// so such pools are pinned to a single connection.
    fn is_shared_memory_only(&self) -> bool {
        self.backend() == DbBackend::Sqlite && self.url.contains(":memory:")
    }

    fn connect_options(&self) -> ConnectOptions {
        let (max, min) = if self.is_shared_memory_only() {
            (1, 1)
        } else {
            (
                self.max_connections,
                self.min_connections.min(self.max_connections),
            )
        };

        let mut opt = ConnectOptions::new(self.url.clone());
        opt.max_connections(max)
            .min_connections(min)
            .connect_timeout(self.connect_timeout)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .sqlx_logging(false);
        opt
    }
}

impl From<&AppConfig> for PoolSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
        }
    }
}

/// Opens the pool described by `cfg`.
pub async fn connect(cfg: &AppConfig) -> Result<DatabaseConnection, ServiceError> {
    let settings = PoolSettings::from(cfg);
    if settings.is_shared_memory_only() && settings.max_connections > 1 {
        warn!("in-memory sqlite database; pool limited to one connection");
    }

    let backend = settings.backend();
    info!(?backend, max_connections = settings.max_connections, "opening database pool");
    gauge!("stockroom_db.max_connections", settings.max_connections as f64);

    Database::connect(settings.connect_options())
        .await
        .map_err(|e| {
            error!(error = %e, ?backend, "database pool could not be opened");
            ServiceError::DatabaseError(e)
        })
}

/// Applies every pending migration.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), ServiceError> {
    let started = Instant::now();
    Migrator::up(db, None).await.map_err(|e| {
        error!(error = %e, "schema migration failed");
        ServiceError::DatabaseError(e)
    })?;
    info!(elapsed = ?started.elapsed(), "schema up to date");
    Ok(())
}

/// Round-trips to the database; used by the readiness probe.
pub async fn ping(db: &DatabaseConnection) -> Result<(), ServiceError> {
    let started = Instant::now();
    match db.ping().await {
        Ok(()) => {
            histogram!("stockroom_db.ping", started.elapsed());
            debug!(elapsed = ?started.elapsed(), "database ping ok");
            Ok(())
        }
        Err(e) => {
            counter!("stockroom_db.ping_failures", 1);
            warn!(error = %e, "database ping failed");
            Err(ServiceError::DatabaseError(e))
        }
    }
}

pub async fn close(db: DatabaseConnection) -> Result<(), ServiceError> {
    info!("closing database pool");
    db.close().await.map_err(ServiceError::DatabaseError)
}
