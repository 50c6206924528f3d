use std::time::Duration;

use ridepool_core::StoreError;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::info;

use crate::app_config::DatabaseConfig;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Maps a driver error onto the store failure kinds the core understands.
pub(crate) fn classify_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        let code = db.code().map(|c| c.into_owned());
        return match code.as_deref() {
            Some("23505") => StoreError::UniqueViolation(db.message().to_string()),
            Some("23503") => StoreError::ForeignKeyViolation(db.message().to_string()),
            Some(code) if is_transient_sqlstate(code) => StoreError::Unavailable(db.message().to_string()),
            _ => StoreError::Backend(err.to_string()),
        };
    }

    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
            StoreError::Unavailable(err.to_string())
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(e.to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

/// Serialization failure, deadlock, lock timeout, statement timeout.
fn is_transient_sqlstate(code: &str) -> bool {
    matches!(code, "40001" | "40P01" | "55P03" | "57014")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_transient() {
        assert!(matches!(classify_error(sqlx::Error::PoolTimedOut), StoreError::Unavailable(_)));
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(classify_error(sqlx::Error::Io(io)), StoreError::Unavailable(_)));
    }

    #[test]
    fn test_row_errors_are_backend_failures() {
        assert!(matches!(classify_error(sqlx::Error::RowNotFound), StoreError::Backend(_)));
    }

    #[test]
    fn test_transient_sqlstates() {
        assert!(is_transient_sqlstate("40P01"));
        assert!(is_transient_sqlstate("40001"));
        assert!(!is_transient_sqlstate("23505"));
    }
}
