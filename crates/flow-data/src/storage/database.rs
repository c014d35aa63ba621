//! 연결 풀 래퍼.

use crate::error::{DataError, Result};
use flow_core::DatabaseSettings;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// 데이터베이스 연결 풀.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 설정의 URL로 연결합니다.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let url = settings
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| DataError::ConnectionError("DATABASE_URL이 설정되지 않았습니다".into()))?;

        info!("Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;
        info!("Database connection established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 내장 마이그레이션 실행.
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DataError::MigrationError(e.to_string()))?;
        info!("Migrations completed successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_without_url_fails_fast() {
        let settings = DatabaseSettings {
            url: Some("  ".to_string()),
            max_connections: 1,
        };
        assert!(matches!(
            Database::connect(&settings).await,
            Err(DataError::ConnectionError(_))
        ));
    }
}
