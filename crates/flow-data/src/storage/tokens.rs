//! `service_tokens` 테이블 기반 토큰 보관소.

use crate::error::DataError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flow_core::{Credential, FlowResult, TokenStore};
use sqlx::postgres::PgPool;
use sqlx::FromRow;

#[derive(Debug, FromRow)]
struct TokenRow {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// PostgreSQL 토큰 보관소. 같은 이름에 대한 쓰기는 마지막 기록이 이깁니다.
#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn load(&self, name: &str) -> FlowResult<Option<Credential>> {
        let row: Option<TokenRow> = sqlx::query_as(
            "SELECT access_token, expires_at FROM service_tokens WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(DataError::from)?;

        Ok(row.map(|r| Credential::new(r.access_token, r.expires_at)))
    }

    async fn save(&self, name: &str, credential: &Credential) -> FlowResult<()> {
        sqlx::query(
            r#"
            INSERT INTO service_tokens (name, access_token, expires_at, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (name) DO UPDATE SET
                access_token = EXCLUDED.access_token,
                expires_at = EXCLUDED.expires_at,
                updated_at = NOW()
            "#,
        )
        .bind(name)
        .bind(credential.access_token())
        .bind(credential.expires_at)
        .execute(&self.pool)
        .await
        .map_err(DataError::from)?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> FlowResult<()> {
        sqlx::query("DELETE FROM service_tokens WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(DataError::from)?;
        Ok(())
    }
}
