//! 설정에서 수집 서비스를 조립합니다.

use crate::aggregator::{MarketDataAggregator, MarketDataSource};
use crate::ingest::IngestionService;
use crate::mock::MockMarketSource;
use crate::scheduler::IngestionScheduler;
use flow_core::{
    AppConfig, FetchMode, FlowError, FlowResult, InMemoryRecordStore, InMemoryTokenStore,
    RecordStore, TokenStore,
};
use flow_data::{Database, PgRecordStore, PgTokenStore};
use flow_exchange::{KisTokenManager, ProviderSet};
use std::sync::Arc;
use tracing::{info, warn};

/// 조립된 실행 환경.
pub struct Runtime {
    pub service: IngestionService,
    /// 실제 모드에서만 존재
    pub tokens: Option<KisTokenManager>,
    database: Option<Database>,
}

impl Runtime {
    /// 토큰 통계를 남기고 연결 풀을 닫습니다.
    pub async fn shutdown(self) {
        if let Some(tokens) = &self.tokens {
            info!(
                acquisitions = tokens.acquisition_count(),
                invalidations = tokens.invalidation_count(),
                "KIS token usage"
            );
        }
        if let Some(database) = self.database {
            database.pool().close().await;
        }
    }
}

/// 설정에 따라 저장소와 데이터 공급원을 고르고 서비스를 만듭니다.
///
/// `DATABASE_URL`이 없으면 모의 모드에서는 인메모리 저장소로 대체하고,
/// 실제 모드에서는 설정 에러로 실패합니다.
pub async fn build_service(config: &AppConfig) -> FlowResult<Runtime> {
    let scheduler = IngestionScheduler::from_settings(&config.schedule)?;

    let database = match (&config.database.url, config.fetch_mode) {
        (Some(_), _) => {
            let database = Database::connect(&config.database).await?;
            database.migrate().await?;
            info!("데이터베이스 연결 및 마이그레이션 완료");
            Some(database)
        }
        (None, FetchMode::Mock) => {
            warn!("DATABASE_URL 미설정: 인메모리 저장소 사용 (프로세스 종료 시 소실)");
            None
        }
        (None, FetchMode::Real) => {
            return Err(FlowError::Configuration(
                "DATABASE_URL is required when FETCH_MODE=real".to_string(),
            ));
        }
    };

    let (records, token_store): (Arc<dyn RecordStore>, Arc<dyn TokenStore>) = match &database {
        Some(database) => (
            Arc::new(PgRecordStore::new(database.pool().clone())),
            Arc::new(PgTokenStore::new(database.pool().clone())),
        ),
        None => (
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(InMemoryTokenStore::new()),
        ),
    };

    let (source, tokens): (Arc<dyn MarketDataSource>, Option<KisTokenManager>) =
        match config.fetch_mode {
            FetchMode::Mock => (Arc::new(MockMarketSource::new()), None),
            FetchMode::Real => {
                let providers =
                    ProviderSet::from_settings(&config.kis, &config.providers, token_store)?;
                (
                    Arc::new(MarketDataAggregator::from_providers(&providers)),
                    Some(providers.tokens.clone()),
                )
            }
        };

    info!(
        source = source.name(),
        persistent = database.is_some(),
        timezone = %config.schedule.timezone,
        "Ingestion service ready"
    );

    Ok(Runtime {
        service: IngestionService::new(scheduler, source, records, &config.schedule),
        tokens,
        database,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_mode_without_database_uses_memory() {
        let config = AppConfig::default();
        let runtime = build_service(&config).await.unwrap();
        assert_eq!(runtime.service.source_name(), "mock");
        assert!(runtime.tokens.is_none());
        assert!(runtime.database.is_none());
    }

    #[tokio::test]
    async fn test_real_mode_requires_database() {
        let config = AppConfig {
            fetch_mode: FetchMode::Real,
            ..Default::default()
        };
        assert!(matches!(
            build_service(&config).await,
            Err(FlowError::Configuration(_))
        ));
    }
}
