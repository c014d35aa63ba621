//! 시장 수급 수집기.
//!
//! 이 crate는 다음을 제공합니다:
//! - 거래 시간 판정 및 백필 계획 (`scheduler`)
//! - 지표별 공급자 병렬 조회 및 스냅샷 집계 (`aggregator`)
//! - 네트워크 없이 파이프라인을 돌리는 모의 데이터 (`mock`)
//! - 수집/백필/조회/정리 작업 (`ingest`)
//! - 설정 기반 조립 (`bootstrap`)

pub mod aggregator;
pub mod bootstrap;
pub mod ingest;
pub mod mock;
pub mod scheduler;
pub mod stats;

pub use aggregator::{MarketDataAggregator, MarketDataSource};
pub use bootstrap::{build_service, Runtime};
pub use ingest::{
    BackfillReport, BackfillRequest, CleanupReport, IngestOutcome, IngestionService,
    RecordsReport,
};
pub use mock::MockMarketSource;
pub use scheduler::IngestionScheduler;
pub use stats::IngestStats;
