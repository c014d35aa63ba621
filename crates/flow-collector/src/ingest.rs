//! 수집 작업.
//!
//! - `ingest_now`: 현재 슬롯(그리드 미적용) 즉시 수집
//! - `run_scheduled`: 그리드 슬롯, 거래 시간 외에는 건너뜀
//! - `backfill`: 계획을 먼저 검증한 뒤 슬롯별로 순차 수집
//! - `records` / `cleanup`: 저장된 레코드 조회 및 정리

use crate::aggregator::MarketDataSource;
use crate::scheduler::IngestionScheduler;
use crate::stats::IngestStats;
use chrono::{DateTime, NaiveDate, Utc};
use flow_core::{
    parse_date, CleanupFilter, FlowResult, HourMinute, MarketRecord, RecordStore,
    ScheduleSettings, TimeSlot,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// 거래 시간 외 건너뜀 사유.
pub const OUTSIDE_MARKET_HOURS: &str = "outside_market_hours";

/// 단일 수집 결과.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// 저장됨
    Ingested {
        date: NaiveDate,
        time: HourMinute,
        source: &'static str,
    },
    /// 건너뜀 (에러 아님)
    Skipped {
        date: NaiveDate,
        time: HourMinute,
        reason: &'static str,
    },
}

impl IngestOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// 백필 요청. 비어 있는 값은 설정 기본값을 씁니다.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillRequest {
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub interval_minutes: Option<i64>,
}

/// 백필 결과.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub date: NaiveDate,
    pub count: usize,
    pub start_time: String,
    pub end_time: String,
    pub interval_minutes: u32,
    pub stats: IngestStats,
}

/// 날짜별 레코드 조회 결과.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsReport {
    pub date: NaiveDate,
    pub count: usize,
    pub records: Vec<MarketRecord>,
}

/// 정리 결과.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub deleted: u64,
    /// 대상 날짜 또는 `"all"`
    pub date: String,
    pub include_pre_open: bool,
}

/// 백필 기본값.
#[derive(Debug, Clone, Copy)]
struct BackfillDefaults {
    start: HourMinute,
    end: HourMinute,
    interval_minutes: u32,
}

impl From<&ScheduleSettings> for BackfillDefaults {
    fn from(settings: &ScheduleSettings) -> Self {
        Self {
            start: settings.backfill_start,
            end: settings.backfill_end,
            interval_minutes: settings.backfill_interval_minutes,
        }
    }
}

/// 비어 있지 않은 문자열 값.
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// 수집 서비스.
#[derive(Clone)]
pub struct IngestionService {
    scheduler: IngestionScheduler,
    source: Arc<dyn MarketDataSource>,
    records: Arc<dyn RecordStore>,
    defaults: BackfillDefaults,
}

impl IngestionService {
    pub fn new(
        scheduler: IngestionScheduler,
        source: Arc<dyn MarketDataSource>,
        records: Arc<dyn RecordStore>,
        settings: &ScheduleSettings,
    ) -> Self {
        Self {
            scheduler,
            source,
            records,
            defaults: BackfillDefaults::from(settings),
        }
    }

    pub fn scheduler(&self) -> &IngestionScheduler {
        &self.scheduler
    }

    /// 데이터 공급원 이름 ("real" / "mock").
    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// 현재 슬롯을 거래 시간과 무관하게 수집합니다.
    pub async fn ingest_now(&self, now: DateTime<Utc>) -> FlowResult<IngestOutcome> {
        let slot = self.scheduler.current_slot(now, false);
        self.ingest_slot(slot).await
    }

    /// 크론 진입점: 그리드 슬롯, 거래 시간 외에는 건너뜁니다.
    pub async fn run_scheduled(&self, now: DateTime<Utc>) -> FlowResult<IngestOutcome> {
        let slot = self.scheduler.current_slot(now, true);

        if !self.scheduler.should_sample(now) {
            info!(slot = %slot, "[cron] skipped outside market hours");
            return Ok(IngestOutcome::Skipped {
                date: slot.date,
                time: slot.time,
                reason: OUTSIDE_MARKET_HOURS,
            });
        }

        self.ingest_slot(slot).await
    }

    async fn ingest_slot(&self, slot: TimeSlot) -> FlowResult<IngestOutcome> {
        let data = self.source.fetch().await?;
        let record = MarketRecord::new(slot, &data);
        self.records.upsert(&record).await?;

        info!(
            slot = %slot,
            source = self.source.name(),
            nasdaq_change_pct = data.nasdaq_change_pct,
            usdkrw = data.usdkrw,
            "Market record ingested"
        );
        Ok(IngestOutcome::Ingested {
            date: slot.date,
            time: slot.time,
            source: self.source.name(),
        })
    }

    /// 백필: 계획 검증이 모든 네트워크 호출보다 먼저입니다.
    ///
    /// 슬롯마다 새 스냅샷을 받아 순차 upsert하며, 실패하면 그 자리에서 중단합니다.
    /// 이미 저장된 슬롯은 그대로 남습니다.
    pub async fn backfill(
        &self,
        request: &BackfillRequest,
        now: DateTime<Utc>,
    ) -> FlowResult<BackfillReport> {
        let date = non_blank(&request.date)
            .map(str::to_string)
            .unwrap_or_else(|| self.scheduler.today(now).format("%Y-%m-%d").to_string());
        let start_time = non_blank(&request.start_time)
            .map(str::to_string)
            .unwrap_or_else(|| self.defaults.start.to_string());
        let end_time = non_blank(&request.end_time)
            .map(str::to_string)
            .unwrap_or_else(|| self.defaults.end.to_string());
        let interval = request
            .interval_minutes
            .unwrap_or(i64::from(self.defaults.interval_minutes));

        let plan = self
            .scheduler
            .plan_backfill(&date, &start_time, &end_time, interval)?;

        info!(
            date = %plan.date(),
            slots = plan.len(),
            interval = plan.interval_minutes(),
            source = self.source.name(),
            "Backfill started"
        );

        let started = Instant::now();
        let mut stats = IngestStats::new();

        for slot in plan.slots() {
            stats.attempted += 1;
            match self.ingest_slot(*slot).await {
                Ok(_) => stats.ingested += 1,
                Err(e) => {
                    stats.failed += 1;
                    stats.elapsed = started.elapsed();
                    error!(slot = %slot, error = %e, "Backfill aborted");
                    stats.log_summary("백필");
                    return Err(e);
                }
            }
        }

        stats.elapsed = started.elapsed();
        stats.log_summary("백필");

        Ok(BackfillReport {
            date: plan.date(),
            count: plan.len(),
            start_time,
            end_time,
            interval_minutes: plan.interval_minutes(),
            stats,
        })
    }

    /// 날짜의 레코드를 시각 오름차순으로 조회합니다. 날짜가 없으면 오늘.
    pub async fn records(
        &self,
        date: Option<&str>,
        now: DateTime<Utc>,
    ) -> FlowResult<RecordsReport> {
        let date = match date.map(str::trim).filter(|d| !d.is_empty()) {
            Some(d) => parse_date(d)?,
            None => self.scheduler.today(now),
        };
        let records = self.records.list_by_date(date).await?;
        Ok(RecordsReport {
            date,
            count: records.len(),
            records,
        })
    }

    /// 장 마감 이후(선택적으로 장 시작 이전) 레코드를 삭제합니다.
    pub async fn cleanup(
        &self,
        date: Option<&str>,
        include_pre_open: bool,
    ) -> FlowResult<CleanupReport> {
        let date = date
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(parse_date)
            .transpose()?;

        let filter = CleanupFilter {
            date,
            window: self.scheduler.clock().window(),
            include_pre_open,
        };
        let deleted = self.records.delete_matching(&filter).await?;

        info!(deleted, date = ?date, include_pre_open, "Records cleaned up");
        Ok(CleanupReport {
            deleted,
            date: date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "all".to_string()),
            include_pre_open,
        })
    }
}
