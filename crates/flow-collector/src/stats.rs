//! 수집 실행 통계.

use serde::Serialize;
use std::time::Duration;

/// 백필/데몬 실행 통계.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    /// 시도한 슬롯 수
    pub attempted: usize,
    /// 저장 성공
    pub ingested: usize,
    /// 거래 시간 외 건너뜀
    pub skipped: usize,
    /// 실패
    pub failed: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 성공률 (%). 건너뛴 슬롯은 분모에서 제외합니다.
    pub fn success_rate(&self) -> f64 {
        let considered = self.attempted.saturating_sub(self.skipped);
        if considered == 0 {
            0.0
        } else {
            (self.ingested as f64 / considered as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            attempted = self.attempted,
            ingested = self.ingested,
            skipped = self.skipped,
            failed = self.failed,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "수집 완료"
        );
    }
}
