//! 모의 시장 데이터.
//!
//! 네트워크 없이 전체 수집 파이프라인을 돌리기 위한 그럴듯한 무작위 값을 만듭니다.

use crate::aggregator::MarketDataSource;
use async_trait::async_trait;
use flow_core::{AggregatedMarketData, FlowResult, MarketSnapshot};
use rand::Rng;

/// 무작위 스냅샷 공급원.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockMarketSource;

impl MockMarketSource {
    pub fn new() -> Self {
        Self
    }
}

/// `[min, max)` 범위 값을 `digits` 자리로 반올림.
fn between<R: Rng>(rng: &mut R, min: f64, max: f64, digits: i32) -> f64 {
    round_to(rng.gen_range(min..max), digits)
}

/// `±max_abs` 범위 값.
fn signed<R: Rng>(rng: &mut R, max_abs: f64, digits: i32) -> f64 {
    between(rng, -max_abs, max_abs, digits)
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

fn random_snapshot<R: Rng>(rng: &mut R) -> MarketSnapshot {
    MarketSnapshot {
        individual: signed(rng, 500_000_000.0, 0),
        individual_qty: Some(signed(rng, 200_000.0, 0)),
        foreign: signed(rng, 400_000_000.0, 0),
        foreign_qty: Some(signed(rng, 150_000.0, 0)),
        institution: signed(rng, 300_000_000.0, 0),
        institution_qty: Some(signed(rng, 120_000.0, 0)),
        change_pct: signed(rng, 3.0, 2),
        index_value: Some(between(rng, 2000.0, 3500.0, 2)),
        acc_volume: Some(between(rng, 100_000.0, 9_000_000.0, 0)),
        acc_amount: Some(between(rng, 10_000.0, 9_000_000.0, 0)),
    }
}

/// 무작위 집계 결과.
pub fn random_market_data<R: Rng>(rng: &mut R) -> AggregatedMarketData {
    AggregatedMarketData {
        kospi: random_snapshot(rng),
        kosdaq: random_snapshot(rng),
        nasdaq_change_pct: signed(rng, 4.0, 2),
        usdkrw: between(rng, 1200.0, 1500.0, 2),
    }
}

#[async_trait]
impl MarketDataSource for MockMarketSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch(&self) -> FlowResult<AggregatedMarketData> {
        Ok(random_market_data(&mut rand::thread_rng()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_values_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let data = random_market_data(&mut rng);
            for snapshot in [data.kospi, data.kosdaq] {
                assert!(snapshot.individual.abs() <= 500_000_000.0);
                assert!(snapshot.change_pct.abs() <= 3.0);
                let level = snapshot.index_value.unwrap();
                assert!((2000.0..=3500.0).contains(&level));
            }
            assert!(data.nasdaq_change_pct.abs() <= 4.0);
            assert!((1200.0..=1500.0).contains(&data.usdkrw));
        }
    }

    #[tokio::test]
    async fn test_mock_source_fetches() {
        let data = MockMarketSource::new().fetch().await.unwrap();
        assert!(data.usdkrw > 0.0);
    }
}
