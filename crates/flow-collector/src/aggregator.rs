//! 지표별 공급자를 병렬로 조회해 하나의 스냅샷으로 합칩니다.

use async_trait::async_trait;
use flow_core::{AggregatedMarketData, FlowResult, Market, MarketSnapshot};
use flow_exchange::{DomesticMarketSource, FxRateSource, OverseasChangeSource, ProviderSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// 한 수집 주기의 시장 데이터 공급원.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// 공급원 이름 (로그용).
    fn name(&self) -> &'static str;

    /// 정규화된 스냅샷 하나를 가져옵니다.
    async fn fetch(&self) -> FlowResult<AggregatedMarketData>;
}

/// 실제 공급자 집계기.
///
/// 여섯 개 호출(시장별 수급/지수, 나스닥, 환율)을 동시에 보내고 모두 성공해야
/// 결과를 만듭니다. 하나라도 실패하면 주기 전체가 실패합니다.
#[derive(Clone)]
pub struct MarketDataAggregator {
    domestic: Arc<dyn DomesticMarketSource>,
    overseas: Arc<dyn OverseasChangeSource>,
    fx: Arc<dyn FxRateSource>,
}

impl MarketDataAggregator {
    pub fn new(
        domestic: Arc<dyn DomesticMarketSource>,
        overseas: Arc<dyn OverseasChangeSource>,
        fx: Arc<dyn FxRateSource>,
    ) -> Self {
        Self {
            domestic,
            overseas,
            fx,
        }
    }

    /// 설정으로 선택된 공급자 묶음에서 생성합니다.
    pub fn from_providers(providers: &ProviderSet) -> Self {
        Self::new(
            providers.domestic.clone(),
            providers.overseas.clone(),
            providers.fx.clone(),
        )
    }

    async fn market(&self, market: Market) -> FlowResult<MarketSnapshot> {
        let (flow, index) = tokio::try_join!(
            self.domestic.investor_flow(market),
            self.domestic.index_quote(market)
        )?;
        Ok(MarketSnapshot::from_parts(flow, index))
    }
}

#[async_trait]
impl MarketDataSource for MarketDataAggregator {
    fn name(&self) -> &'static str {
        "real"
    }

    async fn fetch(&self) -> FlowResult<AggregatedMarketData> {
        let start = Instant::now();

        let result = tokio::try_join!(
            self.market(Market::Kospi),
            self.market(Market::Kosdaq),
            self.overseas.fetch_overseas_change(),
            self.fx.fetch_usdkrw()
        );

        let (kospi, kosdaq, nasdaq_change_pct, usdkrw) = match result {
            Ok(values) => values,
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "시장 데이터 집계 실패");
                return Err(e);
            }
        };

        debug!(
            overseas = self.overseas.name(),
            fx = self.fx.name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Market data aggregated"
        );

        Ok(AggregatedMarketData {
            kospi,
            kosdaq,
            nasdaq_change_pct,
            usdkrw,
        })
    }
}
