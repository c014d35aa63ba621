//! 지표별 데이터 공급자.
//!
//! 지표군마다 하나의 능력 trait이 있고, 설정에서 선택된 구현이 로드 시점에 한 번 결정됩니다.
//!
//! | 지표 | trait | 구현 |
//! |------|-------|------|
//! | 투자자 수급 / 지수 등락률 | `DomesticMarketSource` | KIS |
//! | 나스닥 등락률 | `OverseasChangeSource` | KIS, Yahoo, 네이버 |
//! | 원/달러 환율 | `FxRateSource` | 일간 환율 API, Yahoo |

mod exchange_rate;
mod kis_market;
mod naver;
mod yahoo;

pub use exchange_rate::ExchangeRateApiProvider;
pub use kis_market::{select_latest, KisMarketProvider};
pub use naver::NaverIndexProvider;
pub use yahoo::{normalize_change_pct, YahooQuoteProvider};

use crate::connector::kis::{KisClient, KisConfig, KisTokenManager};
use async_trait::async_trait;
use flow_core::{
    FlowResult, FxSource, IndexQuote, InvestorFlow, KisSettings, Market, OverseasSource,
    ProviderSettings, TokenStore,
};
use std::sync::Arc;
use tracing::info;

/// 국내 시장 수급/지수 공급자.
#[async_trait]
pub trait DomesticMarketSource: Send + Sync {
    /// 시장별 투자자 순매수.
    async fn investor_flow(&self, market: Market) -> FlowResult<InvestorFlow>;

    /// 시장 지수 등락률 및 누적 거래.
    async fn index_quote(&self, market: Market) -> FlowResult<IndexQuote>;
}

/// 해외 지수 등락률 공급자.
#[async_trait]
pub trait OverseasChangeSource: Send + Sync {
    /// 공급자 이름 (로그용).
    fn name(&self) -> &'static str;

    /// 나스닥 종합지수 전일 대비 등락률 (%).
    async fn fetch_overseas_change(&self) -> FlowResult<f64>;
}

/// 원/달러 환율 공급자.
#[async_trait]
pub trait FxRateSource: Send + Sync {
    /// 공급자 이름 (로그용).
    fn name(&self) -> &'static str;

    /// 1달러당 원화.
    async fn fetch_usdkrw(&self) -> FlowResult<f64>;
}

/// 설정으로 선택된 공급자 묶음.
#[derive(Clone)]
pub struct ProviderSet {
    pub domestic: Arc<dyn DomesticMarketSource>,
    pub overseas: Arc<dyn OverseasChangeSource>,
    pub fx: Arc<dyn FxRateSource>,
    /// 토큰 관리자 (통계/폐기용)
    pub tokens: KisTokenManager,
}

impl ProviderSet {
    /// 설정에서 공급자를 만듭니다. KIS 자격증명이 없으면 즉시 실패합니다.
    pub fn from_settings(
        kis: &KisSettings,
        providers: &ProviderSettings,
        token_store: Arc<dyn TokenStore>,
    ) -> FlowResult<Self> {
        let config = Arc::new(KisConfig::from_settings(kis)?);
        let tokens = KisTokenManager::new(config.clone(), token_store)?;
        let client = Arc::new(KisClient::new(config, tokens.clone())?);
        let kis_market = Arc::new(KisMarketProvider::new(client));

        // Yahoo는 두 지표가 공유 (crumb 세션 1개)
        let needs_yahoo = providers.nasdaq_source == OverseasSource::Yahoo
            || providers.fx_source == FxSource::Yahoo;
        let yahoo = if needs_yahoo {
            Some(Arc::new(YahooQuoteProvider::new(providers)?))
        } else {
            None
        };

        let overseas: Arc<dyn OverseasChangeSource> = match (providers.nasdaq_source, &yahoo) {
            (OverseasSource::Yahoo, Some(yahoo)) => yahoo.clone(),
            (OverseasSource::Naver, _) => Arc::new(NaverIndexProvider::new(providers)?),
            _ => kis_market.clone(),
        };

        let fx: Arc<dyn FxRateSource> = match (providers.fx_source, &yahoo) {
            (FxSource::Yahoo, Some(yahoo)) => yahoo.clone(),
            _ => Arc::new(ExchangeRateApiProvider::new(providers)?),
        };

        info!(
            overseas = overseas.name(),
            fx = fx.name(),
            "Market data providers selected"
        );

        Ok(Self {
            domestic: kis_market,
            overseas,
            fx,
            tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::{FlowError, InMemoryTokenStore};

    fn kis_settings() -> KisSettings {
        KisSettings {
            app_key: Some("key".to_string()),
            app_secret: Some("secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_selection_by_config() {
        let providers = ProviderSettings {
            nasdaq_source: OverseasSource::Naver,
            fx_source: FxSource::Yahoo,
            ..Default::default()
        };
        let set = ProviderSet::from_settings(
            &kis_settings(),
            &providers,
            Arc::new(InMemoryTokenStore::new()),
        )
        .unwrap();
        assert_eq!(set.overseas.name(), "naver");
        assert_eq!(set.fx.name(), "yahoo");

        let set = ProviderSet::from_settings(
            &kis_settings(),
            &ProviderSettings::default(),
            Arc::new(InMemoryTokenStore::new()),
        )
        .unwrap();
        assert_eq!(set.overseas.name(), "kis");
        assert_eq!(set.fx.name(), "er-api");
    }

    #[test]
    fn test_missing_credentials_fail_fast() {
        let result = ProviderSet::from_settings(
            &KisSettings::default(),
            &ProviderSettings::default(),
            Arc::new(InMemoryTokenStore::new()),
        );
        assert!(matches!(result, Err(FlowError::Configuration(_))));
    }
}
