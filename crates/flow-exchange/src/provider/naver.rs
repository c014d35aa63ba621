//! 네이버 해외지수 폴링 공급자.

use super::OverseasChangeSource;
use crate::http::{build_client, read_json, transport_error};
use async_trait::async_trait;
use flow_core::numeric::number_field_opt;
use flow_core::{FlowError, FlowResult, ProviderSettings};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

const PROVIDER: &str = "naver";

/// 네이버 해외지수 실시간 폴링 API로 나스닥 등락률을 구합니다.
pub struct NaverIndexProvider {
    client: Client,
    url: String,
}

impl NaverIndexProvider {
    pub fn new(settings: &ProviderSettings) -> FlowResult<Self> {
        Ok(Self {
            client: build_client(settings.timeout(), Some(&settings.user_agent))?,
            url: settings.naver_index_url.clone(),
        })
    }
}

/// 응답 레코드: `datas[0]`이 있으면 그것, 없으면 최상위 객체.
fn index_record(body: &Value) -> &Value {
    body.pointer("/datas/0").unwrap_or(body)
}

/// 원시 필드를 우선 읽고 없으면 표시용 필드를 읽습니다.
fn raw_or_display(record: &Value, raw: &str, display: &str) -> Option<f64> {
    number_field_opt(record, raw).or_else(|| number_field_opt(record, display))
}

fn change_pct_from_record(record: &Value) -> FlowResult<f64> {
    let open = raw_or_display(record, "openPriceRaw", "openPrice");
    let price = raw_or_display(record, "closePriceRaw", "closePrice");

    if let (Some(open), Some(price)) = (open, price) {
        if open != 0.0 {
            return Ok((price - open) / open * 100.0);
        }
    }

    raw_or_display(record, "fluctuationsRatioRaw", "fluctuationsRatio").ok_or_else(|| {
        FlowError::DataShape("네이버 지수 응답에 등락률을 계산할 값이 없습니다".to_string())
    })
}

#[async_trait]
impl OverseasChangeSource for NaverIndexProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_overseas_change(&self) -> FlowResult<f64> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(transport_error)?;
        let body = read_json(PROVIDER, response).await?;

        let change = change_pct_from_record(index_record(&body))?;
        debug!(change_pct = change, "Naver index change fetched");
        Ok(change)
    }
}
