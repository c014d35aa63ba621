//! 무료 일간 환율 API 공급자.

use super::FxRateSource;
use crate::http::{build_client, read_json, transport_error};
use async_trait::async_trait;
use flow_core::numeric::parse_number_opt;
use flow_core::{FlowError, FlowResult, ProviderSettings};
use reqwest::Client;
use serde_json::Value;

const PROVIDER: &str = "er-api";

/// USD 기준 환율표에서 `rates.KRW`를 읽습니다.
pub struct ExchangeRateApiProvider {
    client: Client,
    url: String,
}

impl ExchangeRateApiProvider {
    pub fn new(settings: &ProviderSettings) -> FlowResult<Self> {
        Ok(Self {
            client: build_client(settings.timeout(), None)?,
            url: settings.exchange_rate_url.clone(),
        })
    }
}

fn krw_rate(body: &Value) -> FlowResult<f64> {
    body.pointer("/rates/KRW")
        .and_then(parse_number_opt)
        .filter(|v| *v > 0.0)
        .ok_or_else(|| FlowError::DataShape("환율 응답에 rates.KRW가 없습니다".to_string()))
}

#[async_trait]
impl FxRateSource for ExchangeRateApiProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_usdkrw(&self) -> FlowResult<f64> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(transport_error)?;
        let body = read_json(PROVIDER, response).await?;
        krw_rate(&body)
    }
}
