//! KIS 기반 국내 수급/지수 및 해외 지수 공급자.

use super::{DomesticMarketSource, OverseasChangeSource};
use crate::connector::kis::{path, tr_id, KisClient};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use chrono_tz::Asia::Seoul;
use flow_core::numeric::{number_field, number_field_opt};
use flow_core::{FlowError, FlowResult, IndexQuote, InvestorFlow, Market};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// 해외 지수 일봉 조회 기간 (일).
const OVERSEAS_LOOKBACK_DAYS: i64 = 7;

/// 나스닥 종합지수 코드.
const NASDAQ_COMPOSITE: &str = "COMP";

/// KIS 시세 공급자.
pub struct KisMarketProvider {
    client: Arc<KisClient>,
}

impl KisMarketProvider {
    pub fn new(client: Arc<KisClient>) -> Self {
        Self { client }
    }
}

/// 응답 출력에서 최신 레코드를 고릅니다.
///
/// 배열이면 마지막 원소(가장 최근 장중 값), 객체면 그대로 사용합니다.
/// 고를 수 있는 원소가 없으면 `FlowError::DataShape`.
pub fn select_latest<'a>(output: &'a Value, what: &str) -> FlowResult<&'a Value> {
    let selected = match output {
        Value::Array(items) => items.last(),
        Value::Object(fields) if !fields.is_empty() => Some(output),
        _ => None,
    };
    selected
        .filter(|v| v.is_object())
        .ok_or_else(|| {
            FlowError::DataShape(format!("{}: 응답에 선택 가능한 레코드가 없습니다", what))
        })
}

/// 투자자 순매수 레코드 파싱.
fn parse_investor_flow(row: &Value) -> InvestorFlow {
    InvestorFlow {
        individual: number_field(row, "prsn_ntby_tr_pbmn"),
        foreign: number_field(row, "frgn_ntby_tr_pbmn"),
        institution: number_field(row, "orgn_ntby_tr_pbmn"),
        individual_qty: number_field_opt(row, "prsn_ntby_qty"),
        foreign_qty: number_field_opt(row, "frgn_ntby_qty"),
        institution_qty: number_field_opt(row, "orgn_ntby_qty"),
    }
}

/// 지수 시세 레코드 파싱.
fn parse_index_quote(row: &Value) -> IndexQuote {
    IndexQuote {
        change_pct: number_field(row, "bstp_nmix_prdy_ctrt"),
        index_value: number_field_opt(row, "bstp_nmix_prpr"),
        acc_volume: number_field_opt(row, "acml_vol"),
        acc_amount: number_field_opt(row, "acml_tr_pbmn"),
    }
}

/// 해외 지수 현재가/전일 종가로 등락률 계산.
///
/// 전일 종가가 0이면 공급자의 등락률 필드를 사용합니다.
fn overseas_change_pct(row: &Value) -> FlowResult<f64> {
    let current = number_field(row, "ovrs_nmix_prpr");
    let prev_close = number_field(row, "ovrs_nmix_prdy_clpr");

    if prev_close != 0.0 {
        return Ok((current - prev_close) / prev_close * 100.0);
    }

    number_field_opt(row, "prdy_ctrt").ok_or_else(|| {
        FlowError::DataShape("해외 지수 응답에 전일 종가와 등락률이 모두 없습니다".to_string())
    })
}

#[async_trait]
impl DomesticMarketSource for KisMarketProvider {
    async fn investor_flow(&self, market: Market) -> FlowResult<InvestorFlow> {
        let payload = self
            .client
            .get(
                path::INVESTOR_TIME_BY_MARKET,
                tr_id::INVESTOR_TIME_BY_MARKET,
                &[
                    ("fid_input_iscd", market.investor_code()),
                    ("fid_input_iscd_2", market.index_code()),
                ],
            )
            .await?;

        let row = select_latest(&payload.output, "투자자 수급")?;
        let flow = parse_investor_flow(row);
        debug!(
            market = %market,
            individual = flow.individual,
            foreign = flow.foreign,
            institution = flow.institution,
            "Investor flow fetched"
        );
        Ok(flow)
    }

    async fn index_quote(&self, market: Market) -> FlowResult<IndexQuote> {
        let payload = self
            .client
            .get(
                path::INDEX_TIME_PRICE,
                tr_id::INDEX_TIME_PRICE,
                &[
                    ("FID_COND_MRKT_DIV_CODE", "U"),
                    ("FID_INPUT_ISCD", market.index_code()),
                    ("FID_INPUT_HOUR_1", "60"),
                ],
            )
            .await?;

        let row = select_latest(&payload.output, "지수 시세")?;
        let quote = parse_index_quote(row);
        debug!(market = %market, change_pct = quote.change_pct, "Index quote fetched");
        Ok(quote)
    }
}

#[async_trait]
impl OverseasChangeSource for KisMarketProvider {
    fn name(&self) -> &'static str {
        "kis"
    }

    async fn fetch_overseas_change(&self) -> FlowResult<f64> {
        let today = Utc::now().with_timezone(&Seoul).date_naive();
        let from = (today - Duration::days(OVERSEAS_LOOKBACK_DAYS))
            .format("%Y%m%d")
            .to_string();
        let to = today.format("%Y%m%d").to_string();

        let payload = self
            .client
            .get(
                path::OVERSEAS_DAILY_CHART,
                tr_id::OVERSEAS_DAILY_CHART,
                &[
                    ("FID_COND_MRKT_DIV_CODE", "N"),
                    ("FID_INPUT_ISCD", NASDAQ_COMPOSITE),
                    ("FID_INPUT_DATE_1", from.as_str()),
                    ("FID_INPUT_DATE_2", to.as_str()),
                    ("FID_PERIOD_DIV_CODE", "D"),
                ],
            )
            .await?;

        let row = select_latest(&payload.output, "해외 지수")?;
        overseas_change_pct(row)
    }
}
