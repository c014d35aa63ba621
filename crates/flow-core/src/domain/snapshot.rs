//! 정규화된 시장 스냅샷.

use serde::{Deserialize, Serialize};

/// 투자자별 순매수 (거래대금 및 수량).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestorFlow {
    /// 개인 순매수 거래대금
    pub individual: f64,
    /// 외국인 순매수 거래대금
    pub foreign: f64,
    /// 기관 순매수 거래대금
    pub institution: f64,
    pub individual_qty: Option<f64>,
    pub foreign_qty: Option<f64>,
    pub institution_qty: Option<f64>,
}

/// 지수 시세 (등락률 및 누적 거래).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexQuote {
    /// 전일 대비 등락률 (%)
    pub change_pct: f64,
    /// 현재 지수
    pub index_value: Option<f64>,
    /// 누적 거래량
    pub acc_volume: Option<f64>,
    /// 누적 거래대금
    pub acc_amount: Option<f64>,
}

/// 한 시장, 한 시간 슬롯의 스냅샷.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub individual: f64,
    pub foreign: f64,
    pub institution: f64,
    pub individual_qty: Option<f64>,
    pub foreign_qty: Option<f64>,
    pub institution_qty: Option<f64>,
    pub change_pct: f64,
    pub index_value: Option<f64>,
    pub acc_volume: Option<f64>,
    pub acc_amount: Option<f64>,
}

impl MarketSnapshot {
    /// 수급과 지수 시세를 합쳐 스냅샷을 만듭니다.
    pub fn from_parts(flow: InvestorFlow, index: IndexQuote) -> Self {
        Self {
            individual: flow.individual,
            foreign: flow.foreign,
            institution: flow.institution,
            individual_qty: flow.individual_qty,
            foreign_qty: flow.foreign_qty,
            institution_qty: flow.institution_qty,
            change_pct: index.change_pct,
            index_value: index.index_value,
            acc_volume: index.acc_volume,
            acc_amount: index.acc_amount,
        }
    }
}

/// 한 수집 주기의 전체 결과.
///
/// 네 가지 지표가 모두 성공했을 때만 만들어집니다.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedMarketData {
    pub kospi: MarketSnapshot,
    pub kosdaq: MarketSnapshot,
    /// 나스닥 종합지수 등락률 (%)
    pub nasdaq_change_pct: f64,
    /// 원/달러 환율
    pub usdkrw: f64,
}
