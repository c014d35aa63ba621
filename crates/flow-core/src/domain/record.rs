//! 저장 레코드.

use super::{AggregatedMarketData, HourMinute, MarketSnapshot, TimeSlot};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// `(date, time)` 키로 upsert되는 평탄화된 레코드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRecord {
    pub date: NaiveDate,
    pub time: HourMinute,

    pub kospi_individual: f64,
    pub kospi_individual_qty: Option<f64>,
    pub kospi_foreign: f64,
    pub kospi_foreign_qty: Option<f64>,
    pub kospi_institution: f64,
    pub kospi_institution_qty: Option<f64>,
    pub kospi_change_pct: f64,
    pub kospi_index_value: Option<f64>,
    pub kospi_acc_volume: Option<f64>,
    pub kospi_acc_amount: Option<f64>,

    pub kosdaq_individual: f64,
    pub kosdaq_individual_qty: Option<f64>,
    pub kosdaq_foreign: f64,
    pub kosdaq_foreign_qty: Option<f64>,
    pub kosdaq_institution: f64,
    pub kosdaq_institution_qty: Option<f64>,
    pub kosdaq_change_pct: f64,
    pub kosdaq_index_value: Option<f64>,
    pub kosdaq_acc_volume: Option<f64>,
    pub kosdaq_acc_amount: Option<f64>,

    pub nasdaq_change_pct: f64,
    pub usdkrw: f64,
}

impl MarketRecord {
    /// 슬롯과 집계 결과로 레코드를 만듭니다.
    pub fn new(slot: TimeSlot, data: &AggregatedMarketData) -> Self {
        let MarketSnapshot {
            individual: kospi_individual,
            foreign: kospi_foreign,
            institution: kospi_institution,
            individual_qty: kospi_individual_qty,
            foreign_qty: kospi_foreign_qty,
            institution_qty: kospi_institution_qty,
            change_pct: kospi_change_pct,
            index_value: kospi_index_value,
            acc_volume: kospi_acc_volume,
            acc_amount: kospi_acc_amount,
        } = data.kospi;
        let MarketSnapshot {
            individual: kosdaq_individual,
            foreign: kosdaq_foreign,
            institution: kosdaq_institution,
            individual_qty: kosdaq_individual_qty,
            foreign_qty: kosdaq_foreign_qty,
            institution_qty: kosdaq_institution_qty,
            change_pct: kosdaq_change_pct,
            index_value: kosdaq_index_value,
            acc_volume: kosdaq_acc_volume,
            acc_amount: kosdaq_acc_amount,
        } = data.kosdaq;

        Self {
            date: slot.date,
            time: slot.time,
            kospi_individual,
            kospi_individual_qty,
            kospi_foreign,
            kospi_foreign_qty,
            kospi_institution,
            kospi_institution_qty,
            kospi_change_pct,
            kospi_index_value,
            kospi_acc_volume,
            kospi_acc_amount,
            kosdaq_individual,
            kosdaq_individual_qty,
            kosdaq_foreign,
            kosdaq_foreign_qty,
            kosdaq_institution,
            kosdaq_institution_qty,
            kosdaq_change_pct,
            kosdaq_index_value,
            kosdaq_acc_volume,
            kosdaq_acc_amount,
            nasdaq_change_pct: data.nasdaq_change_pct,
            usdkrw: data.usdkrw,
        }
    }

    /// 레코드의 자연 키.
    pub fn slot(&self) -> TimeSlot {
        TimeSlot::new(self.date, self.time)
    }
}
