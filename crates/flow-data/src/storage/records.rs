//! `market_records` 테이블 저장소.
//!
//! 시각은 `HH:MM` 고정 폭 문자열로 저장하므로 문자열 비교가 시각 비교와 같습니다.

use crate::error::DataError;
use async_trait::async_trait;
use chrono::NaiveDate;
use flow_core::{CleanupFilter, FlowResult, HourMinute, MarketRecord, RecordStore};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use tracing::{debug, instrument};

const COLUMNS: &str = "date, time, \
    kospi_individual, kospi_individual_qty, kospi_foreign, kospi_foreign_qty, \
    kospi_institution, kospi_institution_qty, kospi_change_pct, kospi_index_value, \
    kospi_acc_volume, kospi_acc_amount, \
    kosdaq_individual, kosdaq_individual_qty, kosdaq_foreign, kosdaq_foreign_qty, \
    kosdaq_institution, kosdaq_institution_qty, kosdaq_change_pct, kosdaq_index_value, \
    kosdaq_acc_volume, kosdaq_acc_amount, \
    nasdaq_change_pct, usdkrw";

/// 테이블 행.
#[derive(Debug, Clone, FromRow)]
struct RecordRow {
    date: NaiveDate,
    time: String,
    kospi_individual: f64,
    kospi_individual_qty: Option<f64>,
    kospi_foreign: f64,
    kospi_foreign_qty: Option<f64>,
    kospi_institution: f64,
    kospi_institution_qty: Option<f64>,
    kospi_change_pct: f64,
    kospi_index_value: Option<f64>,
    kospi_acc_volume: Option<f64>,
    kospi_acc_amount: Option<f64>,
    kosdaq_individual: f64,
    kosdaq_individual_qty: Option<f64>,
    kosdaq_foreign: f64,
    kosdaq_foreign_qty: Option<f64>,
    kosdaq_institution: f64,
    kosdaq_institution_qty: Option<f64>,
    kosdaq_change_pct: f64,
    kosdaq_index_value: Option<f64>,
    kosdaq_acc_volume: Option<f64>,
    kosdaq_acc_amount: Option<f64>,
    nasdaq_change_pct: f64,
    usdkrw: f64,
}

impl TryFrom<RecordRow> for MarketRecord {
    type Error = DataError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let time: HourMinute = row
            .time
            .trim()
            .parse()
            .map_err(|_| DataError::InvalidData(format!("잘못된 시각: {}", row.time)))?;

        Ok(MarketRecord {
            date: row.date,
            time,
            kospi_individual: row.kospi_individual,
            kospi_individual_qty: row.kospi_individual_qty,
            kospi_foreign: row.kospi_foreign,
            kospi_foreign_qty: row.kospi_foreign_qty,
            kospi_institution: row.kospi_institution,
            kospi_institution_qty: row.kospi_institution_qty,
            kospi_change_pct: row.kospi_change_pct,
            kospi_index_value: row.kospi_index_value,
            kospi_acc_volume: row.kospi_acc_volume,
            kospi_acc_amount: row.kospi_acc_amount,
            kosdaq_individual: row.kosdaq_individual,
            kosdaq_individual_qty: row.kosdaq_individual_qty,
            kosdaq_foreign: row.kosdaq_foreign,
            kosdaq_foreign_qty: row.kosdaq_foreign_qty,
            kosdaq_institution: row.kosdaq_institution,
            kosdaq_institution_qty: row.kosdaq_institution_qty,
            kosdaq_change_pct: row.kosdaq_change_pct,
            kosdaq_index_value: row.kosdaq_index_value,
            kosdaq_acc_volume: row.kosdaq_acc_volume,
            kosdaq_acc_amount: row.kosdaq_acc_amount,
            nasdaq_change_pct: row.nasdaq_change_pct,
            usdkrw: row.usdkrw,
        })
    }
}

/// PostgreSQL 레코드 저장소.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    #[instrument(skip(self, record), fields(date = %record.date, time = %record.time))]
    async fn upsert(&self, record: &MarketRecord) -> FlowResult<()> {
        sqlx::query(
            r#"
            INSERT INTO market_records (
                date, time,
                kospi_individual, kospi_individual_qty, kospi_foreign, kospi_foreign_qty,
                kospi_institution, kospi_institution_qty, kospi_change_pct, kospi_index_value,
                kospi_acc_volume, kospi_acc_amount,
                kosdaq_individual, kosdaq_individual_qty, kosdaq_foreign, kosdaq_foreign_qty,
                kosdaq_institution, kosdaq_institution_qty, kosdaq_change_pct, kosdaq_index_value,
                kosdaq_acc_volume, kosdaq_acc_amount,
                nasdaq_change_pct, usdkrw, updated_at
            )
            VALUES (
                $1, $2,
                $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19, $20, $21, $22,
                $23, $24, NOW()
            )
            ON CONFLICT (date, time) DO UPDATE SET
                kospi_individual = EXCLUDED.kospi_individual,
                kospi_individual_qty = EXCLUDED.kospi_individual_qty,
                kospi_foreign = EXCLUDED.kospi_foreign,
                kospi_foreign_qty = EXCLUDED.kospi_foreign_qty,
                kospi_institution = EXCLUDED.kospi_institution,
                kospi_institution_qty = EXCLUDED.kospi_institution_qty,
                kospi_change_pct = EXCLUDED.kospi_change_pct,
                kospi_index_value = EXCLUDED.kospi_index_value,
                kospi_acc_volume = EXCLUDED.kospi_acc_volume,
                kospi_acc_amount = EXCLUDED.kospi_acc_amount,
                kosdaq_individual = EXCLUDED.kosdaq_individual,
                kosdaq_individual_qty = EXCLUDED.kosdaq_individual_qty,
                kosdaq_foreign = EXCLUDED.kosdaq_foreign,
                kosdaq_foreign_qty = EXCLUDED.kosdaq_foreign_qty,
                kosdaq_institution = EXCLUDED.kosdaq_institution,
                kosdaq_institution_qty = EXCLUDED.kosdaq_institution_qty,
                kosdaq_change_pct = EXCLUDED.kosdaq_change_pct,
                kosdaq_index_value = EXCLUDED.kosdaq_index_value,
                kosdaq_acc_volume = EXCLUDED.kosdaq_acc_volume,
                kosdaq_acc_amount = EXCLUDED.kosdaq_acc_amount,
                nasdaq_change_pct = EXCLUDED.nasdaq_change_pct,
                usdkrw = EXCLUDED.usdkrw,
                updated_at = NOW()
            "#,
        )
        .bind(record.date)
        .bind(record.time.to_string())
        .bind(record.kospi_individual)
        .bind(record.kospi_individual_qty)
        .bind(record.kospi_foreign)
        .bind(record.kospi_foreign_qty)
        .bind(record.kospi_institution)
        .bind(record.kospi_institution_qty)
        .bind(record.kospi_change_pct)
        .bind(record.kospi_index_value)
        .bind(record.kospi_acc_volume)
        .bind(record.kospi_acc_amount)
        .bind(record.kosdaq_individual)
        .bind(record.kosdaq_individual_qty)
        .bind(record.kosdaq_foreign)
        .bind(record.kosdaq_foreign_qty)
        .bind(record.kosdaq_institution)
        .bind(record.kosdaq_institution_qty)
        .bind(record.kosdaq_change_pct)
        .bind(record.kosdaq_index_value)
        .bind(record.kosdaq_acc_volume)
        .bind(record.kosdaq_acc_amount)
        .bind(record.nasdaq_change_pct)
        .bind(record.usdkrw)
        .execute(&self.pool)
        .await
        .map_err(DataError::from)?;

        debug!("Market record upserted");
        Ok(())
    }

    async fn list_by_date(&self, date: NaiveDate) -> FlowResult<Vec<MarketRecord>> {
        let query = format!(
            "SELECT {} FROM market_records WHERE date = $1 ORDER BY time ASC",
            COLUMNS
        );
        let rows: Vec<RecordRow> = sqlx::query_as(&query)
            .bind(date)
            .fetch_all(&self.pool)
            .await
            .map_err(DataError::from)?;

        let records = rows
            .into_iter()
            .map(MarketRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn delete_matching(&self, filter: &CleanupFilter) -> FlowResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM market_records
            WHERE ($1::date IS NULL OR date = $1)
              AND (time > $2 OR ($3 AND time < $4))
            "#,
        )
        .bind(filter.date)
        .bind(filter.window.close.to_string())
        .bind(filter.include_pre_open)
        .bind(filter.window.open.to_string())
        .execute(&self.pool)
        .await
        .map_err(DataError::from)?;

        Ok(result.rows_affected())
    }
}
