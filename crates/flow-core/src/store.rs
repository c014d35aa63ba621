//! 저장소 협력자 추상화.
//!
//! - `TokenStore`: 프로세스 재시작과 인스턴스 간에 공유되는 토큰 보관소 (이름 → 토큰)
//! - `RecordStore`: `(date, time)` 키 기준 레코드 upsert/조회/정리
//!
//! 운영 구현은 `flow-data`의 PostgreSQL 저장소이며, 여기의 인메모리 구현은
//! 모의 모드와 테스트에서 사용합니다.

use crate::domain::{Credential, MarketRecord, TimeSlot};
use crate::error::FlowResult;
use crate::TradingWindow;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// 영속 토큰 보관소. 쓰기는 마지막 기록이 이깁니다.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// 저장된 토큰 조회.
    async fn load(&self, name: &str) -> FlowResult<Option<Credential>>;

    /// 토큰 저장 (덮어쓰기).
    async fn save(&self, name: &str, credential: &Credential) -> FlowResult<()>;

    /// 토큰 삭제. 없으면 아무 일도 하지 않습니다.
    async fn delete(&self, name: &str) -> FlowResult<()>;
}

/// 레코드 정리 조건.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupFilter {
    /// 특정 날짜만 정리 (없으면 전체)
    pub date: Option<NaiveDate>,
    /// 거래 시간
    pub window: TradingWindow,
    /// 장 시작 전 레코드도 삭제
    pub include_pre_open: bool,
}

impl CleanupFilter {
    /// 레코드가 삭제 대상인지 확인합니다.
    pub fn matches(&self, slot: &TimeSlot) -> bool {
        if let Some(date) = self.date {
            if slot.date != date {
                return false;
            }
        }
        let after_close = slot.time > self.window.close;
        let before_open = self.include_pre_open && slot.time < self.window.open;
        after_close || before_open
    }
}

/// 레코드 저장소.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// `(date, time)` 기준 삽입 또는 갱신.
    async fn upsert(&self, record: &MarketRecord) -> FlowResult<()>;

    /// 날짜의 레코드를 시각 오름차순으로 조회.
    async fn list_by_date(&self, date: NaiveDate) -> FlowResult<Vec<MarketRecord>>;

    /// 조건에 맞는 레코드를 삭제하고 삭제 건수를 반환.
    async fn delete_matching(&self, filter: &CleanupFilter) -> FlowResult<u64>;
}

// ========================================
// 인메모리 구현
// ========================================

/// 프로세스 메모리 토큰 보관소.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<String, Credential>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self, name: &str) -> FlowResult<Option<Credential>> {
        let guard = self.tokens.read().unwrap_or_else(|p| p.into_inner());
        Ok(guard.get(name).cloned())
    }

    async fn save(&self, name: &str, credential: &Credential) -> FlowResult<()> {
        let mut guard = self.tokens.write().unwrap_or_else(|p| p.into_inner());
        guard.insert(name.to_string(), credential.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> FlowResult<()> {
        let mut guard = self.tokens.write().unwrap_or_else(|p| p.into_inner());
        guard.remove(name);
        Ok(())
    }
}

/// 프로세스 메모리 레코드 저장소.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<BTreeMap<TimeSlot, MarketRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 전체 레코드 수.
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn upsert(&self, record: &MarketRecord) -> FlowResult<()> {
        let mut guard = self.records.write().unwrap_or_else(|p| p.into_inner());
        guard.insert(record.slot(), record.clone());
        Ok(())
    }

    async fn list_by_date(&self, date: NaiveDate) -> FlowResult<Vec<MarketRecord>> {
        let guard = self.records.read().unwrap_or_else(|p| p.into_inner());
        // BTreeMap 키 순서 = (date, time) 오름차순
        Ok(guard
            .values()
            .filter(|r| r.date == date)
            .cloned()
            .collect())
    }

    async fn delete_matching(&self, filter: &CleanupFilter) -> FlowResult<u64> {
        let mut guard = self.records.write().unwrap_or_else(|p| p.into_inner());
        let before = guard.len();
        guard.retain(|slot, _| !filter.matches(slot));
        Ok((before - guard.len()) as u64)
    }
}
