//! 시장 수급 레코드와 서비스 토큰의 PostgreSQL 저장소.
//!
//! - `Database`: 연결 풀 및 마이그레이션
//! - `PgRecordStore`: `(date, time)` 키 레코드 upsert/조회/정리
//! - `PgTokenStore`: 인스턴스 간 공유되는 접근 토큰 보관

pub mod error;
pub mod storage;

pub use error::{DataError, Result};
pub use storage::{Database, PgRecordStore, PgTokenStore};
