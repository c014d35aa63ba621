//! # Flow Core
//!
//! 시장 수급 수집 시스템의 핵심 도메인 타입과 공용 인프라를 제공합니다.
//!
//! - 시장/시간 슬롯/스냅샷 도메인 모델
//! - 거래 시간대 판정 및 샘플링 그리드 (`clock`)
//! - 공급자 응답의 숫자 정규화 (`numeric`)
//! - 단일 비행(single-flight) 비동기 작업 공유 (`singleflight`)
//! - 저장소 추상화 및 인메모리 구현 (`store`)
//! - 설정 관리 및 로깅 인프라

pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod numeric;
pub mod singleflight;
pub mod store;

pub use clock::{snap_to_grid, MarketClock, TradingWindow, ZonedParts};
pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use singleflight::SingleFlight;
pub use store::*;
