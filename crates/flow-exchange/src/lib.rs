//! 브로커리지 및 시장 데이터 공급자 연동.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 한국투자증권(KIS) 커넥터: 토큰 수명 주기, 인증 요청, envelope 해석
//! - 지표별 공급자: KIS 시장 데이터, Yahoo 시세(crumb 세션), 네이버 해외지수, 일간 환율 API
//! - 설정 기반 공급자 선택 (`ProviderSet`)

pub mod connector;
pub mod http;
pub mod provider;

pub use connector::kis::{KisClient, KisConfig, KisTokenManager};
pub use provider::*;
