//! 한국투자증권 (KIS) Open API 연동 모듈.
//!
//! # 기능
//!
//! - OAuth 접근 토큰 발급, 메모리/영속 캐시, 단일 비행 발급 (`KisTokenManager`)
//! - 인증 GET 요청, 전송 재시도, 전역 요청 간격, 토큰 만료 시 1회 재시도 (`KisClient`)
//! - `rt_cd`/`output`/`output1` envelope 해석 (`envelope`)
//!
//! # API 문서
//!
//! 공식 API 문서: <https://apiportal.koreainvestment.com/>
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use flow_exchange::connector::kis::{path, tr_id, KisClient, KisConfig, KisTokenManager};
//!
//! let config = Arc::new(KisConfig::from_settings(&app_config.kis)?);
//! let tokens = KisTokenManager::new(config.clone(), token_store)?;
//! let client = KisClient::new(config, tokens)?;
//!
//! let payload = client
//!     .get(path::INVESTOR_TIME_BY_MARKET, tr_id::INVESTOR_TIME_BY_MARKET, &[("fid_input_iscd", "KSP")])
//!     .await?;
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod envelope;

pub use auth::KisTokenManager;
pub use client::{KisClient, RequestSpacer};
pub use config::KisConfig;
pub use envelope::{is_token_expired_body, is_token_expired_signal, KisEnvelope, KisPayload, KisReply};

/// KIS 거래 ID (tr_id) 상수 모음.
pub mod tr_id {
    // ========================================
    // 국내 시세
    // ========================================

    /// 시장별 투자자매매동향 (시간대별)
    pub const INVESTOR_TIME_BY_MARKET: &str = "FHPTJ04030000";

    /// 업종 지수 시간대별 시세
    pub const INDEX_TIME_PRICE: &str = "FHPUP02110200";

    // ========================================
    // 해외 시세
    // ========================================

    /// 해외 지수 일/주/월 차트
    pub const OVERSEAS_DAILY_CHART: &str = "FHKST03030100";
}

/// KIS REST 경로 상수 모음.
pub mod path {
    /// 토큰 발급
    pub const TOKEN: &str = "/oauth2/tokenP";

    /// 시장별 투자자매매동향 (시간대별)
    pub const INVESTOR_TIME_BY_MARKET: &str =
        "/uapi/domestic-stock/v1/quotations/inquire-investor-time-by-market";

    /// 업종 지수 시간대별 시세
    pub const INDEX_TIME_PRICE: &str = "/uapi/domestic-stock/v1/quotations/inquire-index-timeprice";

    /// 해외 지수 일/주/월 차트
    pub const OVERSEAS_DAILY_CHART: &str =
        "/uapi/overseas-price/v1/quotations/inquire-daily-chartprice";
}

/// 토큰 만료를 뜻하는 KIS 메시지 코드.
pub const TOKEN_EXPIRED_CODES: &[&str] = &["EGW00123"];
