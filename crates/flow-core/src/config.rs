//! 설정 관리.
//!
//! 로드 순서 (뒤가 우선):
//! 1. 구조체 기본값
//! 2. `config/default.toml` (선택)
//! 3. `FLOW__<섹션>__<키>` 환경변수
//! 4. 배포 환경에서 쓰던 단축 환경변수 (`KIS_APP_KEY`, `FETCH_MODE`, `FX_SOURCE` 등)
//!
//! `.env` 파일은 `dotenvy`로 먼저 읽습니다.

use crate::clock::{MarketClock, TradingWindow};
use crate::domain::HourMinute;
use crate::error::{FlowError, FlowResult};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 데이터 수집 모드
    pub fetch_mode: FetchMode,
    /// 한국투자증권 API 설정
    pub kis: KisSettings,
    /// 보조 공급자 설정
    pub providers: ProviderSettings,
    /// 거래 시간/스케줄 설정
    pub schedule: ScheduleSettings,
    /// 데이터베이스 설정
    pub database: DatabaseSettings,
    /// 로깅 설정
    pub logging: LoggingSettings,
}

/// 데이터 수집 모드.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// 무작위 모의 데이터
    #[default]
    Mock,
    /// 실제 공급자 호출
    Real,
}

/// 원/달러 환율 공급자.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FxSource {
    /// 무료 일간 환율 API (`rates.KRW`)
    #[default]
    #[serde(alias = "exchange_rate_api", alias = "er-api")]
    ErApi,
    /// Yahoo Finance 시세 (`KRW=X`)
    Yahoo,
}

/// 나스닥 등락률 공급자.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverseasSource {
    /// 한국투자증권 해외지수 일봉
    #[default]
    Kis,
    /// Yahoo Finance 시세
    Yahoo,
    /// 네이버 해외지수 폴링
    Naver,
}

/// 한국투자증권 API 설정.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct KisSettings {
    /// REST 기본 URL
    pub base_url: String,
    /// 앱 키 (KIS_APP_KEY)
    pub app_key: Option<String>,
    /// 앱 시크릿 (KIS_APP_SECRET)
    pub app_secret: Option<String>,
    /// HTTP 타임아웃 (초)
    pub timeout_secs: u64,
    /// 요청/응답 형태 진단 로그 (KIS_DEBUG)
    pub debug: bool,
    /// 모든 시도 전 최소 간격 (밀리초)
    pub request_spacing_ms: u64,
    /// 전송 실패 재시도 대기 (밀리초, 순서대로)
    pub retry_delays_ms: Vec<u64>,
    /// 토큰 만료 안전 여유 (초)
    pub token_safety_margin_secs: i64,
    /// 고객 타입 (P = 개인)
    pub custtype: String,
    /// 영속 보관소의 토큰 이름
    pub token_name: String,
}

impl Default for KisSettings {
    fn default() -> Self {
        Self {
            base_url: "https://openapi.koreainvestment.com:9443".to_string(),
            app_key: None,
            app_secret: None,
            timeout_secs: 30,
            debug: false,
            request_spacing_ms: 350,
            retry_delays_ms: vec![500, 1000, 2000],
            token_safety_margin_secs: 60,
            custtype: "P".to_string(),
            token_name: "kis".to_string(),
        }
    }
}

impl fmt::Debug for KisSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("KisSettings")
            .field("base_url", &self.base_url)
            .field("app_key", &mask(&self.app_key))
            .field("app_secret", &mask(&self.app_secret))
            .field("timeout_secs", &self.timeout_secs)
            .field("debug", &self.debug)
            .field("request_spacing_ms", &self.request_spacing_ms)
            .field("retry_delays_ms", &self.retry_delays_ms)
            .field("token_safety_margin_secs", &self.token_safety_margin_secs)
            .field("custtype", &self.custtype)
            .field("token_name", &self.token_name)
            .finish()
    }
}

/// 보조 공급자 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// 환율 공급자 (FX_SOURCE)
    pub fx_source: FxSource,
    /// 나스닥 등락률 공급자 (NASDAQ_SOURCE)
    pub nasdaq_source: OverseasSource,
    /// HTTP 타임아웃 (초)
    pub timeout_secs: u64,
    /// 스크래핑 요청용 User-Agent
    pub user_agent: String,
    /// Yahoo 시세 API
    pub yahoo_quote_url: String,
    /// Yahoo crumb API
    pub yahoo_crumb_url: String,
    /// Yahoo 쿠키를 받을 HTML 페이지
    pub yahoo_session_url: String,
    /// Yahoo crumb/쿠키 캐시 수명 (초)
    pub yahoo_session_ttl_secs: u64,
    /// 나스닥 종합지수 심볼
    pub nasdaq_symbol: String,
    /// 원/달러 심볼
    pub usdkrw_symbol: String,
    /// 일간 환율 API
    pub exchange_rate_url: String,
    /// 네이버 해외지수 폴링 API
    pub naver_index_url: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            fx_source: FxSource::default(),
            nasdaq_source: OverseasSource::default(),
            timeout_secs: 10,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            yahoo_quote_url: "https://query1.finance.yahoo.com/v7/finance/quote".to_string(),
            yahoo_crumb_url: "https://query1.finance.yahoo.com/v1/test/getcrumb".to_string(),
            yahoo_session_url: "https://finance.yahoo.com/quote/%5EIXIC".to_string(),
            yahoo_session_ttl_secs: 1800,
            nasdaq_symbol: "^IXIC".to_string(),
            usdkrw_symbol: "KRW=X".to_string(),
            exchange_rate_url: "https://open.er-api.com/v6/latest/USD".to_string(),
            naver_index_url:
                "https://polling.finance.naver.com/api/realtime/worldstock/index/.IXIC"
                    .to_string(),
        }
    }
}

impl ProviderSettings {
    /// HTTP 타임아웃을 Duration으로 반환
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Yahoo 세션 캐시 수명을 Duration으로 반환
    pub fn yahoo_session_ttl(&self) -> Duration {
        Duration::from_secs(self.yahoo_session_ttl_secs)
    }
}

/// 거래 시간 및 스케줄 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    /// 기준 시간대 (APP_TZ / TZ)
    pub timezone: String,
    /// 장 시작
    pub market_open: HourMinute,
    /// 장 마감
    pub market_close: HourMinute,
    /// 크론 샘플링 그리드 (분)
    pub grid_minutes: u32,
    /// 백필 최대 슬롯 수
    pub max_backfill_slots: usize,
    /// 백필 기본 시작 시각
    pub backfill_start: HourMinute,
    /// 백필 기본 종료 시각
    pub backfill_end: HourMinute,
    /// 백필 기본 간격 (분)
    pub backfill_interval_minutes: u32,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            timezone: "Asia/Seoul".to_string(),
            market_open: HourMinute::clamped(9, 0),
            market_close: HourMinute::clamped(15, 30),
            grid_minutes: 10,
            max_backfill_slots: 200,
            backfill_start: HourMinute::clamped(9, 0),
            backfill_end: HourMinute::clamped(15, 30),
            backfill_interval_minutes: 15,
        }
    }
}

impl ScheduleSettings {
    /// 설정된 시간대.
    pub fn tz(&self) -> FlowResult<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| FlowError::Configuration(format!("알 수 없는 시간대: {}", self.timezone)))
    }

    /// 거래 시간.
    pub fn window(&self) -> TradingWindow {
        TradingWindow::new(self.market_open, self.market_close)
    }

    /// 시간대와 거래 시간으로 시계를 만듭니다.
    pub fn clock(&self) -> FlowResult<MarketClock> {
        Ok(MarketClock::new(self.tz()?, self.window()))
    }
}

/// 데이터베이스 설정.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// 연결 URL (DATABASE_URL)
    pub url: Option<String>,
    /// 최대 연결 수
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("url", &self.url.as_ref().map(|_| "[REDACTED]"))
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl From<config::ConfigError> for FlowError {
    fn from(err: config::ConfigError) -> Self {
        FlowError::Configuration(err.to_string())
    }
}

impl AppConfig {
    /// `.env`를 읽은 뒤 주어진 파일에서 설정을 로드합니다.
    pub fn load_with_dotenv<P: AsRef<Path>>(path: P) -> FlowResult<Self> {
        dotenvy::dotenv().ok();
        Self::load(path)
    }

    /// 주어진 파일(없어도 됨)과 환경변수에서 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> FlowResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("FLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("fetch_mode", env_lower("FETCH_MODE"))?
            .set_override_option("kis.base_url", env_var("KIS_BASE_URL"))?
            .set_override_option("kis.app_key", env_var("KIS_APP_KEY"))?
            .set_override_option("kis.app_secret", env_var("KIS_APP_SECRET"))?
            .set_override_option("kis.debug", env_var("KIS_DEBUG").map(|v| is_truthy(&v)))?
            .set_override_option("providers.fx_source", env_lower("FX_SOURCE"))?
            .set_override_option("providers.nasdaq_source", env_lower("NASDAQ_SOURCE"))?
            .set_override_option(
                "schedule.timezone",
                env_var("APP_TZ").or_else(|| env_var("TZ")),
            )?
            .set_override_option("database.url", env_var("DATABASE_URL"))?
            .set_override_option("logging.format", env_lower("LOG_FORMAT"))?;

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 값 사이의 관계를 검증합니다.
    pub fn validate(&self) -> FlowResult<()> {
        self.schedule.tz()?;

        if self.schedule.market_open > self.schedule.market_close {
            return Err(FlowError::Configuration(format!(
                "장 시작({})이 장 마감({})보다 늦습니다",
                self.schedule.market_open, self.schedule.market_close
            )));
        }
        if self.schedule.grid_minutes == 0 || self.schedule.grid_minutes > 60 {
            return Err(FlowError::Configuration(format!(
                "grid_minutes는 1~60 범위여야 합니다: {}",
                self.schedule.grid_minutes
            )));
        }
        if self.schedule.max_backfill_slots == 0 {
            return Err(FlowError::Configuration(
                "max_backfill_slots는 0보다 커야 합니다".to_string(),
            ));
        }
        if self.kis.token_safety_margin_secs < 0 {
            return Err(FlowError::Configuration(
                "token_safety_margin_secs는 음수일 수 없습니다".to_string(),
            ));
        }
        Ok(())
    }
}

/// 비어 있지 않은 환경변수 값.
fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 소문자로 정규화한 환경변수 값.
fn env_lower(key: &str) -> Option<String> {
    env_var(key).map(|v| v.to_lowercase())
}

/// `"1"` 또는 `"true"`를 참으로 해석합니다.
fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.fetch_mode, FetchMode::Mock);
        assert_eq!(config.kis.request_spacing_ms, 350);
        assert_eq!(config.kis.retry_delays_ms, vec![500, 1000, 2000]);
        assert_eq!(config.kis.token_safety_margin_secs, 60);
        assert_eq!(config.schedule.grid_minutes, 10);
        assert_eq!(config.schedule.max_backfill_slots, 200);
        assert_eq!(config.schedule.market_close.to_string(), "15:30");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_source_names() {
        let fx: FxSource = serde_json::from_str("\"erapi\"").unwrap();
        assert_eq!(fx, FxSource::ErApi);
        let fx: FxSource = serde_json::from_str("\"er-api\"").unwrap();
        assert_eq!(fx, FxSource::ErApi);
        let src: OverseasSource = serde_json::from_str("\"naver\"").unwrap();
        assert_eq!(src, OverseasSource::Naver);
        assert!(serde_json::from_str::<OverseasSource>("\"bloomberg\"").is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        let mut config = AppConfig::default();
        config.schedule.market_open = HourMinute::clamped(16, 0);
        assert!(matches!(
            config.validate(),
            Err(FlowError::Configuration(_))
        ));

        let mut config = AppConfig::default();
        config.schedule.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secrets_not_in_debug() {
        let mut config = AppConfig::default();
        config.kis.app_key = Some("my-app-key-value".to_string());
        config.kis.app_secret = Some("my-app-secret-value".to_string());
        let debug = format!("{:?}", config);
        assert!(!debug.contains("my-app-key-value"));
        assert!(!debug.contains("my-app-secret-value"));
    }

    #[test]
    fn test_truthy() {
        assert!(is_truthy("1"));
        assert!(is_truthy("TRUE"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("yes"));
    }
}
