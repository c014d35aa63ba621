//! 한국투자증권 (KIS) API 설정.
//!
//! 앱 키/시크릿은 `SecretString`으로 보관하여 `Debug` 출력이나 로그에 노출되지 않습니다.

use flow_core::{FlowError, FlowResult, KisSettings};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// 실전투자 REST 기본 URL.
pub const REAL_BASE_URL: &str = "https://openapi.koreainvestment.com:9443";
/// 모의투자 REST 기본 URL.
pub const PAPER_BASE_URL: &str = "https://openapivts.koreainvestment.com:29443";

/// KIS 연결 설정.
#[derive(Debug)]
pub struct KisConfig {
    /// REST 기본 URL (끝의 `/` 제거됨)
    pub base_url: String,
    app_key: SecretString,
    app_secret: SecretString,
    /// HTTP 타임아웃
    pub timeout: Duration,
    /// 진단 로그 활성화
    pub debug: bool,
    /// 모든 시도 전 최소 간격 (프로세스 전역)
    pub request_spacing: Duration,
    /// 전송 실패 재시도 대기 (시도 횟수 = 길이)
    pub retry_delays: Vec<Duration>,
    /// 토큰 만료 안전 여유
    pub safety_margin: chrono::Duration,
    /// 고객 타입 헤더
    pub custtype: String,
    /// 영속 보관소의 토큰 이름
    pub token_name: String,
}

impl KisConfig {
    /// 기본값으로 새 설정을 생성합니다.
    pub fn new(
        base_url: impl Into<String>,
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Self {
        let defaults = KisSettings::default();
        let app_key: String = app_key.into();
        let app_secret: String = app_secret.into();
        Self {
            base_url: normalize_base_url(base_url.into()),
            app_key: SecretString::new(app_key.into_boxed_str()),
            app_secret: SecretString::new(app_secret.into_boxed_str()),
            timeout: Duration::from_secs(defaults.timeout_secs),
            debug: defaults.debug,
            request_spacing: Duration::from_millis(defaults.request_spacing_ms),
            retry_delays: defaults
                .retry_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            safety_margin: chrono::Duration::seconds(defaults.token_safety_margin_secs),
            custtype: defaults.custtype,
            token_name: defaults.token_name,
        }
    }

    /// 애플리케이션 설정에서 생성합니다.
    ///
    /// # Errors
    /// 앱 키나 시크릿이 없으면 `FlowError::Configuration`을 반환합니다.
    pub fn from_settings(settings: &KisSettings) -> FlowResult<Self> {
        let app_key = required(settings.app_key.as_deref(), "KIS_APP_KEY")?;
        let app_secret = required(settings.app_secret.as_deref(), "KIS_APP_SECRET")?;
        if settings.base_url.trim().is_empty() {
            return Err(FlowError::Configuration(
                "KIS_BASE_URL 환경변수가 설정되지 않았습니다".to_string(),
            ));
        }

        Ok(Self::new(settings.base_url.clone(), app_key, app_secret)
            .with_timeout(Duration::from_secs(settings.timeout_secs))
            .with_debug(settings.debug)
            .with_request_spacing(Duration::from_millis(settings.request_spacing_ms))
            .with_retry_delays(
                settings
                    .retry_delays_ms
                    .iter()
                    .map(|ms| Duration::from_millis(*ms))
                    .collect(),
            )
            .with_safety_margin(chrono::Duration::seconds(settings.token_safety_margin_secs))
            .with_custtype(settings.custtype.clone())
            .with_token_name(settings.token_name.clone()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_request_spacing(mut self, spacing: Duration) -> Self {
        self.request_spacing = spacing;
        self
    }

    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    pub fn with_safety_margin(mut self, margin: chrono::Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    pub fn with_custtype(mut self, custtype: String) -> Self {
        self.custtype = custtype;
        self
    }

    pub fn with_token_name(mut self, name: String) -> Self {
        self.token_name = name;
        self
    }

    /// 앱 키 원문 (헤더/토큰 요청에만 사용).
    pub fn app_key(&self) -> &str {
        self.app_key.expose_secret()
    }

    /// 앱 시크릿 원문 (헤더/토큰 요청에만 사용).
    pub fn app_secret(&self) -> &str {
        self.app_secret.expose_secret()
    }

    /// 경로를 붙인 전체 URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 전송 시도 횟수 (최소 1).
    pub fn transport_attempts(&self) -> usize {
        self.retry_delays.len().max(1)
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> FlowResult<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(FlowError::Configuration(format!(
            "{} 환경변수가 설정되지 않았습니다",
            name
        ))),
    }
}

fn normalize_base_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_secrets_fail_fast() {
        let settings = KisSettings::default();
        let err = KisConfig::from_settings(&settings).unwrap_err();
        assert!(matches!(err, FlowError::Configuration(ref m) if m.contains("KIS_APP_KEY")));

        let settings = KisSettings {
            app_key: Some("key".to_string()),
            app_secret: Some("   ".to_string()),
            ..Default::default()
        };
        let err = KisConfig::from_settings(&settings).unwrap_err();
        assert!(matches!(err, FlowError::Configuration(ref m) if m.contains("KIS_APP_SECRET")));
    }

    #[test]
    fn test_from_settings() {
        let settings = KisSettings {
            base_url: format!("{}/", PAPER_BASE_URL),
            app_key: Some("key".to_string()),
            app_secret: Some("secret".to_string()),
            request_spacing_ms: 0,
            ..Default::default()
        };
        let config = KisConfig::from_settings(&settings).unwrap();
        assert_eq!(config.base_url, PAPER_BASE_URL);
        assert_eq!(config.url("/oauth2/tokenP"), format!("{}/oauth2/tokenP", PAPER_BASE_URL));
        assert_eq!(config.request_spacing, Duration::ZERO);
        assert_eq!(config.transport_attempts(), 3);
        assert_eq!(config.app_key(), "key");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = KisConfig::new(REAL_BASE_URL, "visible-key", "visible-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("visible-key"));
        assert!(!debug.contains("visible-secret"));
    }
}
