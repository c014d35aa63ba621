//! KIS OAuth 토큰 수명 주기 관리.
//!
//! 조회 순서:
//! 1. 프로세스 메모리 캐시
//! 2. 영속 보관소 (재시작/다중 인스턴스 공유) → 유효하면 메모리로 승격
//! 3. 진행 중인 발급에 합류하거나 새로 발급 (단일 비행)
//!
//! 발급된 토큰은 메모리와 영속 보관소에 함께 기록됩니다. 토큰은 만료까지
//! 안전 여유(기본 60초)보다 많이 남았을 때만 사용합니다.

use super::config::KisConfig;
use super::path;
use crate::http::{build_client, transport_error};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use flow_core::{Credential, FlowError, FlowResult, SingleFlight, TokenStore};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

/// KIS OAuth 토큰 응답.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// 접근 토큰
    pub access_token: String,
    /// 토큰 타입 (항상 "Bearer")
    #[serde(default)]
    pub token_type: Option<String>,
    /// 토큰 만료 시간 (초)
    pub expires_in: i64,
    /// 접근 토큰 만료 시각 (KIS 형식: "YYYY-MM-DD HH:MM:SS", KST)
    #[serde(default)]
    pub access_token_token_expired: Option<String>,
}

/// KIS OAuth 오류 응답 (토큰 발급 실패 시).
#[derive(Debug, Clone, Deserialize)]
pub struct KisOAuthErrorResponse {
    /// 에러 코드 (예: "EGW00103")
    pub error_code: String,
    /// 에러 설명
    pub error_description: String,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    appkey: &'a str,
    appsecret: &'a str,
}

/// KIS 접근 토큰 관리자.
///
/// 프로세스당 하나를 만들어 `KisClient`에 주입합니다. 복제본은 같은 캐시를 공유합니다.
#[derive(Clone)]
pub struct KisTokenManager {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    config: Arc<KisConfig>,
    client: Client,
    store: Arc<dyn TokenStore>,
    memory: RwLock<Option<Credential>>,
    flight: SingleFlight<FlowResult<Credential>>,
    acquisitions: AtomicU64,
    invalidations: AtomicU64,
}

impl KisTokenManager {
    /// 새 토큰 관리자 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `FlowError::Configuration`을 반환합니다.
    pub fn new(config: Arc<KisConfig>, store: Arc<dyn TokenStore>) -> FlowResult<Self> {
        let client = build_client(config.timeout, None)?;
        Ok(Self {
            inner: Arc::new(TokenInner {
                config,
                client,
                store,
                memory: RwLock::new(None),
                flight: SingleFlight::new(),
                acquisitions: AtomicU64::new(0),
                invalidations: AtomicU64::new(0),
            }),
        })
    }

    /// 유효한 접근 토큰 반환, 필요시 발급.
    pub async fn get_token(&self) -> FlowResult<Credential> {
        if let Some(token) = self.inner.cached() {
            debug!(expires_at = %token.expires_at, "Using cached KIS token");
            return Ok(token);
        }

        let name = &self.inner.config.token_name;
        match self.inner.store.load(name).await {
            Ok(Some(stored)) if self.inner.is_usable(&stored) => {
                info!(expires_at = %stored.expires_at, "KIS token loaded from store");
                self.inner.remember(stored.clone());
                return Ok(stored);
            }
            Ok(Some(stored)) => {
                debug!(expires_at = %stored.expires_at, "Stored KIS token expired or expiring");
            }
            Ok(None) => debug!("No stored KIS token"),
            Err(e) => warn!(error = %e, "토큰 저장소 조회 실패, 새 토큰 발급으로 진행"),
        }

        let inner = self.inner.clone();
        self.inner
            .flight
            .run(move || async move { inner.acquire().await })
            .await
    }

    /// 메모리/영속 토큰을 모두 폐기합니다.
    ///
    /// 영속 보관소 삭제 실패는 로그만 남깁니다. 다음 `get_token`이 다시 발급합니다.
    /// 진행 중인 발급은 멈추지 않고 단일 비행 슬롯에서만 떼어냅니다.
    pub async fn invalidate(&self, reason: &str) {
        self.inner.invalidations.fetch_add(1, Ordering::SeqCst);
        warn!(reason = %truncate(reason, 200), "KIS token invalidated");

        self.inner.forget();
        self.inner.flight.forget();

        if let Err(e) = self.inner.store.delete(&self.inner.config.token_name).await {
            warn!(error = %e, "토큰 저장소 삭제 실패");
        }
    }

    /// 네트워크 토큰 발급 횟수.
    pub fn acquisition_count(&self) -> u64 {
        self.inner.acquisitions.load(Ordering::SeqCst)
    }

    /// 폐기 횟수.
    pub fn invalidation_count(&self) -> u64 {
        self.inner.invalidations.load(Ordering::SeqCst)
    }

    /// 설정 반환.
    pub fn config(&self) -> &KisConfig {
        &self.inner.config
    }
}

impl TokenInner {
    fn is_usable(&self, credential: &Credential) -> bool {
        credential.is_usable_at(Utc::now(), self.config.safety_margin)
    }

    fn cached(&self) -> Option<Credential> {
        let guard = self.memory.read().unwrap_or_else(|p| p.into_inner());
        guard.as_ref().filter(|c| self.is_usable(c)).cloned()
    }

    fn remember(&self, credential: Credential) {
        let mut guard = self.memory.write().unwrap_or_else(|p| p.into_inner());
        *guard = Some(credential);
    }

    fn forget(&self) {
        let mut guard = self.memory.write().unwrap_or_else(|p| p.into_inner());
        *guard = None;
    }

    /// 단일 비행 본체: 발급 후 메모리와 영속 보관소에 기록.
    async fn acquire(&self) -> FlowResult<Credential> {
        // 직전 발급이 막 끝났다면 그 결과를 사용
        if let Some(token) = self.cached() {
            return Ok(token);
        }

        let credential = self.request_token().await?;
        self.remember(credential.clone());

        if let Err(e) = self.store.save(&self.config.token_name, &credential).await {
            warn!(error = %e, "토큰 저장소 기록 실패, 메모리 캐시만 사용");
        }

        Ok(credential)
    }

    /// POST /oauth2/tokenP.
    async fn request_token(&self) -> FlowResult<Credential> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);

        let app_key = self.config.app_key();
        info!(
            "Requesting new KIS access token... (AppKey: {}...)",
            app_key.chars().take(4).collect::<String>()
        );
        if self.config.debug {
            info!(
                base_url = %self.config.base_url,
                key_len = app_key.len(),
                secret_len = self.config.app_secret().len(),
                "[KIS] token request"
            );
        }

        let request_body = TokenRequest {
            grant_type: "client_credentials",
            appkey: app_key,
            appsecret: self.config.app_secret(),
        };

        let response = self
            .client
            .post(self.config.url(path::TOKEN))
            .header("Content-Type", "application/json; charset=utf-8")
            .json(&request_body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            error!(status = %status, "KIS token request failed");

            if let Ok(oauth_error) = serde_json::from_str::<KisOAuthErrorResponse>(&body) {
                let message = match oauth_error.error_code.as_str() {
                    "EGW00103" => "유효하지 않은 AppKey입니다. KIS_APP_KEY, KIS_APP_SECRET을 확인하세요."
                        .to_string(),
                    "EGW00102" => "AppKey가 만료되었습니다.".to_string(),
                    "EGW00101" => "AppSecret이 일치하지 않습니다.".to_string(),
                    "EGW00133" => "토큰 발급은 1분당 1회로 제한됩니다.".to_string(),
                    _ => oauth_error.error_description.clone(),
                };
                return Err(FlowError::Provider {
                    provider: "kis".to_string(),
                    status: Some(status.as_u16()),
                    code: Some(oauth_error.error_code),
                    message,
                });
            }

            return Err(FlowError::provider_status(
                "kis",
                status.as_u16(),
                format!("KIS token request failed: {}", body),
            ));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| FlowError::DataShape(format!("토큰 응답 파싱 실패: {}", e)))?;
        if token.access_token.is_empty() {
            return Err(FlowError::DataShape("토큰 응답에 access_token이 없습니다".to_string()));
        }

        let expires_at = token
            .access_token_token_expired
            .as_deref()
            .and_then(parse_kis_datetime)
            .unwrap_or_else(|| Utc::now() + Duration::seconds(token.expires_in.max(0)));

        info!(expires_at = %expires_at, "KIS access token obtained");
        Ok(Credential::new(token.access_token, expires_at))
    }
}

/// KIS 날짜시간 형식 파싱 ("YYYY-MM-DD HH:MM:SS", KST).
fn parse_kis_datetime(s: &str) -> Option<DateTime<Utc>> {
    use chrono_tz::Asia::Seoul;

    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok()?;
    let kst = Seoul.from_local_datetime(&naive).single()?;
    Some(kst.with_timezone(&Utc))
}

/// 로그용 문자열 자르기 (문자 경계 기준).
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max_chars).collect();
        out.push('…');
        out
    }
}
