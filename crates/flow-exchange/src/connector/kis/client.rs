//! KIS 인증 요청 클라이언트.
//!
//! - 모든 전송 시도 전에 프로세스 전역 최소 간격을 둡니다 (`RequestSpacer`).
//! - 연결 수준 실패는 설정된 대기 시간 목록만큼 재시도합니다.
//! - 토큰 만료 응답은 토큰을 폐기하고 요청 전체를 정확히 한 번 재시도합니다.

use super::auth::{truncate, KisTokenManager};
use super::config::KisConfig;
use super::envelope::{describe_shape, is_token_expired_body, KisEnvelope, KisPayload, KisReply};
use crate::http::{build_client, transport_error};
use flow_core::{Credential, FlowError, FlowResult};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// 인증 만료 시 요청 전체를 수행하는 최대 횟수 (최초 + 재시도 1회).
const AUTH_ATTEMPTS: usize = 2;

const PROVIDER: &str = "kis";

// ========================================
// 요청 간격
// ========================================

/// 프로세스 전역 최소 요청 간격.
///
/// 각 시도는 `max(지금 + 간격, 직전 예약 + 간격)` 시각까지 기다립니다.
/// 예약은 잠금 안에서 즉시 끝나고, 대기는 잠금 밖에서 합니다.
#[derive(Debug)]
pub struct RequestSpacer {
    spacing: Duration,
    last: Mutex<Option<Instant>>,
}

impl RequestSpacer {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last: Mutex::new(None),
        }
    }

    /// 다음 전송 시각을 예약하고 그때까지 기다립니다.
    pub async fn wait(&self) {
        if self.spacing.is_zero() {
            return;
        }
        let slot = self.reserve(Instant::now());
        tokio::time::sleep_until(slot).await;
    }

    fn reserve(&self, now: Instant) -> Instant {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        let earliest = now + self.spacing;
        let slot = match *last {
            Some(prev) if prev + self.spacing > earliest => prev + self.spacing,
            _ => earliest,
        };
        *last = Some(slot);
        slot
    }
}

// ========================================
// 클라이언트
// ========================================

/// KIS REST 조회 클라이언트.
pub struct KisClient {
    config: Arc<KisConfig>,
    http: Client,
    tokens: KisTokenManager,
    spacer: RequestSpacer,
}

impl KisClient {
    /// 새 클라이언트 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `FlowError::Configuration`을 반환합니다.
    pub fn new(config: Arc<KisConfig>, tokens: KisTokenManager) -> FlowResult<Self> {
        let http = build_client(config.timeout, None)?;
        let spacer = RequestSpacer::new(config.request_spacing);
        Ok(Self {
            config,
            http,
            tokens,
            spacer,
        })
    }

    /// 토큰 관리자.
    pub fn tokens(&self) -> &KisTokenManager {
        &self.tokens
    }

    /// 인증 GET 요청 후 envelope의 출력을 반환합니다.
    ///
    /// # Errors
    /// - 전송 재시도 소진: `TransientNetwork`
    /// - HTTP 비정상 응답 / 오류 envelope / 출력 없음: `Provider`
    /// - 토큰 만료가 재시도 후에도 반복: `AuthExpired`
    pub async fn get(
        &self,
        path: &str,
        tr_id: &str,
        query: &[(&str, &str)],
    ) -> FlowResult<KisPayload> {
        let url = self.config.url(path);
        if self.config.debug {
            info!(url = %url, tr_id, "[KIS] request");
        }

        for attempt in 0..AUTH_ATTEMPTS {
            let last_attempt = attempt + 1 == AUTH_ATTEMPTS;
            let credential = self.tokens.get_token().await?;
            let response = self.send_with_retry(&url, tr_id, query, &credential).await?;

            let status = response.status();
            let body = response.text().await.map_err(transport_error)?;

            if !status.is_success() {
                if is_token_expired_body(&body) {
                    if last_attempt {
                        return Err(FlowError::AuthExpired(truncate(&body, 200)));
                    }
                    self.tokens.invalidate(&body).await;
                    continue;
                }
                return Err(FlowError::provider_status(PROVIDER, status.as_u16(), body));
            }

            let envelope: KisEnvelope = serde_json::from_str(&body).map_err(|e| {
                FlowError::provider_status(PROVIDER, status.as_u16(), format!("JSON 파싱 실패: {}", e))
            })?;
            let rt_cd = envelope.rt_cd.clone();
            let reply = envelope.into_reply();

            if reply.is_token_expired() {
                let message = match &reply {
                    KisReply::Failure { message, .. } => message.clone(),
                    _ => String::new(),
                };
                if last_attempt {
                    return Err(FlowError::AuthExpired(message));
                }
                self.tokens.invalidate(&message).await;
                continue;
            }

            return match reply {
                KisReply::Success(payload) => {
                    if self.config.debug {
                        let output = describe_shape(&payload.output);
                        let output2 = payload
                            .output2
                            .as_ref()
                            .map(describe_shape)
                            .unwrap_or_else(|| "none".to_string());
                        info!(
                            tr_id,
                            path,
                            query = ?query,
                            rt_cd = rt_cd.as_deref().unwrap_or("?"),
                            output = %output,
                            output2 = %output2,
                            "[KIS] response"
                        );
                    }
                    Ok(payload)
                }
                KisReply::Failure { code, message } => Err(FlowError::Provider {
                    provider: PROVIDER.to_string(),
                    status: Some(status.as_u16()),
                    code: Some(code),
                    message,
                }),
                KisReply::MissingOutput => Err(FlowError::provider_status(
                    PROVIDER,
                    status.as_u16(),
                    "KIS response missing output.",
                )),
            };
        }

        Err(FlowError::AuthExpired(
            "KIS request failed after token refresh.".to_string(),
        ))
    }

    /// 전송 수준 재시도. 응답 상태와 무관하게 응답을 받으면 반환합니다.
    async fn send_with_retry(
        &self,
        url: &str,
        tr_id: &str,
        query: &[(&str, &str)],
        credential: &Credential,
    ) -> FlowResult<Response> {
        let headers = self.build_headers(tr_id, credential)?;
        let attempts = self.config.transport_attempts();
        let mut last_error = String::new();

        for attempt in 0..attempts {
            self.spacer.wait().await;

            match self
                .http
                .get(url)
                .headers(headers.clone())
                .query(query)
                .send()
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        attempts,
                        error = %e,
                        "[KIS] fetch error"
                    );
                    last_error = transport_error(e).to_string();
                    if attempt + 1 < attempts {
                        if let Some(delay) = self.config.retry_delays.get(attempt) {
                            tokio::time::sleep(*delay).await;
                        }
                    }
                }
            }
        }

        Err(FlowError::TransientNetwork(format!(
            "KIS request failed (network) after {} attempts: {}",
            attempts, last_error
        )))
    }

    /// 인증된 요청을 위한 공통 헤더 생성.
    fn build_headers(&self, tr_id: &str, credential: &Credential) -> FlowResult<HeaderMap> {
        let value = |v: &str, name: &str| {
            HeaderValue::from_str(v).map_err(|_| {
                FlowError::Configuration(format!("{}에 유효하지 않은 문자 포함", name))
            })
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        let mut authorization = value(&credential.bearer(), "authorization")?;
        authorization.set_sensitive(true);
        headers.insert("authorization", authorization);
        headers.insert("appkey", value(self.config.app_key(), "appkey")?);
        let mut appsecret = value(self.config.app_secret(), "appsecret")?;
        appsecret.set_sensitive(true);
        headers.insert("appsecret", appsecret);
        headers.insert("tr_id", value(tr_id, "tr_id")?);
        headers.insert("custtype", value(&self.config.custtype, "custtype")?);
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_spacer_reserves_increasing_slots() {
        let spacer = RequestSpacer::new(Duration::from_millis(350));
        let now = Instant::now();

        let first = spacer.reserve(now);
        let second = spacer.reserve(now);
        let third = spacer.reserve(now);

        assert_eq!(first, now + Duration::from_millis(350));
        assert_eq!(second, now + Duration::from_millis(700));
        assert_eq!(third, now + Duration::from_millis(1050));

        // 충분히 시간이 지난 뒤에는 지금 + 간격
        let later = now + Duration::from_secs(10);
        assert_eq!(spacer.reserve(later), later + Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spacer_waits_before_every_call() {
        let spacer = RequestSpacer::new(Duration::from_millis(350));
        let start = Instant::now();
        spacer.wait().await;
        spacer.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(700));
    }

    #[tokio::test]
    async fn test_zero_spacing_does_not_wait() {
        let spacer = RequestSpacer::new(Duration::ZERO);
        let start = std::time::Instant::now();
        spacer.wait().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
