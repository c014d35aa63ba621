//! Yahoo Finance 시세 공급자.
//!
//! 시세 API는 쿠키 + crumb 세션을 요구할 때가 있습니다. 세션은 캐시해 두고
//! 401/403을 받으면 한 번만 새로 받아 재시도합니다. 세션 갱신은 단일 비행으로 묶습니다.

use super::{FxRateSource, OverseasChangeSource};
use crate::http::{build_client, read_json, transport_error};
use async_trait::async_trait;
use flow_core::numeric::number_field_opt;
use flow_core::{FlowError, FlowResult, ProviderSettings, SingleFlight};
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const PROVIDER: &str = "yahoo";

/// 캐시된 쿠키/crumb 세션.
#[derive(Debug, Clone)]
struct YahooSession {
    crumb: String,
    cookie: String,
    fetched_at: Instant,
}

struct YahooInner {
    client: Client,
    quote_url: String,
    crumb_url: String,
    session_url: String,
    session_ttl: Duration,
    nasdaq_symbol: String,
    usdkrw_symbol: String,
    session: RwLock<Option<YahooSession>>,
    refresh: SingleFlight<FlowResult<YahooSession>>,
}

/// Yahoo Finance 시세 공급자. 나스닥 등락률과 원/달러 환율을 모두 제공합니다.
#[derive(Clone)]
pub struct YahooQuoteProvider {
    inner: Arc<YahooInner>,
}

impl YahooQuoteProvider {
    /// 새 공급자 생성.
    pub fn new(settings: &ProviderSettings) -> FlowResult<Self> {
        let client = build_client(settings.timeout(), Some(&settings.user_agent))?;
        Ok(Self {
            inner: Arc::new(YahooInner {
                client,
                quote_url: settings.yahoo_quote_url.clone(),
                crumb_url: settings.yahoo_crumb_url.clone(),
                session_url: settings.yahoo_session_url.clone(),
                session_ttl: settings.yahoo_session_ttl(),
                nasdaq_symbol: settings.nasdaq_symbol.clone(),
                usdkrw_symbol: settings.usdkrw_symbol.clone(),
                session: RwLock::new(None),
                refresh: SingleFlight::new(),
            }),
        })
    }

    /// 심볼 하나의 시세 레코드 (`quoteResponse.result[0]`).
    pub async fn quote(&self, symbol: &str) -> FlowResult<Value> {
        let session = self.inner.cached_session();

        match self.inner.request_quote(symbol, session.as_ref()).await? {
            QuoteAttempt::Done(quote) => Ok(quote),
            QuoteAttempt::Unauthorized(status) => {
                debug!(status, symbol, "Yahoo quote unauthorized, refreshing session");
                self.inner.clear_session();

                let inner = self.inner.clone();
                let session = self
                    .inner
                    .refresh
                    .run(move || async move { inner.scrape_session().await })
                    .await?;
                self.inner.store_session(session.clone());

                match self.inner.request_quote(symbol, Some(&session)).await? {
                    QuoteAttempt::Done(quote) => Ok(quote),
                    QuoteAttempt::Unauthorized(status) => Err(FlowError::provider_status(
                        PROVIDER,
                        status,
                        "crumb 갱신 후에도 인증 실패",
                    )),
                }
            }
        }
    }
}

enum QuoteAttempt {
    Done(Value),
    Unauthorized(u16),
}

impl YahooInner {
    fn cached_session(&self) -> Option<YahooSession> {
        let guard = self.session.read().unwrap_or_else(|p| p.into_inner());
        guard
            .as_ref()
            .filter(|s| s.fetched_at.elapsed() < self.session_ttl)
            .cloned()
    }

    fn store_session(&self, session: YahooSession) {
        let mut guard = self.session.write().unwrap_or_else(|p| p.into_inner());
        *guard = Some(session);
    }

    fn clear_session(&self) {
        let mut guard = self.session.write().unwrap_or_else(|p| p.into_inner());
        *guard = None;
    }

    async fn request_quote(
        &self,
        symbol: &str,
        session: Option<&YahooSession>,
    ) -> FlowResult<QuoteAttempt> {
        let mut request = self.client.get(&self.quote_url).query(&[("symbols", symbol)]);
        if let Some(session) = session {
            request = request
                .query(&[("crumb", session.crumb.as_str())])
                .header(COOKIE, session.cookie.as_str());
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Ok(QuoteAttempt::Unauthorized(status.as_u16()));
        }

        let body = read_json(PROVIDER, response).await?;
        body.pointer("/quoteResponse/result/0")
            .filter(|v| v.is_object())
            .cloned()
            .map(QuoteAttempt::Done)
            .ok_or_else(|| {
                FlowError::DataShape(format!("Yahoo 응답에 {} 시세가 없습니다", symbol))
            })
    }

    /// HTML 페이지에서 쿠키를 받고, 페이지나 crumb API에서 crumb를 얻습니다.
    async fn scrape_session(&self) -> FlowResult<YahooSession> {
        let response = self
            .client
            .get(&self.session_url)
            .send()
            .await
            .map_err(transport_error)?;

        let cookie = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        let html = response.text().await.map_err(transport_error)?;

        let crumb = match extract_crumb(&html) {
            Some(crumb) => crumb,
            None => self.fetch_crumb(&cookie).await?,
        };

        debug!(cookie_parts = cookie.split("; ").count(), "Yahoo session refreshed");
        Ok(YahooSession {
            crumb,
            cookie,
            fetched_at: Instant::now(),
        })
    }

    async fn fetch_crumb(&self, cookie: &str) -> FlowResult<String> {
        let mut request = self.client.get(&self.crumb_url);
        if !cookie.is_empty() {
            request = request.header(COOKIE, cookie);
        }
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        let crumb = body.trim();

        if !status.is_success() || crumb.is_empty() || crumb.contains('<') {
            warn!(status = %status, "Yahoo crumb request failed");
            return Err(FlowError::provider_status(
                PROVIDER,
                status.as_u16(),
                "crumb를 얻지 못했습니다",
            ));
        }
        Ok(crumb.to_string())
    }
}

/// 페이지 본문의 `"crumb":"..."` 값을 찾습니다.
fn extract_crumb(html: &str) -> Option<String> {
    const MARKER: &str = "\"crumb\":\"";
    let start = html.find(MARKER)? + MARKER.len();
    let rest = &html[start..];
    let end = rest.find('"')?;
    let crumb = rest[..end].replace("\\u002F", "/");
    (!crumb.is_empty()).then_some(crumb)
}

/// 분수(0.0123)로 온 등락률을 퍼센트(1.23)로 맞춥니다.
///
/// 절댓값이 1 미만이면 분수로 간주합니다. 실제 1% 미만 변동도 100배가 되는 한계가 있습니다.
pub fn normalize_change_pct(value: f64) -> f64 {
    if value.abs() < 1.0 {
        value * 100.0
    } else {
        value
    }
}

/// 시세 레코드에서 전일 대비 등락률(%)을 구합니다.
fn change_pct_from_quote(quote: &Value) -> FlowResult<f64> {
    if let Some(pct) = number_field_opt(quote, "regularMarketChangePercent") {
        return Ok(normalize_change_pct(pct));
    }

    let price = number_field_opt(quote, "regularMarketPrice");
    let base = number_field_opt(quote, "regularMarketPreviousClose")
        .filter(|v| *v != 0.0)
        .or_else(|| number_field_opt(quote, "regularMarketOpen").filter(|v| *v != 0.0));

    match (price, base) {
        (Some(price), Some(base)) => Ok((price - base) / base * 100.0),
        _ => Err(FlowError::DataShape(
            "Yahoo 시세에 등락률을 계산할 값이 없습니다".to_string(),
        )),
    }
}

#[async_trait]
impl OverseasChangeSource for YahooQuoteProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_overseas_change(&self) -> FlowResult<f64> {
        let quote = self.quote(&self.inner.nasdaq_symbol).await?;
        change_pct_from_quote(&quote)
    }
}

#[async_trait]
impl FxRateSource for YahooQuoteProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_usdkrw(&self) -> FlowResult<f64> {
        let quote = self.quote(&self.inner.usdkrw_symbol).await?;
        number_field_opt(&quote, "regularMarketPrice")
            .filter(|v| *v > 0.0)
            .ok_or_else(|| FlowError::DataShape("Yahoo 환율 시세에 가격이 없습니다".to_string()))
    }
}
