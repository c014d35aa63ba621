//! 공급자 공용 HTTP 도우미.

use flow_core::{FlowError, FlowResult};
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;

/// 타임아웃과 User-Agent가 설정된 클라이언트를 만듭니다.
pub fn build_client(timeout: Duration, user_agent: Option<&str>) -> FlowResult<Client> {
    let mut builder = Client::builder().timeout(timeout);
    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua);
    }
    builder
        .build()
        .map_err(|e| FlowError::Configuration(format!("HTTP client 생성 실패: {}", e)))
}

/// 전송 계층 실패를 에러로 변환합니다.
pub fn transport_error(err: reqwest::Error) -> FlowError {
    FlowError::TransientNetwork(err.to_string())
}

/// 2xx가 아니면 공급자 에러, 본문이 JSON이 아니면 공급자 에러로 처리하고 JSON을 반환합니다.
pub async fn read_json(provider: &str, response: Response) -> FlowResult<Value> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;

    if !status.is_success() {
        return Err(FlowError::provider_status(provider, status.as_u16(), body));
    }

    serde_json::from_str(&body).map_err(|e| {
        FlowError::provider_status(provider, status.as_u16(), format!("JSON 파싱 실패: {}", e))
    })
}
