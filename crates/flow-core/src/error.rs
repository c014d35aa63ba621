//! 수집 시스템의 에러 타입.
//!
//! 모든 내부 컴포넌트는 `FlowError`를 그대로 전파하며, 외부 호출자(CLI, 라우트)는
//! `kind()`로 전송 계층 응답을 결정합니다.

use thiserror::Error;

/// 수집 파이프라인 에러.
///
/// 단일 비행(single-flight) 결과를 여러 호출자가 공유하므로 `Clone`을 구현합니다.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlowError {
    /// 필수 설정/비밀값 누락 (재시도하지 않음)
    #[error("설정 에러: {0}")]
    Configuration(String),

    /// 연결 수준 네트워크 실패 (재시도 소진 후 전달)
    #[error("네트워크 에러: {0}")]
    TransientNetwork(String),

    /// 업스트림이 토큰 만료를 알림 (1회 재시도 후에도 반복된 경우)
    #[error("인증 만료: {0}")]
    AuthExpired(String),

    /// 공급자가 오류 응답(HTTP 비정상 또는 오류 envelope)을 반환
    #[error("공급자 에러 [{provider}]: {message}")]
    Provider {
        provider: String,
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    /// 응답은 파싱되었으나 기대한 필드가 없거나 유효하지 않음
    #[error("데이터 형식 에러: {0}")]
    DataShape(String),

    /// 호출자 입력 검증 실패
    #[error("잘못된 입력: {0}")]
    Validation(String),

    /// 저장소 협력자 실패
    #[error("저장소 에러: {0}")]
    Storage(String),
}

/// 수집 작업을 위한 Result 타입.
pub type FlowResult<T> = Result<T, FlowError>;

impl FlowError {
    /// 메시지만 있는 공급자 에러를 생성합니다.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            status: None,
            code: None,
            message: message.into(),
        }
    }

    /// HTTP 상태 코드가 포함된 공급자 에러를 생성합니다.
    pub fn provider_status(
        provider: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            status: Some(status),
            code: None,
            message: message.into(),
        }
    }

    /// 외부 계층 매핑용 에러 분류 이름.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::TransientNetwork(_) => "transient_network_error",
            Self::AuthExpired(_) => "auth_expired_error",
            Self::Provider { .. } => "provider_error",
            Self::DataShape(_) => "data_shape_error",
            Self::Validation(_) => "validation_error",
            Self::Storage(_) => "storage_error",
        }
    }

    /// 재시도 가능한 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }

    /// 인증 만료 에러인지 확인합니다.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired(_))
    }

    /// 호출자 입력 문제인지 확인합니다.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<chrono::ParseError> for FlowError {
    fn from(err: chrono::ParseError) -> Self {
        Self::Validation(err.to_string())
    }
}
