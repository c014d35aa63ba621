//! 브로커리지 접근 토큰.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// 접근 토큰과 만료 시각.
///
/// `Debug` 출력에서 토큰 값은 가려집니다.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// 토큰 원문 (헤더 구성 및 저장 용도로만 사용).
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// `now + margin < expires_at`일 때만 사용 가능합니다.
    pub fn is_usable_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin < self.expires_at
    }

    /// `Authorization` 헤더 값.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
