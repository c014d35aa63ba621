//! KIS 응답 envelope 해석.
//!
//! 모든 KIS 조회 응답은 `{output|output1, output2?, rt_cd, msg_cd?, msg1?}` 형태입니다.
//! `rt_cd`가 있고 `"0"`이 아니면 실패이며, 성공이면 `output`/`output1` 중 먼저 채워진 값을 씁니다.

use super::TOKEN_EXPIRED_CODES;
use serde::Deserialize;
use serde_json::Value;

/// 원본 envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KisEnvelope {
    /// 응답 코드 (0 = 성공)
    #[serde(default)]
    pub rt_cd: Option<String>,
    /// 메시지 코드
    #[serde(default)]
    pub msg_cd: Option<String>,
    /// 메시지 내용
    #[serde(default)]
    pub msg1: Option<String>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub output1: Option<Value>,
    #[serde(default)]
    pub output2: Option<Value>,
}

/// 성공 응답의 본문.
#[derive(Debug, Clone, PartialEq)]
pub struct KisPayload {
    /// `output` 또는 `output1`
    pub output: Value,
    /// 보조 출력 (있을 때만)
    pub output2: Option<Value>,
}

/// envelope 해석 결과.
#[derive(Debug, Clone, PartialEq)]
pub enum KisReply {
    /// 성공 (출력 포함)
    Success(KisPayload),
    /// `rt_cd != "0"`
    Failure { code: String, message: String },
    /// 성공 코드지만 출력이 없음
    MissingOutput,
}

impl KisReply {
    /// 토큰 만료 실패인지 확인합니다.
    pub fn is_token_expired(&self) -> bool {
        match self {
            KisReply::Failure { code, message } => {
                is_token_expired_signal(Some(code.as_str()), message)
            }
            _ => false,
        }
    }
}

impl KisEnvelope {
    /// 성공/실패로 해석합니다.
    ///
    /// 출력 선택 규칙:
    /// 1. `output`, `output1` 순서로 비어 있지 않은 값(null, `""`, `[]`, `{}` 제외)
    /// 2. 없으면 null이 아닌 첫 값 (빈 배열은 상위에서 데이터 형식 에러로 처리)
    /// 3. 둘 다 없거나 null이면 `MissingOutput`
    pub fn into_reply(self) -> KisReply {
        if let Some(code) = self.rt_cd.as_deref() {
            if code != "0" {
                return KisReply::Failure {
                    code: self.msg_cd.unwrap_or_default(),
                    message: self
                        .msg1
                        .unwrap_or_else(|| "KIS request failed.".to_string()),
                };
            }
        }

        let chosen = match (self.output, self.output1) {
            (Some(output), _) if is_populated(&output) => Some(output),
            (_, Some(output1)) if is_populated(&output1) => Some(output1),
            (output, output1) => output
                .filter(|v| !v.is_null())
                .or(output1.filter(|v| !v.is_null())),
        };

        match chosen {
            Some(output) => KisReply::Success(KisPayload {
                output,
                output2: self.output2.filter(|v| !v.is_null()),
            }),
            None => KisReply::MissingOutput,
        }
    }
}

/// 값이 실제 내용을 갖는지 확인합니다.
fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}

/// 토큰 만료 신호 판정.
///
/// `EGW00123` 코드 일치가 우선이며, 코드가 없거나 다를 때는 메시지에
/// "token"과 함께 "expired" 또는 "만료"가 들어 있는지 확인합니다.
pub fn is_token_expired_signal(code: Option<&str>, message: &str) -> bool {
    if let Some(code) = code {
        if TOKEN_EXPIRED_CODES.contains(&code) {
            return true;
        }
    }
    let lower = message.to_lowercase();
    lower.contains("token") && (lower.contains("expired") || lower.contains("만료"))
}

/// HTTP 오류 응답 본문이 토큰 만료를 뜻하는지 판정합니다.
///
/// 본문이 envelope이면 `msg_cd`/`msg1`로 판정하고, 아니면 본문 전체에 대해
/// 메시지 규칙만 적용합니다.
pub fn is_token_expired_body(body: &str) -> bool {
    match serde_json::from_str::<KisEnvelope>(body) {
        Ok(envelope) if envelope.msg_cd.is_some() || envelope.msg1.is_some() => {
            let message = envelope.msg1.as_deref().unwrap_or("");
            is_token_expired_signal(envelope.msg_cd.as_deref(), message)
                || is_token_expired_signal(None, body)
        }
        _ => is_token_expired_signal(None, body),
    }
}

/// 진단 로그용 출력 형태 요약 (값 자체는 포함하지 않음).
pub fn describe_shape(value: &Value) -> String {
    match value {
        Value::Array(a) => format!("array({})", a.len()),
        Value::Object(o) => {
            let keys: Vec<&str> = o.keys().map(String::as_str).collect();
            format!("object[{}]", keys.join(","))
        }
        Value::Null => "none".to_string(),
        _ => "scalar".to_string(),
    }
}
