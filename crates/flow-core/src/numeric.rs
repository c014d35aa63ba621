//! 공급자 응답의 숫자 정규화.
//!
//! 공급자들은 숫자를 문자열(`"1,234,567"`, `"+0.52%"`)이나 JSON 숫자로 섞어 보냅니다.
//! 천 단위 구분자와 `%`를 제거하고, 유한하지 않거나 파싱할 수 없는 값은 "없음"으로 취급합니다.

use serde_json::Value;

/// 문자열을 숫자로 파싱합니다. 실패 시 `None`.
pub fn parse_str_opt(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '%')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// JSON 값을 숫자로 파싱합니다. 숫자/문자열 외의 값이나 실패 시 `None`.
pub fn parse_number_opt(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_str_opt(s),
        _ => None,
    }
}

/// JSON 값을 숫자로 파싱합니다. 없거나 잘못된 값은 0.
pub fn parse_number(value: &Value) -> f64 {
    parse_number_opt(value).unwrap_or(0.0)
}

/// 객체의 필드를 숫자로 읽습니다. 없거나 잘못된 값은 0.
pub fn number_field(object: &Value, key: &str) -> f64 {
    object.get(key).map(parse_number).unwrap_or(0.0)
}

/// 객체의 필드를 숫자로 읽습니다. 없거나 잘못된 값은 `None`.
pub fn number_field_opt(object: &Value, key: &str) -> Option<f64> {
    object.get(key).and_then(parse_number_opt)
}
