//! 국내 시장 구분.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 수급/지수를 수집하는 국내 시장.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    /// 유가증권시장
    Kospi,
    /// 코스닥
    Kosdaq,
}

impl Market {
    /// 모든 시장 (수집 순서).
    pub const ALL: [Market; 2] = [Market::Kospi, Market::Kosdaq];

    /// 투자자 시간대별 조회에 쓰는 시장 코드 (`fid_input_iscd`).
    pub fn investor_code(&self) -> &'static str {
        match self {
            Market::Kospi => "KSP",
            Market::Kosdaq => "KSQ",
        }
    }

    /// 업종(지수) 코드.
    pub fn index_code(&self) -> &'static str {
        match self {
            Market::Kospi => "0001",
            Market::Kosdaq => "1001",
        }
    }

    /// 표시용 이름.
    pub fn name(&self) -> &'static str {
        match self {
            Market::Kospi => "KOSPI",
            Market::Kosdaq => "KOSDAQ",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_codes() {
        assert_eq!(Market::Kospi.investor_code(), "KSP");
        assert_eq!(Market::Kosdaq.investor_code(), "KSQ");
        assert_eq!(Market::Kospi.index_code(), "0001");
        assert_eq!(Market::Kosdaq.index_code(), "1001");
    }
}
