//! 시간 슬롯 및 백필 계획.

use crate::error::{FlowError, FlowResult};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 하루 중 시:분 (설정된 시간대 기준).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HourMinute {
    hour: u8,
    minute: u8,
}

impl HourMinute {
    /// 시/분 범위를 검증하여 생성합니다.
    pub fn new(hour: u32, minute: u32) -> FlowResult<Self> {
        if hour > 23 || minute > 59 {
            return Err(FlowError::Validation(format!(
                "시각 범위 초과: {:02}:{:02}",
                hour, minute
            )));
        }
        Ok(Self {
            hour: hour as u8,
            minute: minute as u8,
        })
    }

    /// 범위를 벗어난 값은 23:59 쪽으로 잘라 생성합니다.
    pub const fn clamped(hour: u32, minute: u32) -> Self {
        Self {
            hour: if hour > 23 { 23 } else { hour as u8 },
            minute: if minute > 59 { 59 } else { minute as u8 },
        }
    }

    /// 자정 기준 분(minute-of-day)에서 생성합니다.
    pub fn from_minutes(minutes: u32) -> FlowResult<Self> {
        Self::new(minutes / 60, minutes % 60)
    }

    pub fn hour(&self) -> u32 {
        self.hour as u32
    }

    pub fn minute(&self) -> u32 {
        self.minute as u32
    }

    /// 자정 기준 분.
    pub fn minutes_of_day(&self) -> u32 {
        self.hour() * 60 + self.minute()
    }
}

impl FromStr for HourMinute {
    type Err = FlowError;

    /// `HH:MM` 형식만 허용합니다 (두 자리 시, 두 자리 분).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FlowError::Validation(format!("잘못된 시각 형식 (HH:MM): {}", s));

        let bytes = s.as_bytes();
        if bytes.len() != 5 || bytes[2] != b':' {
            return Err(invalid());
        }
        let digits_ok = [0usize, 1, 3, 4]
            .iter()
            .all(|&i| bytes[i].is_ascii_digit());
        if !digits_ok {
            return Err(invalid());
        }

        let hour: u32 = s[0..2].parse().map_err(|_| invalid())?;
        let minute: u32 = s[3..5].parse().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl fmt::Display for HourMinute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for HourMinute {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HourMinute {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// `YYYY-MM-DD` 형식의 날짜를 파싱합니다.
///
/// 형식(숫자 자릿수)과 달력상 유효성을 모두 검사합니다.
pub fn parse_date(s: &str) -> FlowResult<NaiveDate> {
    let bytes = s.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shape_ok {
        return Err(FlowError::Validation(format!(
            "잘못된 날짜 형식 (YYYY-MM-DD): {}",
            s
        )));
    }
    Ok(NaiveDate::parse_from_str(s, "%Y-%m-%d")?)
}

/// 저장 레코드의 자연 키 (날짜, 시각).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeSlot {
    pub date: NaiveDate,
    pub time: HourMinute,
}

impl TimeSlot {
    pub fn new(date: NaiveDate, time: HourMinute) -> Self {
        Self { date, time }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date.format("%Y-%m-%d"), self.time)
    }
}

/// 백필 요청에서 생성된 슬롯 목록.
///
/// 생성 후에는 읽기 전용이며 최대 슬롯 수가 보장됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillPlan {
    date: NaiveDate,
    slots: Vec<TimeSlot>,
    interval_minutes: u32,
}

impl BackfillPlan {
    /// 검증이 끝난 슬롯으로 계획을 생성합니다.
    pub fn new(date: NaiveDate, slots: Vec<TimeSlot>, interval_minutes: u32) -> Self {
        Self {
            date,
            slots,
            interval_minutes,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn interval_minutes(&self) -> u32 {
        self.interval_minutes
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 첫 슬롯 시각.
    pub fn first_time(&self) -> Option<HourMinute> {
        self.slots.first().map(|s| s.time)
    }

    /// 마지막 슬롯 시각.
    pub fn last_time(&self) -> Option<HourMinute> {
        self.slots.last().map(|s| s.time)
    }
}
