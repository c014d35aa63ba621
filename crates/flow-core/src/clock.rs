//! 거래 시간대 판정 및 샘플링 그리드.
//!
//! 모든 판정은 설정된 단일 시간대(기본 `Asia/Seoul`)에서 이루어지며 I/O가 없습니다.

use crate::domain::{HourMinute, TimeSlot};
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// 시간대 기준으로 분해한 시각.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZonedParts {
    pub weekday: Weekday,
    pub date: NaiveDate,
    pub hour: u32,
    pub minute: u32,
}

impl ZonedParts {
    /// 주말(토/일) 여부.
    pub fn is_weekend(&self) -> bool {
        matches!(self.weekday, Weekday::Sat | Weekday::Sun)
    }

    /// 자정 기준 분.
    pub fn minutes_of_day(&self) -> u32 {
        self.hour * 60 + self.minute
    }
}

/// 거래 시간 (양 끝 포함 폐구간).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingWindow {
    pub open: HourMinute,
    pub close: HourMinute,
}

impl TradingWindow {
    pub fn new(open: HourMinute, close: HourMinute) -> Self {
        Self { open, close }
    }

    /// 주어진 분이 `[open, close]` 안에 있는지 확인합니다.
    pub fn contains(&self, minutes_of_day: u32) -> bool {
        minutes_of_day >= self.open.minutes_of_day() && minutes_of_day <= self.close.minutes_of_day()
    }
}

impl Default for TradingWindow {
    /// 국내 정규장 09:00 ~ 15:30.
    fn default() -> Self {
        Self {
            open: HourMinute::clamped(9, 0),
            close: HourMinute::clamped(15, 30),
        }
    }
}

/// 시간대와 거래 시간을 묶은 시계.
#[derive(Debug, Clone, Copy)]
pub struct MarketClock {
    tz: Tz,
    window: TradingWindow,
}

impl MarketClock {
    pub fn new(tz: Tz, window: TradingWindow) -> Self {
        Self { tz, window }
    }

    /// 기준 시간대.
    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// 거래 시간.
    pub fn window(&self) -> TradingWindow {
        self.window
    }

    /// 순간을 시간대 기준 요일/날짜/시/분으로 분해합니다.
    pub fn parts(&self, instant: DateTime<Utc>) -> ZonedParts {
        let local = instant.with_timezone(&self.tz);
        ZonedParts {
            weekday: local.weekday(),
            date: local.date_naive(),
            hour: local.hour(),
            minute: local.minute(),
        }
    }

    /// 주말이 아니고 거래 시간 안이면 `true`.
    pub fn is_trading_window(&self, instant: DateTime<Utc>) -> bool {
        let parts = self.parts(instant);
        !parts.is_weekend() && self.window.contains(parts.minutes_of_day())
    }

    /// 시간대 기준 오늘 날짜.
    pub fn today(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.parts(instant).date
    }

    /// 순간이 속한 시간 슬롯. `grid`가 있으면 분을 그리드에 맞춰 내립니다.
    pub fn slot_at(&self, instant: DateTime<Utc>, grid: Option<u32>) -> TimeSlot {
        let parts = self.parts(instant);
        let minute = match grid {
            Some(g) => snap_to_grid(parts.minute, g),
            None => parts.minute,
        };
        // hour 0-23, minute 0-59 범위는 chrono가 보장
        TimeSlot::new(parts.date, HourMinute::clamped(parts.hour, minute))
    }
}

impl Default for MarketClock {
    fn default() -> Self {
        Self::new(chrono_tz::Asia::Seoul, TradingWindow::default())
    }
}

/// 분을 `grid`의 가장 가까운 아래쪽 배수로 내립니다.
///
/// `grid`가 0이면 입력을 그대로 반환합니다.
pub fn snap_to_grid(minute: u32, grid: u32) -> u32 {
    if grid == 0 {
        return minute;
    }
    minute - minute % grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Seoul;
    use proptest::prelude::*;

    fn kst(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> DateTime<Utc> {
        Seoul
            .with_ymd_and_hms(y, m, d, hh, mm, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_trading_window_edges() {
        let clock = MarketClock::default();
        // 2024-01-02 (화)
        assert!(clock.is_trading_window(kst(2024, 1, 2, 9, 0)));
        assert!(clock.is_trading_window(kst(2024, 1, 2, 15, 30)));
        assert!(clock.is_trading_window(kst(2024, 1, 2, 12, 0)));
        assert!(!clock.is_trading_window(kst(2024, 1, 2, 8, 59)));
        assert!(!clock.is_trading_window(kst(2024, 1, 2, 15, 31)));
    }

    #[test]
    fn test_trading_window_weekend() {
        let clock = MarketClock::default();
        // 2024-01-06 (토), 2024-01-07 (일)
        assert!(!clock.is_trading_window(kst(2024, 1, 6, 10, 0)));
        assert!(!clock.is_trading_window(kst(2024, 1, 7, 10, 0)));
    }

    #[test]
    fn test_parts_use_configured_zone() {
        let clock = MarketClock::default();
        // UTC 00:30 = KST 09:30
        let instant = Utc.with_ymd_and_hms(2024, 1, 2, 0, 30, 0).unwrap();
        let parts = clock.parts(instant);
        assert_eq!(parts.hour, 9);
        assert_eq!(parts.minute, 30);
        assert_eq!(parts.weekday, Weekday::Tue);

        // UTC 전날 23:00 = KST 08:00 다음 날
        let instant = Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap();
        assert_eq!(
            clock.parts(instant).date,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
    }

    #[test]
    fn test_snap_to_grid() {
        assert_eq!(snap_to_grid(47, 10), 40);
        assert_eq!(snap_to_grid(0, 10), 0);
        assert_eq!(snap_to_grid(59, 15), 45);
        assert_eq!(snap_to_grid(30, 10), 30);
        assert_eq!(snap_to_grid(7, 0), 7);
    }

    #[test]
    fn test_slot_at_snaps() {
        let clock = MarketClock::default();
        let slot = clock.slot_at(kst(2024, 1, 2, 10, 47), Some(10));
        assert_eq!(slot.time.to_string(), "10:40");
        let slot = clock.slot_at(kst(2024, 1, 2, 10, 47), None);
        assert_eq!(slot.time.to_string(), "10:47");
    }

    proptest! {
        #[test]
        fn prop_snap_is_lower_multiple(minute in 0u32..60, grid in 1u32..61) {
            let snapped = snap_to_grid(minute, grid);
            prop_assert!(snapped <= minute);
            prop_assert_eq!(snapped % grid, 0);
            prop_assert!(minute - snapped < grid);
        }
    }
}
