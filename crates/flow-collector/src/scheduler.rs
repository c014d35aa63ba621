//! 수집 스케줄 판정 및 백필 계획.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use flow_core::{
    parse_date, BackfillPlan, FlowError, FlowResult, HourMinute, MarketClock, ScheduleSettings,
    TimeSlot,
};
use std::time::Duration;

/// 거래 시간 게이트와 백필 계획기.
#[derive(Debug, Clone)]
pub struct IngestionScheduler {
    clock: MarketClock,
    grid_minutes: u32,
    max_backfill_slots: usize,
}

impl IngestionScheduler {
    pub fn new(clock: MarketClock, grid_minutes: u32, max_backfill_slots: usize) -> Self {
        Self {
            clock,
            grid_minutes,
            max_backfill_slots,
        }
    }

    /// 스케줄 설정에서 생성합니다.
    pub fn from_settings(settings: &ScheduleSettings) -> FlowResult<Self> {
        Ok(Self::new(
            settings.clock()?,
            settings.grid_minutes,
            settings.max_backfill_slots,
        ))
    }

    pub fn clock(&self) -> &MarketClock {
        &self.clock
    }

    pub fn grid_minutes(&self) -> u32 {
        self.grid_minutes
    }

    /// 현재 슬롯. `snapped`이면 분을 샘플링 그리드에 맞춥니다.
    pub fn current_slot(&self, now: DateTime<Utc>, snapped: bool) -> TimeSlot {
        let grid = snapped.then_some(self.grid_minutes);
        self.clock.slot_at(now, grid)
    }

    /// 지금 샘플을 수집해야 하는지 (거래 시간 여부).
    pub fn should_sample(&self, now: DateTime<Utc>) -> bool {
        self.clock.is_trading_window(now)
    }

    /// 다음 그리드 경계까지 남은 시간. 경계 위에 있으면 0.
    pub fn until_next_slot(&self, now: DateTime<Utc>) -> Duration {
        let local = now.with_timezone(&self.clock.tz());
        let grid_secs = u64::from(self.grid_minutes.max(1)) * 60;
        let into = (u64::from(local.minute()) * 60 + u64::from(local.second())) % grid_secs;
        Duration::from_secs((grid_secs - into) % grid_secs)
    }

    /// 시간대 기준 오늘.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.clock.today(now)
    }

    /// 문자열 입력을 검증하고 백필 계획을 만듭니다.
    ///
    /// 검증 순서: 날짜 형식, 시각 형식, 간격 > 0, 시작 <= 종료, 슬롯 수 상한.
    /// 상한 검사는 슬롯을 만들기 전에 개수로 먼저 합니다.
    pub fn plan_backfill(
        &self,
        date: &str,
        start_time: &str,
        end_time: &str,
        interval_minutes: i64,
    ) -> FlowResult<BackfillPlan> {
        let date = parse_date(date)?;
        let (start, end) = match (start_time.parse::<HourMinute>(), end_time.parse::<HourMinute>())
        {
            (Ok(start), Ok(end)) => (start, end),
            _ => {
                return Err(FlowError::Validation(
                    "Invalid time format. Use HH:MM.".to_string(),
                ))
            }
        };

        if interval_minutes <= 0 {
            return Err(FlowError::Validation(
                "intervalMinutes must be a positive number.".to_string(),
            ));
        }
        if start > end {
            return Err(FlowError::Validation(
                "startTime must be earlier than endTime.".to_string(),
            ));
        }

        let span = (end.minutes_of_day() - start.minutes_of_day()) as i64;
        let count = span / interval_minutes + 1;
        if count > self.max_backfill_slots as i64 {
            return Err(FlowError::Validation(format!(
                "Too many rows. Max {}.",
                self.max_backfill_slots
            )));
        }

        // 간격이 하루보다 길면 슬롯은 시작 하나뿐
        let step = interval_minutes.min(i64::from(u32::MAX)) as u32;
        let slots = (0..count as u32)
            .map(|i| HourMinute::from_minutes(start.minutes_of_day() + i * step))
            .map(|time| time.map(|t| TimeSlot::new(date, t)))
            .collect::<FlowResult<Vec<_>>>()?;

        Ok(BackfillPlan::new(date, slots, step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn scheduler() -> IngestionScheduler {
        IngestionScheduler::new(MarketClock::default(), 10, 200)
    }

    fn times(plan: &BackfillPlan) -> Vec<String> {
        plan.slots().iter().map(|s| s.time.to_string()).collect()
    }

    #[test]
    fn test_plan_inclusive_range() {
        let plan = scheduler()
            .plan_backfill("2024-01-02", "09:00", "09:30", 15)
            .unwrap();
        assert_eq!(times(&plan), vec!["09:00", "09:15", "09:30"]);
        assert_eq!(plan.date().to_string(), "2024-01-02");
        assert_eq!(plan.interval_minutes(), 15);
    }

    #[test]
    fn test_plan_end_not_on_step() {
        let plan = scheduler()
            .plan_backfill("2024-01-02", "09:00", "09:40", 15)
            .unwrap();
        assert_eq!(times(&plan), vec!["09:00", "09:15", "09:30"]);
    }

    #[test]
    fn test_plan_single_slot() {
        let plan = scheduler()
            .plan_backfill("2024-01-02", "15:30", "15:30", 15)
            .unwrap();
        assert_eq!(times(&plan), vec!["15:30"]);

        let plan = scheduler()
            .plan_backfill("2024-01-02", "09:00", "15:30", 100_000)
            .unwrap();
        assert_eq!(times(&plan), vec!["09:00"]);
    }

    #[test]
    fn test_plan_rejects_invalid_input() {
        let s = scheduler();
        let cases = [
            ("2024-1-02", "09:00", "09:30", 15),
            ("2024-02-30", "09:00", "09:30", 15),
            ("2024-01-02", "9:00", "09:30", 15),
            ("2024-01-02", "09:00", "24:00", 15),
            ("2024-01-02", "09:00", "09:60", 15),
            ("2024-01-02", "09:00", "09:30", 0),
            ("2024-01-02", "09:00", "09:30", -5),
            ("2024-01-02", "10:00", "09:00", 15),
        ];
        for (date, start, end, interval) in cases {
            let result = s.plan_backfill(date, start, end, interval);
            assert!(
                matches!(result, Err(FlowError::Validation(_))),
                "expected validation error for {} {} {} {}",
                date,
                start,
                end,
                interval
            );
        }
    }

    #[test]
    fn test_plan_cap() {
        let s = scheduler();
        // 09:00 ~ 12:19 매분 = 200 슬롯
        assert_eq!(
            s.plan_backfill("2024-01-02", "09:00", "12:19", 1).unwrap().len(),
            200
        );
        assert!(matches!(
            s.plan_backfill("2024-01-02", "09:00", "12:20", 1),
            Err(FlowError::Validation(ref m)) if m.contains("200")
        ));
        assert!(s.plan_backfill("2024-01-02", "00:00", "23:59", 1).is_err());
    }

    #[test]
    fn test_current_slot_snapping() {
        let s = scheduler();
        // KST 2024-01-02 10:37
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 1, 37, 12).unwrap();
        assert_eq!(s.current_slot(now, true).to_string(), "2024-01-02 10:30");
        assert_eq!(s.current_slot(now, false).to_string(), "2024-01-02 10:37");
        assert!(s.should_sample(now));

        // KST 토요일
        let weekend = Utc.with_ymd_and_hms(2024, 1, 6, 1, 0, 0).unwrap();
        assert!(!s.should_sample(weekend));
    }

    #[test]
    fn test_until_next_slot() {
        let s = scheduler();
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 1, 37, 30).unwrap();
        assert_eq!(s.until_next_slot(now), Duration::from_secs(150));
        let on_boundary = Utc.with_ymd_and_hms(2024, 1, 2, 1, 40, 0).unwrap();
        assert_eq!(s.until_next_slot(on_boundary), Duration::ZERO);
    }

    proptest! {
        #[test]
        fn prop_plan_is_ordered_and_bounded(
            start in 0u32..1440,
            len in 0u32..600,
            interval in 1i64..120,
        ) {
            let end = (start + len).min(1439);
            let start_hm = HourMinute::from_minutes(start).unwrap();
            let end_hm = HourMinute::from_minutes(end).unwrap();
            let result = scheduler().plan_backfill(
                "2024-01-02",
                &start_hm.to_string(),
                &end_hm.to_string(),
                interval,
            );
            let expected = ((end - start) as i64 / interval + 1) as usize;
            match result {
                Ok(plan) => {
                    prop_assert_eq!(plan.len(), expected);
                    prop_assert!(expected <= 200);
                    prop_assert_eq!(plan.first_time(), Some(start_hm));
                    prop_assert!(plan.last_time().unwrap() <= end_hm);
                    prop_assert!(plan.slots().windows(2).all(|w| w[0] < w[1]));
                }
                Err(err) => {
                    prop_assert!(expected > 200);
                    prop_assert!(err.is_client_error());
                }
            }
        }
    }
}
