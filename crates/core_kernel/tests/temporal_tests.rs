//! Unit tests for calendar arithmetic, parsing and clocks

use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use core_kernel::temporal::DateRange;
use core_kernel::{
    add_months, days_until, to_calendar_date, Clock, FixedClock, SystemClock, TemporalError,
    Timezone,
};
use proptest::prelude::*;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

mod add_months_tests {
    use super::*;

    #[test]
    fn test_plain_month_add() {
        assert_eq!(add_months(d(2024, 5, 15), 1), d(2024, 6, 15));
        assert_eq!(add_months(d(2024, 11, 15), 2), d(2025, 1, 15));
    }

    #[test]
    fn test_end_of_month_clamping() {
        assert_eq!(add_months(d(2024, 1, 31), 1), d(2024, 2, 29));
        assert_eq!(add_months(d(2025, 1, 31), 1), d(2025, 2, 28));
        assert_eq!(add_months(d(2024, 3, 31), 1), d(2024, 4, 30));
        assert_eq!(add_months(d(2024, 8, 31), 1), d(2024, 9, 30));
    }

    #[test]
    fn test_leap_day_yearly_cycle() {
        assert_eq!(add_months(d(2024, 2, 29), 12), d(2025, 2, 28));
        assert_eq!(add_months(d(2024, 2, 29), 48), d(2028, 2, 29));
    }

    #[test]
    fn test_zero_and_negative() {
        assert_eq!(add_months(d(2024, 2, 29), 0), d(2024, 2, 29));
        assert_eq!(add_months(d(2024, 3, 31), -1), d(2024, 2, 29));
        assert_eq!(add_months(d(2024, 1, 15), -13), d(2022, 12, 15));
    }

    #[test]
    fn test_overflow_saturates() {
        assert_eq!(add_months(NaiveDate::MAX, 1), NaiveDate::MAX);
        assert_eq!(add_months(NaiveDate::MIN, -1), NaiveDate::MIN);
    }
}

mod parsing_tests {
    use super::*;

    #[test]
    fn test_accepted_forms() {
        let expected = Some(d(2024, 7, 4));
        assert_eq!(to_calendar_date("2024-07-04"), expected);
        assert_eq!(to_calendar_date("2024/07/04"), expected);
        assert_eq!(to_calendar_date("04-07-2024"), expected);
        assert_eq!(to_calendar_date("04/07/2024"), expected);
        assert_eq!(to_calendar_date("2024-07-04T10:00:00+05:30"), expected);
        assert_eq!(to_calendar_date("2024-07-04T10:00:00"), expected);
        assert_eq!(to_calendar_date(" 2024-07-04 "), expected);
    }

    #[test]
    fn test_rejected_forms_return_none() {
        assert_eq!(to_calendar_date(""), None);
        assert_eq!(to_calendar_date("tomorrow"), None);
        assert_eq!(to_calendar_date("2024-13-01"), None);
        assert_eq!(to_calendar_date("2023-02-29"), None);
    }
}

mod days_until_tests {
    use super::*;

    #[test]
    fn test_future_today_past() {
        let today = d(2024, 12, 30);
        assert_eq!(days_until(d(2025, 1, 2), today), 3);
        assert_eq!(days_until(today, today), 0);
        assert_eq!(days_until(d(2024, 12, 1), today), -29);
    }
}

mod date_range_tests {
    use super::*;

    #[test]
    fn test_new_rejects_inverted_range() {
        let result = DateRange::new(d(2024, 2, 1), d(2024, 1, 1));
        assert!(matches!(result, Err(TemporalError::InvalidPeriod { .. })));
    }

    #[test]
    fn test_days_from_is_inclusive() {
        let window = DateRange::days_from(d(2024, 1, 1), 30);
        assert_eq!(window.end, d(2024, 1, 31));
        assert_eq!(window.days(), 30);
        assert!(window.contains(d(2024, 1, 1)));
        assert!(window.contains(d(2024, 1, 31)));
        assert!(!window.contains(d(2024, 2, 1)));
        assert!(!window.contains(d(2023, 12, 31)));
    }
}

mod clock_tests {
    use super::*;

    #[test]
    fn test_fixed_clock_reports_pinned_instant() {
        let instant = Utc.with_ymd_and_hms(2024, 2, 25, 9, 0, 0).unwrap();
        let clock = FixedClock::new(instant);
        assert_eq!(clock.now(), instant);
        assert_eq!(clock.today(), d(2024, 2, 25));
    }

    #[test]
    fn test_system_clock_uses_timezone() {
        let clock = SystemClock::new("Asia/Kolkata".parse().unwrap());
        assert_eq!(clock.timezone().to_string(), "Asia/Kolkata");
        let local = clock.timezone().local_date(Utc::now());
        let diff = days_until(clock.today(), local).abs();
        assert!(diff <= 1);
    }

    #[test]
    fn test_timezone_parse_error() {
        let result = "Nowhere/Special".parse::<Timezone>();
        assert_eq!(
            result,
            Err(TemporalError::UnknownTimezone("Nowhere/Special".to_string()))
        );
    }

    #[test]
    fn test_timezone_serde() {
        let tz: Timezone = serde_json::from_str("\"Europe/London\"").unwrap();
        assert_eq!(serde_json::to_string(&tz).unwrap(), "\"Europe/London\"");
    }
}

fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (1990i32..2100, 1u32..=12, 1u32..=31).prop_filter_map("valid date", |(y, m, day)| {
        NaiveDate::from_ymd_opt(y, m, day)
    })
}

proptest! {
    #[test]
    fn prop_add_months_lands_in_target_month(date in date_strategy(), months in 0i32..240) {
        let result = add_months(date, months);
        let total = date.year() * 12 + date.month0() as i32 + months;
        prop_assert_eq!(result.year(), total.div_euclid(12));
        prop_assert_eq!(result.month0() as i32, total.rem_euclid(12));
        prop_assert!(result.day() <= date.day());
    }

    #[test]
    fn prop_add_months_keeps_day_when_it_exists(date in date_strategy(), months in 0i32..240) {
        let result = add_months(date, months);
        if date.day() <= 28 {
            prop_assert_eq!(result.day(), date.day());
        }
    }

    #[test]
    fn prop_days_until_is_antisymmetric(a in date_strategy(), b in date_strategy()) {
        prop_assert_eq!(days_until(a, b), -days_until(b, a));
    }

    #[test]
    fn prop_iso_format_round_trips(date in date_strategy()) {
        prop_assert_eq!(to_calendar_date(&date.format("%Y-%m-%d").to_string()), Some(date));
    }
}
