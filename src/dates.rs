use serde::{Deserialize, Serialize};

use crate::model::{DateRange, PlanDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WeekStart {
    #[default]
    Monday,
    Sunday,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

/// First day of the week containing `date`.
pub fn week_start_of(date: PlanDate, week_start: WeekStart) -> PlanDate {
    let offset = match week_start {
        WeekStart::Monday => date.weekday().number_days_from_monday(),
        WeekStart::Sunday => date.weekday().number_days_from_sunday(),
    };
    date.add_days(-i64::from(offset))
}

/// Whole weeks covering `range`, widened outward to week boundaries.
pub fn week_ranges(range: DateRange, week_start: WeekStart) -> Vec<DateRange> {
    let mut weeks = Vec::new();
    let mut cursor = week_start_of(range.start, week_start);
    while cursor <= range.end {
        let week = DateRange::new(cursor, cursor.add_days(6));
        weeks.push(week);
        cursor = cursor.add_days(7);
    }
    weeks
}

/// `weeks` whole weeks starting `weeks_before` weeks ahead of today's week.
pub fn initial_range(
    today: PlanDate,
    week_start: WeekStart,
    weeks_before: u32,
    weeks: u32,
) -> DateRange {
    let start = week_start_of(today, week_start).add_days(-7 * i64::from(weeks_before));
    let end = start.add_days(7 * i64::from(weeks.max(1)) - 1);
    DateRange::new(start, end)
}

fn overflow_days(range: DateRange, optimum_days: i64) -> i64 {
    (range.len_days() - optimum_days).max(0)
}

/// Grow `range` by `weeks` in `direction` and pull the opposite edge in by one week
/// plus any excess over `optimum_days`.
pub fn scroll_range(
    range: DateRange,
    direction: ScrollDirection,
    weeks: u32,
    optimum_days: i64,
) -> DateRange {
    let grow = 7 * i64::from(weeks.max(1));
    let shrink = 7 + overflow_days(range, optimum_days);
    let (start, end) = match direction {
        ScrollDirection::Up => (range.start.add_days(-grow), range.end.add_days(-shrink)),
        ScrollDirection::Down => (range.start.add_days(shrink), range.end.add_days(grow)),
    };
    if end < start {
        return match direction {
            ScrollDirection::Up => DateRange::new(start, start.add_days(6)),
            ScrollDirection::Down => DateRange::new(end.add_days(-6), end),
        };
    }
    DateRange::new(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u8, d: u8) -> PlanDate {
        PlanDate::from_ymd(y, m, d).unwrap()
    }

    #[test]
    fn week_start_respects_configured_first_day() {
        // 2024-05-15 is a Wednesday.
        let wed = day(2024, 5, 15);
        assert_eq!(week_start_of(wed, WeekStart::Monday), day(2024, 5, 13));
        assert_eq!(week_start_of(wed, WeekStart::Sunday), day(2024, 5, 12));
        let sunday = day(2024, 5, 12);
        assert_eq!(week_start_of(sunday, WeekStart::Monday), day(2024, 5, 6));
    }

    #[test]
    fn week_ranges_widen_partial_weeks() {
        let range = DateRange::new(day(2024, 5, 15), day(2024, 5, 21));
        let weeks = week_ranges(range, WeekStart::Monday);
        assert_eq!(
            weeks,
            vec![
                DateRange::new(day(2024, 5, 13), day(2024, 5, 19)),
                DateRange::new(day(2024, 5, 20), day(2024, 5, 26)),
            ]
        );
    }

    #[test]
    fn initial_range_starts_a_week_early() {
        let range = initial_range(day(2024, 5, 15), WeekStart::Monday, 1, 5);
        assert_eq!(range.start, day(2024, 5, 6));
        assert_eq!(range.len_days(), 35);
    }

    #[test]
    fn scroll_up_trims_overflow_from_bottom() {
        let initial = initial_range(day(2024, 5, 15), WeekStart::Monday, 1, 5);
        let once = scroll_range(initial, ScrollDirection::Up, 3, 35);
        assert_eq!(once.start, initial.start.add_days(-21));
        assert_eq!(once.end, initial.end.add_days(-7));
        assert_eq!(once.len_days(), 49);

        let twice = scroll_range(once, ScrollDirection::Up, 1, 35);
        assert_eq!(twice.start, once.start.add_days(-7));
        assert_eq!(twice.end, once.end.add_days(-21));
        assert_eq!(twice.len_days(), 35);
    }

    #[test]
    fn scroll_down_moves_window_forward() {
        let initial = initial_range(day(2024, 5, 15), WeekStart::Monday, 1, 5);
        let next = scroll_range(initial, ScrollDirection::Down, 2, 35);
        assert_eq!(next.start, initial.start.add_days(7));
        assert_eq!(next.end, initial.end.add_days(14));
    }
}
