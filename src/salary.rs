//! Regulated salary average over a trailing window of contributed days.
//!
//! Resolved spans are walked from the most recent backwards, summing
//! calendar days (gaps between employments are skipped, not counted)
//! until the target day count is reached.  The last span consumed only
//! contributes the trailing days still needed.  Consumed days are split
//! per calendar year so each year's salary ceiling applies to its own
//! days.  Salaries are weighted by days used; rounding happens once, on
//! the final figures.

use crate::models::{round2, EmploymentPeriod, SalarySegment, SalaryWindowResult};
use crate::overlap::ResolvedPeriod;
use crate::rules::SalaryCapTable;
use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

/// Average month length used to turn the daily average into a monthly
/// one (365 / 12, truncated to one decimal as the institute reports).
pub const AVERAGE_MONTH_DAYS: Decimal = dec!(30.4);

pub struct SalaryWindowInput<'a> {
    pub periods: &'a [EmploymentPeriod],
    /// Resolved days for each period, in the same order as `periods`.
    pub resolved: &'a [ResolvedPeriod],
    pub target_days: i64,
    /// Days after this date are not part of the window.
    pub anchor: NaiveDate,
    pub cap: Option<&'a SalaryCapTable>,
}

struct Candidate<'a> {
    period: &'a EmploymentPeriod,
    start: NaiveDate,
    end: NaiveDate,
}

pub fn average_salary_window(input: &SalaryWindowInput<'_>) -> SalaryWindowResult {
    let target_days = input.target_days.max(0);
    let anchor = input.anchor;
    let mut candidates: Vec<Candidate<'_>> = input
        .periods
        .iter()
        .zip(input.resolved)
        .flat_map(move |(period, resolved)| {
            resolved
                .spans
                .iter()
                .filter(move |span| span.start <= anchor)
                .map(move |span| Candidate {
                    period,
                    start: span.start,
                    end: span.end.min(anchor),
                })
        })
        .collect();
    candidates.sort_by(|a, b| {
        b.end
            .cmp(&a.end)
            .then(b.start.cmp(&a.start))
            .then(a.period.id.cmp(&b.period.id))
    });

    let mut observations = Vec::new();
    let mut segments = Vec::new();
    let mut achieved_days: i64 = 0;
    let mut weighted_sum = Decimal::ZERO;

    for candidate in candidates {
        let remaining = target_days - achieved_days;
        if remaining <= 0 {
            break;
        }
        let available = (candidate.end - candidate.start).num_days() + 1;
        let days_used = available.min(remaining);
        let start = candidate.end - Duration::days(days_used - 1);
        // The ceiling changes every January, so each year is weighted on its own.
        for (piece_start, piece_end) in split_by_year(start, candidate.end) {
            let days = (piece_end - piece_start).num_days() + 1;
            let year = piece_start.year();
            let reported = candidate.period.daily_salary;
            let ceiling = input.cap.and_then(|cap| cap.cap_for_year(year));
            let (daily_salary, capped) = match ceiling {
                Some(ceiling) if reported > ceiling => (ceiling, true),
                _ => (reported, false),
            };
            if capped {
                observations.push(format!(
                    "Daily salary {} from {} capped at {} for {} days of {}",
                    reported,
                    candidate.period.employer_name,
                    round2(daily_salary),
                    days,
                    year
                ));
            }
            weighted_sum += daily_salary * Decimal::from(days);
            segments.push(SalarySegment {
                period_id: candidate.period.id,
                employer_name: candidate.period.employer_name.clone(),
                employer_id: candidate.period.employer_id.clone(),
                start: piece_start,
                end: piece_end,
                days_used: days,
                reported_daily_salary: reported,
                daily_salary,
                capped,
            });
        }
        achieved_days += days_used;
    }

    if input.cap.is_none() {
        observations.push("No salary cap table for this regime; daily salaries used uncapped".to_string());
    }

    let complete = achieved_days >= target_days;
    let daily = if achieved_days > 0 {
        weighted_sum / Decimal::from(achieved_days)
    } else {
        Decimal::ZERO
    };
    if achieved_days == 0 {
        observations.push("No contribution history available for the salary window".to_string());
    } else if complete {
        observations.push(format!("Complete window of {} contributed days", target_days));
    } else {
        observations.push(format!(
            "Partial calculation: only {} weeks ({} days) of the {} days required; the average uses the available days",
            achieved_days / 7,
            achieved_days,
            target_days
        ));
        warn!(achieved_days, target_days, "salary window incomplete");
    }

    let window_start = segments.iter().map(|s| s.start).min();
    let window_end = segments.iter().map(|s| s.end).max();
    debug!(achieved_days, segments = segments.len(), %daily, "salary window averaged");

    SalaryWindowResult {
        target_days,
        achieved_days,
        daily_average: round2(daily),
        monthly_average: round2(daily * AVERAGE_MONTH_DAYS),
        window_start,
        window_end,
        complete,
        cap_table_applied: input.cap.is_some(),
        segments,
        observations,
    }
}

/// Split an inclusive range at calendar-year boundaries, latest year
/// first.
fn split_by_year(start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let mut pieces = Vec::new();
    let mut piece_end = end;
    loop {
        let piece_start = NaiveDate::from_ymd_opt(piece_end.year(), 1, 1)
            .map_or(start, |january_first| january_first.max(start));
        pieces.push((piece_start, piece_end));
        if piece_start <= start {
            break;
        }
        piece_end = piece_start - Duration::days(1);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlap::resolve_overlaps;
    use crate::overlap::tests::period;
    use crate::rules::tests::date;
    use std::collections::BTreeMap;

    fn run(periods: &[EmploymentPeriod], target_days: i64, cap: Option<&SalaryCapTable>) -> SalaryWindowResult {
        let resolution = resolve_overlaps(periods).unwrap();
        average_salary_window(&SalaryWindowInput {
            periods,
            resolved: &resolution.resolved,
            target_days,
            anchor: date(2030, 1, 1),
            cap,
        })
    }

    #[test]
    fn single_year_at_constant_salary() {
        let periods = vec![period(0, "A", date(2020, 1, 1), date(2020, 12, 31), dec!(300))];
        let result = run(&periods, 365, None);
        assert_eq!(result.achieved_days, 365);
        assert!(result.complete);
        assert_eq!(result.daily_average.to_string(), "300.00");
        assert_eq!(result.monthly_average.to_string(), "9120.00");
        assert_eq!(result.window_end, Some(date(2020, 12, 31)));
        assert_eq!(result.window_start, Some(date(2020, 1, 2)));
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].days_used, 365);
    }

    #[test]
    fn last_segment_contributes_only_trailing_days() {
        let periods = vec![
            period(0, "A", date(2018, 1, 1), date(2018, 12, 31), dec!(100)),
            period(1, "B", date(2019, 1, 1), date(2019, 1, 10), dec!(400)),
        ];
        let result = run(&periods, 20, None);
        assert_eq!(result.achieved_days, 20);
        assert_eq!(result.segments[0].employer_id, "B");
        assert_eq!(result.segments[0].days_used, 10);
        assert_eq!(result.segments[1].employer_id, "A");
        assert_eq!(result.segments[1].start, date(2018, 12, 22));
        assert_eq!(result.segments[1].days_used, 10);
        // (10 * 400 + 10 * 100) / 20
        assert_eq!(result.daily_average.to_string(), "250.00");
    }

    #[test]
    fn gaps_are_skipped_not_counted() {
        let periods = vec![
            period(0, "A", date(2010, 1, 1), date(2010, 1, 31), dec!(200)),
            period(1, "B", date(2015, 1, 1), date(2015, 1, 31), dec!(200)),
        ];
        let result = run(&periods, 62, None);
        assert_eq!(result.achieved_days, 62);
        assert!(result.complete);
        assert_eq!(result.window_start, Some(date(2010, 1, 1)));
        assert_eq!(result.window_end, Some(date(2015, 1, 31)));
    }

    #[test]
    fn insufficient_history_is_flagged_not_padded() {
        let periods = vec![period(0, "A", date(2020, 1, 1), date(2020, 3, 31), dec!(300))];
        let result = run(&periods, 1750, None);
        assert_eq!(result.achieved_days, 91);
        assert!(!result.complete);
        assert_eq!(result.daily_average.to_string(), "300.00");
        assert!(result.observations.iter().any(|o| o.starts_with("Partial calculation")));
    }

    #[test]
    fn overlapped_days_use_the_kept_salary_only() {
        let periods = vec![
            period(0, "A", date(2020, 1, 1), date(2020, 1, 31), dec!(400)),
            period(1, "B", date(2020, 1, 1), date(2020, 1, 31), dec!(250)),
        ];
        let result = run(&periods, 31, None);
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].employer_id, "A");
        assert_eq!(result.daily_average.to_string(), "400.00");
    }

    #[test]
    fn cap_table_limits_daily_salary_before_weighting() {
        let cap = SalaryCapTable {
            multiple_by_year: BTreeMap::from([(2000, dec!(25))]),
            base_by_year: BTreeMap::from([(2020, dec!(10))]),
        };
        let periods = vec![period(0, "A", date(2020, 1, 1), date(2020, 1, 10), dec!(300))];
        let result = run(&periods, 10, Some(&cap));
        assert!(result.cap_table_applied);
        assert!(result.segments[0].capped);
        assert_eq!(result.segments[0].reported_daily_salary, dec!(300));
        assert_eq!(result.daily_average.to_string(), "250.00");
    }

    #[test]
    fn missing_cap_table_is_recorded() {
        let periods = vec![period(0, "A", date(2020, 1, 1), date(2020, 1, 10), dec!(300))];
        let result = run(&periods, 10, None);
        assert!(!result.cap_table_applied);
        assert!(result.observations.iter().any(|o| o.contains("No salary cap table")));
    }

    #[test]
    fn days_after_the_anchor_are_ignored() {
        let periods = vec![period(0, "A", date(2020, 1, 1), date(2020, 12, 31), dec!(300))];
        let resolution = resolve_overlaps(&periods).unwrap();
        let result = average_salary_window(&SalaryWindowInput {
            periods: &periods,
            resolved: &resolution.resolved,
            target_days: 1750,
            anchor: date(2020, 1, 31),
            cap: None,
        });
        assert_eq!(result.achieved_days, 31);
        assert_eq!(result.window_end, Some(date(2020, 1, 31)));
    }

    #[test]
    fn ceiling_follows_the_calendar_year_of_each_day() {
        let cap = SalaryCapTable {
            multiple_by_year: BTreeMap::from([(2000, dec!(1))]),
            base_by_year: BTreeMap::from([(2019, dec!(100)), (2020, dec!(1000))]),
        };
        let periods = vec![period(0, "A", date(2019, 12, 22), date(2020, 12, 31), dec!(500))];
        let result = run(&periods, 376, Some(&cap));
        assert_eq!(result.achieved_days, 376);
        assert_eq!(result.segments.len(), 2);

        let recent = &result.segments[0];
        assert_eq!((recent.start, recent.end), (date(2020, 1, 1), date(2020, 12, 31)));
        assert_eq!(recent.days_used, 366);
        assert_eq!(recent.daily_salary, dec!(500));
        assert!(!recent.capped);

        let earlier = &result.segments[1];
        assert_eq!((earlier.start, earlier.end), (date(2019, 12, 22), date(2019, 12, 31)));
        assert_eq!(earlier.days_used, 10);
        assert_eq!(earlier.daily_salary, dec!(100));
        assert!(earlier.capped);

        // (10 * 100 + 366 * 500) / 376
        assert_eq!(result.daily_average.to_string(), "489.36");
        assert_eq!(result.window_start, Some(date(2019, 12, 22)));
        assert!(result.observations.iter().any(|o| o.contains("10 days of 2019")));
    }

    #[test]
    fn ranges_split_at_january_first() {
        assert_eq!(
            split_by_year(date(2018, 11, 1), date(2020, 2, 10)),
            vec![
                (date(2020, 1, 1), date(2020, 2, 10)),
                (date(2019, 1, 1), date(2019, 12, 31)),
                (date(2018, 11, 1), date(2018, 12, 31)),
            ]
        );
        assert_eq!(
            split_by_year(date(2020, 1, 1), date(2020, 1, 1)),
            vec![(date(2020, 1, 1), date(2020, 1, 1))]
        );
    }
}
