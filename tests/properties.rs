use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeMap;
use pension_engine::conservation::{evaluate_conservation, ConservationInput};
use pension_engine::models::{AnalysisInput, OfficialWeeks, PeriodRecord, Regime, Worker};
use pension_engine::normalize::normalize_periods;
use pension_engine::overlap::resolve_overlaps;
use pension_engine::rules::SalaryCapTable;
use pension_engine::salary::{average_salary_window, SalaryWindowInput};
use pension_engine::weeks::account_weeks;
use pension_engine::{analyze, AnalysisOptions, RuleBook, RuleSource};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()
}

fn issue_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()
}

fn record(index: usize, start: NaiveDate, len_days: i64, cents: i64) -> PeriodRecord {
    PeriodRecord {
        employer_name: format!("EMPRESA {index}"),
        employer_id: format!("E{index:04}"),
        start,
        end: Some(start + Duration::days(len_days - 1)),
        reported_weeks: (len_days / 7) as u32,
        daily_salary: Decimal::new(cents, 2),
        reinstated_weeks: 0,
    }
}

/// Back-to-back or gapped periods, never sharing a day.
fn disjoint_records() -> impl Strategy<Value = Vec<PeriodRecord>> {
    prop::collection::vec((0i64..60, 1i64..400, 1i64..200_000), 1..12).prop_map(|ranges| {
        let mut next = base();
        ranges
            .into_iter()
            .enumerate()
            .map(|(i, (gap, len, cents))| {
                let start = next + Duration::days(gap);
                next = start + Duration::days(len);
                record(i, start, len, cents)
            })
            .collect()
    })
}

/// Periods at arbitrary offsets, one employer each, so they may overlap.
fn overlapping_records() -> impl Strategy<Value = Vec<PeriodRecord>> {
    prop::collection::vec((0i64..3000, 1i64..900, 1i64..200_000), 1..10).prop_map(|ranges| {
        ranges
            .into_iter()
            .enumerate()
            .map(|(i, (offset, len, cents))| record(i, base() + Duration::days(offset), len, cents))
            .collect()
    })
}

/// A ceiling that changes every year the generated histories can reach.
fn yearly_caps() -> impl Strategy<Value = SalaryCapTable> {
    prop::collection::vec(100i64..50_000, 13).prop_map(|bases| SalaryCapTable {
        multiple_by_year: BTreeMap::from([(2000, Decimal::ONE)]),
        base_by_year: bases
            .into_iter()
            .enumerate()
            .map(|(i, cents)| (2000 + i as i32, Decimal::new(cents, 2)))
            .collect(),
    })
}

fn input(periods: Vec<PeriodRecord>, official_total: u32) -> AnalysisInput {
    AnalysisInput {
        worker: Worker {
            nss: "12345678901".into(),
            curp: "PEGJ900101HDFRRN05".into(),
            name: "JUAN PEREZ GARCIA".into(),
            birth_date: Some(NaiveDate::from_ymd_opt(1975, 3, 2).unwrap()),
            issue_date: issue_date(),
            regime: Regime::Ley97,
            first_registration: Some(base()),
            years_before_cutoff: None,
        },
        periods,
        official: OfficialWeeks {
            contributed: None,
            total: official_total,
        },
    }
}

proptest! {
    #[test]
    fn disjoint_periods_have_no_discounts(records in disjoint_records()) {
        let normalized = normalize_periods(&records, issue_date()).unwrap();
        let resolution = resolve_overlaps(&normalized.periods).unwrap();
        prop_assert!(resolution.ledger.is_empty());
        prop_assert!(resolution.groups.is_empty());

        let reported: u32 = records.iter().map(|r| r.reported_weeks).sum();
        let official = OfficialWeeks { contributed: None, total: reported };
        let account = account_weeks(&normalized.periods, &resolution, &official, 1);
        prop_assert_eq!(account.computed_weeks, reported);
        prop_assert_eq!(account.net_weeks, reported);
        prop_assert_eq!(account.discounted_weeks, 0);
    }

    #[test]
    fn validity_is_monotonic_in_the_reference_date(
        net_weeks in 0u32..3000,
        last_offset in 0i64..9000,
        earlier in 0i64..6000,
        later in 0i64..6000,
    ) {
        let book = RuleBook::builtin().unwrap();
        let last = base() + Duration::days(last_offset);
        let (d1, d2) = (last + Duration::days(earlier.min(later)), last + Duration::days(earlier.max(later)));
        let rules = book.rules_for(Regime::Ley73, d2).unwrap();
        let at = |reference| {
            evaluate_conservation(
                &ConservationInput {
                    net_weeks,
                    regime: Regime::Ley73,
                    last_contribution: Some(last),
                    reference_date: reference,
                    hypothetical: false,
                },
                rules,
            )
            .unwrap()
        };
        if at(d2).vigente {
            prop_assert!(at(d1).vigente);
        }
    }

    #[test]
    fn salary_window_stays_within_target_and_history(
        records in overlapping_records(),
        target_days in 1i64..4000,
    ) {
        let normalized = normalize_periods(&records, issue_date()).unwrap();
        let resolution = resolve_overlaps(&normalized.periods).unwrap();
        let available: i64 = resolution.resolved.iter().map(|r| r.days()).sum();
        let result = average_salary_window(&SalaryWindowInput {
            periods: &normalized.periods,
            resolved: &resolution.resolved,
            target_days,
            anchor: issue_date(),
            cap: None,
        });
        prop_assert!(result.achieved_days <= target_days);
        prop_assert!(result.achieved_days <= available);
        if available < target_days {
            prop_assert!(!result.complete);
            prop_assert_eq!(result.achieved_days, available);
        } else {
            prop_assert!(result.complete);
        }
        let used: i64 = result.segments.iter().map(|s| s.days_used).sum();
        prop_assert_eq!(used, result.achieved_days);
    }

    #[test]
    fn full_pipeline_is_idempotent(records in overlapping_records(), official_total in 0u32..2000) {
        let book = RuleBook::builtin().unwrap();
        let options = AnalysisOptions::new(NaiveDate::from_ymd_opt(2031, 6, 1).unwrap());
        let input = input(records, official_total);
        let first = serde_json::to_vec(&analyze(&input, &book, &options).unwrap()).unwrap();
        let second = serde_json::to_vec(&analyze(&input, &book, &options).unwrap()).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn capped_average_never_exceeds_the_highest_ceiling(
        records in overlapping_records(),
        target_days in 1i64..4000,
        cap in yearly_caps(),
    ) {
        let normalized = normalize_periods(&records, issue_date()).unwrap();
        let resolution = resolve_overlaps(&normalized.periods).unwrap();
        let result = average_salary_window(&SalaryWindowInput {
            periods: &normalized.periods,
            resolved: &resolution.resolved,
            target_days,
            anchor: issue_date(),
            cap: Some(&cap),
        });
        for segment in &result.segments {
            prop_assert_eq!(segment.start.year(), segment.end.year());
            let ceiling = cap.cap_for_year(segment.start.year()).unwrap();
            prop_assert!(segment.daily_salary <= ceiling);
            prop_assert!(segment.daily_salary <= segment.reported_daily_salary);
        }
        let highest = cap.base_by_year.values().copied().max().unwrap();
        prop_assert!(result.daily_average <= highest);
    }
}
