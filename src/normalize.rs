//! Period normalization.
//!
//! Turns the parser's [`PeriodRecord`]s into canonical
//! [`EmploymentPeriod`]s: open employments are closed at the
//! certificate issue date, malformed records are rejected, and the
//! sequence is ordered by start date with stable ids.

use crate::error::{AnalysisError, Result, Stage};
use crate::models::{EmploymentPeriod, Observation, ObservationSource, PeriodRecord};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

#[derive(Debug)]
pub struct Normalized {
    pub periods: Vec<EmploymentPeriod>,
    pub observations: Vec<Observation>,
}

pub fn normalize_periods(records: &[PeriodRecord], issue_date: NaiveDate) -> Result<Normalized> {
    let mut observations = Vec::new();
    let mut periods = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let invalid = |reason: String| AnalysisError::InvalidPeriod {
            stage: Stage::Normalizer,
            index,
            reason,
        };
        if record.employer_id.trim().is_empty() {
            return Err(invalid("employer registration id is empty".into()));
        }
        if record.daily_salary < Decimal::ZERO {
            return Err(invalid(format!("negative daily salary {}", record.daily_salary)));
        }
        let (end, ongoing) = match record.end {
            Some(end) => (end, false),
            None => (issue_date, true),
        };
        if end < record.start {
            return Err(invalid(format!("end {} precedes start {}", end, record.start)));
        }
        if ongoing {
            observations.push(Observation::new(
                ObservationSource::Normalizer,
                format!(
                    "Ongoing employment with {} closed at the certificate issue date {}",
                    record.employer_name, issue_date
                ),
            ));
        }
        periods.push(EmploymentPeriod {
            id: 0,
            employer_name: record.employer_name.trim().to_string(),
            employer_id: record.employer_id.trim().to_string(),
            start: record.start,
            end,
            reported_weeks: record.reported_weeks,
            daily_salary: record.daily_salary,
            ongoing,
            reinstated_weeks: record.reinstated_weeks,
        });
    }

    periods.sort_by(|a, b| {
        (a.start, a.end, &a.employer_id).cmp(&(b.start, b.end, &b.employer_id))
    });
    for (id, period) in periods.iter_mut().enumerate() {
        period.id = id;
    }
    debug!(periods = periods.len(), "periods normalized");

    Ok(Normalized {
        periods,
        observations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::tests::date;
    use rust_decimal_macros::dec;

    fn record(employer: &str, start: NaiveDate, end: Option<NaiveDate>) -> PeriodRecord {
        PeriodRecord {
            employer_name: format!("{employer} SA DE CV"),
            employer_id: employer.to_string(),
            start,
            end,
            reported_weeks: 10,
            daily_salary: dec!(200),
            reinstated_weeks: 0,
        }
    }

    #[test]
    fn sorts_by_start_and_assigns_ids() {
        let records = vec![
            record("B", date(2015, 1, 1), Some(date(2015, 6, 30))),
            record("A", date(2010, 1, 1), Some(date(2010, 6, 30))),
        ];
        let normalized = normalize_periods(&records, date(2025, 1, 29)).unwrap();
        let ids: Vec<_> = normalized.periods.iter().map(|p| (p.id, p.employer_id.as_str())).collect();
        assert_eq!(ids, vec![(0, "A"), (1, "B")]);
        assert!(normalized.observations.is_empty());
    }

    #[test]
    fn open_period_is_closed_at_issue_date() {
        let records = vec![record("A", date(2020, 1, 1), None)];
        let normalized = normalize_periods(&records, date(2025, 1, 29)).unwrap();
        let period = &normalized.periods[0];
        assert!(period.ongoing);
        assert_eq!(period.end, date(2025, 1, 29));
        assert_eq!(normalized.observations.len(), 1);
    }

    #[test]
    fn reversed_dates_are_structural_errors() {
        let records = vec![record("A", date(2020, 1, 1), Some(date(2019, 1, 1)))];
        let err = normalize_periods(&records, date(2025, 1, 29)).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidPeriod { index: 0, .. }));
    }

    #[test]
    fn blank_employer_id_is_rejected() {
        let records = vec![record("  ", date(2020, 1, 1), Some(date(2020, 2, 1)))];
        assert!(normalize_periods(&records, date(2025, 1, 29)).is_err());
    }
}
