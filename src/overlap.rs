//! Overlap ("empalme") resolution.
//!
//! When two employers report the same days for one worker those days
//! must count once.  The resolver sweeps the start-ordered periods,
//! groups the ones whose ranges intersect, and splits each group into
//! elementary day ranges with a constant set of active periods.  On
//! every range shared by more than one period, the period with the
//! highest daily salary keeps the days and the others are discounted;
//! on equal salaries the period that started later gives way.

use crate::error::{AnalysisError, Result, Stage};
use crate::models::{
    DaySpan, DiscountLedgerEntry, EmploymentPeriod, LedgerReason, Observation, ObservationSource,
    OverlapGroup,
};
use chrono::{Duration, NaiveDate};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// A period's days after overlap resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPeriod {
    pub period_id: usize,
    /// Disjoint spans in date order.  Empty when every day of the
    /// period was absorbed by another employer.
    pub spans: Vec<DaySpan>,
    pub discounted_days: i64,
}

impl ResolvedPeriod {
    pub fn days(&self) -> i64 {
        self.spans.iter().map(DaySpan::days).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlapResolution {
    pub groups: Vec<OverlapGroup>,
    pub ledger: Vec<DiscountLedgerEntry>,
    /// One entry per input period, in input order.
    pub resolved: Vec<ResolvedPeriod>,
    pub observations: Vec<Observation>,
}

/// Resolve overlaps between periods of different employers.
///
/// `periods` must be ordered by start date and no employer may report
/// two intersecting periods; either defect is reported as an error.
pub fn resolve_overlaps(periods: &[EmploymentPeriod]) -> Result<OverlapResolution> {
    check_input(periods)?;

    let mut discounted: Vec<Vec<DaySpan>> = vec![Vec::new(); periods.len()];
    // (discounted position, kept position) -> days
    let mut shared_days: BTreeMap<(usize, usize), i64> = BTreeMap::new();
    let mut groups = Vec::new();

    for members in group_positions(periods) {
        if members.len() < 2 {
            continue;
        }
        resolve_group(periods, &members, &mut discounted, &mut shared_days);
        let union = DaySpan::new(
            members.iter().map(|&p| periods[p].start).min().unwrap_or(periods[members[0]].start),
            members.iter().map(|&p| periods[p].end).max().unwrap_or(periods[members[0]].end),
        );
        let member_days: i64 = members.iter().map(|&p| periods[p].span().days()).sum();
        let discounted_days: i64 = members
            .iter()
            .map(|&p| discounted[p].iter().map(DaySpan::days).sum::<i64>())
            .sum();
        let resolved_days = member_days - discounted_days;
        groups.push(OverlapGroup {
            period_ids: members.iter().map(|&p| periods[p].id).collect(),
            union,
            union_days: union.days(),
            calendar_weeks: union.days() / 7,
            resolved_days,
            resolved_weeks: resolved_days / 7,
        });
    }

    let mut ledger = Vec::with_capacity(shared_days.len());
    let mut observations = Vec::with_capacity(shared_days.len());
    for ((lost, kept), days) in shared_days {
        let (lost, kept) = (&periods[lost], &periods[kept]);
        let weeks = (days / 7) as u32;
        let carry_days = (days % 7) as u32;
        observations.push(Observation::new(
            ObservationSource::Empalme,
            format!(
                "Empalme: {} overlaps {} for {} days; {} weeks discounted from {} ({} days carried)",
                lost.employer_name, kept.employer_name, days, weeks, lost.employer_name, carry_days
            ),
        ));
        ledger.push(DiscountLedgerEntry {
            period_id: lost.id,
            employer_id: lost.employer_id.clone(),
            days,
            weeks,
            carry_days,
            reason: LedgerReason::Overlap {
                kept_period: kept.id,
                kept_employer: kept.employer_id.clone(),
            },
        });
    }

    let resolved = periods
        .iter()
        .zip(discounted)
        .map(|(period, holes)| {
            let holes = merge_spans(holes);
            ResolvedPeriod {
                period_id: period.id,
                discounted_days: holes.iter().map(DaySpan::days).sum(),
                spans: subtract_spans(period.span(), &holes),
            }
        })
        .collect();

    debug!(groups = groups.len(), entries = ledger.len(), "overlaps resolved");
    Ok(OverlapResolution {
        groups,
        ledger,
        resolved,
        observations,
    })
}

fn check_input(periods: &[EmploymentPeriod]) -> Result<()> {
    // employer id -> position of its latest period
    let mut last_by_employer: HashMap<&str, usize> = HashMap::new();
    for (pos, period) in periods.iter().enumerate() {
        if period.end < period.start {
            return Err(AnalysisError::InvalidPeriod {
                stage: Stage::OverlapResolver,
                index: period.id,
                reason: format!("end {} precedes start {}", period.end, period.start),
            });
        }
        if pos > 0 && period.start < periods[pos - 1].start {
            return Err(AnalysisError::UnorderedPeriods {
                stage: Stage::OverlapResolver,
                index: period.id,
                previous: periods[pos - 1].id,
            });
        }
        if let Some(&prev) = last_by_employer.get(period.employer_id.as_str()) {
            if periods[prev].end >= period.start {
                return Err(AnalysisError::SameEmployerOverlap {
                    stage: Stage::OverlapResolver,
                    employer_id: period.employer_id.clone(),
                    first: periods[prev].id,
                    second: period.id,
                });
            }
        }
        last_by_employer.insert(period.employer_id.as_str(), pos);
    }
    Ok(())
}

/// Split start-ordered periods into maximal runs whose union is
/// connected by shared days.
fn group_positions(periods: &[EmploymentPeriod]) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut group_end: Option<NaiveDate> = None;
    for (pos, period) in periods.iter().enumerate() {
        match group_end {
            Some(end) if period.start <= end => {
                if let Some(current) = groups.last_mut() {
                    current.push(pos);
                }
                group_end = Some(end.max(period.end));
            }
            _ => {
                groups.push(vec![pos]);
                group_end = Some(period.end);
            }
        }
    }
    groups
}

fn resolve_group(
    periods: &[EmploymentPeriod],
    members: &[usize],
    discounted: &mut [Vec<DaySpan>],
    shared_days: &mut BTreeMap<(usize, usize), i64>,
) {
    let day = Duration::days(1);
    let points: BTreeSet<NaiveDate> = members
        .iter()
        .flat_map(|&p| [periods[p].start, periods[p].end + day])
        .collect();
    let points: Vec<NaiveDate> = points.into_iter().collect();

    for window in points.windows(2) {
        let segment = DaySpan::new(window[0], window[1] - day);
        let active: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&p| periods[p].start <= segment.start && periods[p].end >= segment.start)
            .collect();
        if active.len() < 2 {
            continue;
        }
        let Some(&kept) = active.iter().max_by_key(|&&p| {
            let period = &periods[p];
            (period.daily_salary, Reverse(period.start), Reverse(p))
        }) else {
            continue;
        };
        for &lost in active.iter().filter(|&&p| p != kept) {
            discounted[lost].push(segment);
            *shared_days.entry((lost, kept)).or_insert(0) += segment.days();
        }
    }
}

/// Sort spans and join the ones that touch or intersect.
fn merge_spans(mut spans: Vec<DaySpan>) -> Vec<DaySpan> {
    spans.sort();
    let mut merged: Vec<DaySpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end + Duration::days(1) => {
                last.end = last.end.max(span.end);
            }
            _ => merged.push(span),
        }
    }
    merged
}

/// Days of `span` not covered by the sorted, disjoint `holes`.
fn subtract_spans(span: DaySpan, holes: &[DaySpan]) -> Vec<DaySpan> {
    let day = Duration::days(1);
    let mut remaining = Vec::new();
    let mut cursor = span.start;
    for hole in holes {
        if hole.start > cursor {
            remaining.push(DaySpan::new(cursor, (hole.start - day).min(span.end)));
        }
        cursor = cursor.max(hole.end + day);
        if cursor > span.end {
            return remaining;
        }
    }
    if cursor <= span.end {
        remaining.push(DaySpan::new(cursor, span.end));
    }
    remaining
}
