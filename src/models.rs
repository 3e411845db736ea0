//! Data models for the Pension Engine.
//!
//! The `models` module defines the serialisable structs and enums that
//! form the engine's input and output contracts: the worker's identity
//! and regime facts, the employment periods extracted from the
//! certificate, and the blocks of the [`AnalysisReport`] returned to
//! callers.  Dates are civil dates ([`NaiveDate`]); money and ratios
//! are fixed-point [`Decimal`]s.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The legal framework governing a worker's eligibility formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Regime {
    /// Workers first registered before the 1997 regime change.
    #[serde(rename = "ley73")]
    Ley73,
    /// Workers first registered on or after the 1997 regime change.
    #[serde(rename = "ley97")]
    Ley97,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Ley73 => f.write_str("Ley 73"),
            Regime::Ley97 => f.write_str("Ley 97"),
        }
    }
}

/// Identity and regime facts for the insured worker.  Immutable for
/// the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    /// National insurance number (NSS), 11 digits.
    pub nss: String,
    /// National ID (CURP), 18 characters.
    #[serde(default)]
    pub curp: String,
    /// Full name as printed on the certificate.
    pub name: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    /// Date the contribution certificate was issued.
    pub issue_date: NaiveDate,
    pub regime: Regime,
    #[serde(default)]
    pub first_registration: Option<NaiveDate>,
    /// Years contributed before the regime-change cutoff, when the
    /// certificate reports them.  Cross-checked against `regime`.
    #[serde(default)]
    pub years_before_cutoff: Option<Decimal>,
}

/// One employer-reported contribution interval as delivered by the
/// document parser.  A missing `end` means the employment is still
/// ongoing at the certificate issue date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRecord {
    pub employer_name: String,
    /// Employer registration id (registro patronal).
    pub employer_id: String,
    pub start: NaiveDate,
    #[serde(default)]
    pub end: Option<NaiveDate>,
    pub reported_weeks: u32,
    /// Daily integrated salary.
    pub daily_salary: Decimal,
    /// Weeks this record restores from a prior discount.  Non-zero only
    /// on correction records.
    #[serde(default)]
    pub reinstated_weeks: u32,
}

/// A canonical, validated employment period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmploymentPeriod {
    /// Position of the period in the start-ordered sequence.
    pub id: usize,
    pub employer_name: String,
    pub employer_id: String,
    pub start: NaiveDate,
    /// Inclusive end date.
    pub end: NaiveDate,
    pub reported_weeks: u32,
    pub daily_salary: Decimal,
    /// The employment was open at issue time and has been closed at the
    /// certificate issue date.
    pub ongoing: bool,
    pub reinstated_weeks: u32,
}

impl EmploymentPeriod {
    pub fn span(&self) -> DaySpan {
        DaySpan {
            start: self.start,
            end: self.end,
        }
    }
}

/// An inclusive range of civil days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DaySpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DaySpan {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Number of calendar days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// The shared days of two spans, if any.  Spans that merely touch
    /// (one ends the day before the other starts) do not intersect.
    pub fn intersect(&self, other: &DaySpan) -> Option<DaySpan> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(DaySpan { start, end })
    }
}

/// Week totals printed in the certificate's own summary, independent of
/// the period-level recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficialWeeks {
    /// Gross "semanas cotizadas" before certificate-level adjustments.
    #[serde(default)]
    pub contributed: Option<u32>,
    /// "Total de semanas cotizadas".
    pub total: u32,
}

/// Everything the engine needs for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInput {
    pub worker: Worker,
    pub periods: Vec<PeriodRecord>,
    pub official: OfficialWeeks,
}

/// Confidence of the computed figures relative to the certificate.
/// Variants are ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Exact,
    WithinTolerance,
    Divergent,
}

impl Precision {
    /// The worse of two classifications.
    pub fn worst(self, other: Precision) -> Precision {
        self.max(other)
    }
}

/// Where an observation came from, so callers can filter or suppress
/// categories when displaying them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationSource {
    Normalizer,
    Empalme,
    Reconciliation,
    Conservation,
    SalaryWindow,
    Identity,
    CrossCheck,
}

/// A human-readable note about the run.  Observations carry no
/// severity; degraded conditions are expressed through precision and
/// completeness flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub source: ObservationSource,
    pub message: String,
}

impl Observation {
    pub fn new(source: ObservationSource, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
        }
    }
}

/// A maximal set of periods from different employers whose date ranges
/// intersect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapGroup {
    pub period_ids: Vec<usize>,
    /// Union of the member periods' spans.
    pub union: DaySpan,
    pub union_days: i64,
    /// Whole 7-day weeks in the union span.
    pub calendar_weeks: i64,
    /// Days left to the group's members after resolution.
    pub resolved_days: i64,
    pub resolved_weeks: i64,
}

/// Why a ledger entry exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerReason {
    /// Days shared with a period that was kept whole.
    Overlap {
        kept_period: usize,
        kept_employer: String,
    },
    /// Weeks restored by a correcting period.
    Reintegration,
}

/// One discount or reintegration action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountLedgerEntry {
    pub period_id: usize,
    pub employer_id: String,
    /// Days affected.  Zero for reintegration entries, which are
    /// reported in weeks.
    pub days: i64,
    pub weeks: u32,
    /// Days that do not complete a whole week.
    pub carry_days: u32,
    pub reason: LedgerReason,
}

/// Whether accumulated rights are still valid at the reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RightsStatus {
    Vigente,
    NoVigente,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConservationResult {
    pub regime: Regime,
    pub rules_version: String,
    pub status: RightsStatus,
    pub recognized_weeks: u32,
    /// `recognized_weeks / 52`.
    pub years_contributed: Decimal,
    pub conserved_weeks: u32,
    /// `conserved_weeks / 52`; the same quantity the expiry date is
    /// derived from.
    pub conserved_years: Decimal,
    /// `conserved_weeks * 7`, added to the last contribution date.
    pub conserved_days: i64,
    pub last_contribution: NaiveDate,
    pub expiry_date: NaiveDate,
    pub vigente: bool,
    pub puede_reactivar: bool,
    pub reactivation_required_weeks: Option<u32>,
    /// The worker is still employed; the last contribution date is the
    /// certificate issue date and the expiry is an estimate.
    pub hypothetical: bool,
    pub days_remaining: Option<i64>,
    pub days_elapsed: Option<i64>,
    pub notices: Vec<String>,
}

/// A sub-slice of an employment period consumed by the salary window.
/// Never spans more than one calendar year, since salary ceilings are
/// yearly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalarySegment {
    pub period_id: usize,
    pub employer_name: String,
    pub employer_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days_used: i64,
    pub reported_daily_salary: Decimal,
    /// Daily salary after the ceiling, as weighted in the average.
    pub daily_salary: Decimal,
    pub capped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryWindowResult {
    pub target_days: i64,
    pub achieved_days: i64,
    pub daily_average: Decimal,
    pub monthly_average: Decimal,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    /// The target day count was fully covered by available history.
    pub complete: bool,
    pub cap_table_applied: bool,
    /// Segments in the order they were consumed (most recent first).
    pub segments: Vec<SalarySegment>,
    pub observations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeksSummary {
    /// Net weeks used by downstream calculations.
    pub utilized_weeks: u32,
    pub officially_reported_weeks: u32,
    pub official_total_weeks: u32,
    /// `utilized_weeks - official_total_weeks`.
    pub difference: i64,
    pub precision: Precision,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountSummary {
    pub cotizadas: u32,
    pub descontadas: u32,
    pub discount_carry_days: u32,
    pub reintegradas: u32,
    pub total: u32,
    /// Percentage points, two decimals, half-even.
    pub discount_percentage: Decimal,
    pub observations: Vec<String>,
}

/// The unit returned to callers.  Built fresh for every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub worker: Worker,
    pub reference_date: NaiveDate,
    pub periods: Vec<EmploymentPeriod>,
    pub overlap_groups: Vec<OverlapGroup>,
    pub ledger: Vec<DiscountLedgerEntry>,
    pub weeks_summary: WeeksSummary,
    pub discounted_weeks: DiscountSummary,
    pub conservation: ConservationResult,
    pub salary_window: SalaryWindowResult,
    pub precision: Precision,
    pub observations: Vec<Observation>,
}

impl AnalysisReport {
    /// Observations with the overlap ("empalme") notes left out, for
    /// displays that summarise overlaps elsewhere.
    pub fn observations_without_empalme(&self) -> impl Iterator<Item = &Observation> {
        self.observations
            .iter()
            .filter(|o| o.source != ObservationSource::Empalme)
    }
}

/// Round a monetary or ratio value to two decimals, half-even, keeping
/// a fixed scale of two so the serialised form is stable.
pub fn round2(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    rounded.rescale(2);
    rounded
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn span_days_are_inclusive() {
        assert_eq!(DaySpan::new(d(2020, 1, 1), d(2020, 1, 1)).days(), 1);
        assert_eq!(DaySpan::new(d(2020, 1, 1), d(2020, 12, 31)).days(), 366);
    }

    #[test]
    fn touching_spans_do_not_intersect() {
        let a = DaySpan::new(d(2020, 1, 1), d(2020, 1, 31));
        let b = DaySpan::new(d(2020, 2, 1), d(2020, 2, 29));
        assert_eq!(a.intersect(&b), None);
        let c = DaySpan::new(d(2020, 1, 31), d(2020, 2, 5));
        assert_eq!(a.intersect(&c), Some(DaySpan::new(d(2020, 1, 31), d(2020, 1, 31))));
    }

    #[test]
    fn round2_is_half_even_with_fixed_scale() {
        assert_eq!(round2(dec!(2.345)).to_string(), "2.34");
        assert_eq!(round2(dec!(2.355)).to_string(), "2.36");
        assert_eq!(round2(dec!(9120)).to_string(), "9120.00");
    }

    #[test]
    fn precision_worst_picks_lower_confidence() {
        assert_eq!(Precision::Exact.worst(Precision::Divergent), Precision::Divergent);
        assert_eq!(Precision::WithinTolerance.worst(Precision::Exact), Precision::WithinTolerance);
    }

    #[test]
    fn regime_tags_use_short_names() {
        let json = serde_json::to_string(&Regime::Ley73).unwrap();
        assert_eq!(json, "\"ley73\"");
        assert_eq!(Regime::Ley97.to_string(), "Ley 97");
    }
}
