//! Pension analysis engine.
//!
//! The `engine` module turns an [`AnalysisInput`] into an
//! [`AnalysisReport`] by running the stages in a fixed order:
//!
//! ```text
//! normalize -> overlaps -> weeks -> conservation -> salary window -> validation
//! ```
//!
//! Each stage receives only the outputs of the stages before it.  A run
//! is a pure function of its input, the rule tables and the options; it
//! reads no clock and shares no state, so [`analyze_batch`] uses the
//! [`rayon`] crate to run independent workers across CPU cores.

use crate::conservation::{evaluate_conservation, ConservationInput};
use crate::error::{AnalysisError, Result, Stage};
use crate::models::{AnalysisInput, AnalysisReport, DiscountSummary, WeeksSummary};
use crate::normalize::normalize_periods;
use crate::overlap::resolve_overlaps;
use crate::rules::RuleSource;
use crate::salary::{average_salary_window, SalaryWindowInput};
use crate::validator::{validate, ValidationInput};
use crate::weeks::account_weeks;
use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::info;

/// Reconciliation tolerance used when the caller does not set one.
pub const DEFAULT_TOLERANCE_WEEKS: u32 = 1;

/// Per-run settings.  The reference date is always explicit so that a
/// run never depends on the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    pub reference_date: NaiveDate,
    pub tolerance_weeks: u32,
    /// Overrides the regime table's salary-window size.
    pub target_days: Option<i64>,
}

impl AnalysisOptions {
    pub fn new(reference_date: NaiveDate) -> Self {
        Self {
            reference_date,
            tolerance_weeks: DEFAULT_TOLERANCE_WEEKS,
            target_days: None,
        }
    }
}

/// Analyze one worker.
///
/// Fails only on structural defects in the input or missing rule
/// tables; every degraded condition is reported inside the returned
/// report.
#[tracing::instrument(skip_all, fields(regime = %input.worker.regime, periods = input.periods.len()))]
pub fn analyze(input: &AnalysisInput, rules: &dyn RuleSource, options: &AnalysisOptions) -> Result<AnalysisReport> {
    let worker = &input.worker;
    if worker.nss.trim().is_empty() {
        return Err(AnalysisError::MissingField {
            stage: Stage::Normalizer,
            field: "worker.nss",
        });
    }
    if worker.name.trim().is_empty() {
        return Err(AnalysisError::MissingField {
            stage: Stage::Normalizer,
            field: "worker.name",
        });
    }
    let regime_rules = rules.rules_for(worker.regime, options.reference_date)?;

    let normalized = normalize_periods(&input.periods, worker.issue_date)?;
    let periods = normalized.periods;
    let resolution = resolve_overlaps(&periods)?;
    let weeks = account_weeks(&periods, &resolution, &input.official, options.tolerance_weeks);

    let hypothetical = periods.iter().any(|p| p.ongoing);
    let last_contribution = if hypothetical {
        Some(worker.issue_date)
    } else {
        periods.iter().map(|p| p.end).max()
    };
    let conservation = evaluate_conservation(
        &ConservationInput {
            net_weeks: weeks.net_weeks,
            regime: worker.regime,
            last_contribution,
            reference_date: options.reference_date,
            hypothetical,
        },
        regime_rules,
    )?;

    let salary_window = average_salary_window(&SalaryWindowInput {
        periods: &periods,
        resolved: &resolution.resolved,
        target_days: options.target_days.unwrap_or(regime_rules.salary_window.target_days),
        anchor: options.reference_date,
        cap: regime_rules.salary_cap.as_ref(),
    });

    let mut prior = normalized.observations;
    prior.extend(resolution.observations);
    prior.extend(weeks.observations.iter().cloned());
    let validation = validate(ValidationInput {
        worker,
        periods: &periods,
        rules: regime_rules,
        weeks_precision: weeks.precision,
        conservation: &conservation,
        salary: &salary_window,
        prior,
    });

    let report = AnalysisReport {
        worker: worker.clone(),
        reference_date: options.reference_date,
        weeks_summary: WeeksSummary {
            utilized_weeks: weeks.net_weeks,
            officially_reported_weeks: weeks.officially_reported_weeks,
            official_total_weeks: weeks.official_total_weeks,
            difference: weeks.difference,
            precision: weeks.precision,
        },
        discounted_weeks: DiscountSummary {
            cotizadas: weeks.computed_weeks,
            descontadas: weeks.discounted_weeks,
            discount_carry_days: weeks.carry_days,
            reintegradas: weeks.reintegrated_weeks,
            total: weeks.net_weeks,
            discount_percentage: weeks.discount_percentage,
            observations: weeks.observations.into_iter().map(|o| o.message).collect(),
        },
        periods,
        overlap_groups: resolution.groups,
        ledger: weeks.ledger,
        conservation,
        salary_window,
        precision: validation.precision,
        observations: validation.observations,
    };
    info!(
        net_weeks = report.weeks_summary.utilized_weeks,
        vigente = report.conservation.vigente,
        precision = ?report.precision,
        "analysis complete"
    );
    Ok(report)
}

/// Analyze many workers in parallel.  Results keep the input order and
/// one failing run does not affect the others.
pub fn analyze_batch(
    inputs: &[AnalysisInput],
    rules: &dyn RuleSource,
    options: &AnalysisOptions,
) -> Vec<Result<AnalysisReport>> {
    inputs
        .par_iter()
        .map(|input| analyze(input, rules, options))
        .collect()
}
