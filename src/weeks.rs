//! Weeks accounting.
//!
//! Aggregates the reported weeks of every period, applies the overlap
//! discount ledger, adds reinstated weeks and reconciles the result
//! with the certificate's own total.  A divergence is never an error;
//! it lowers the precision classification and is explained in the
//! observations.

use crate::models::{
    round2, DiscountLedgerEntry, EmploymentPeriod, LedgerReason, Observation, ObservationSource,
    OfficialWeeks, Precision,
};
use crate::overlap::OverlapResolution;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

/// Discount percentages above this are flagged for review.
const HIGH_DISCOUNT_PERCENTAGE: Decimal = dec!(15);

#[derive(Debug, Clone, PartialEq)]
pub struct WeeksAccount {
    /// Sum of the weeks reported per period, before any discount.
    pub computed_weeks: u32,
    pub discounted_weeks: u32,
    /// Sum of the ledger entries' leftover days.  Never converted into
    /// weeks, since no single overlap accounts for them.
    pub carry_days: u32,
    pub reintegrated_weeks: u32,
    pub net_weeks: u32,
    pub discount_percentage: Decimal,
    pub officially_reported_weeks: u32,
    pub official_total_weeks: u32,
    pub difference: i64,
    pub precision: Precision,
    /// Overlap entries followed by reintegration entries.
    pub ledger: Vec<DiscountLedgerEntry>,
    pub observations: Vec<Observation>,
}

pub fn account_weeks(
    periods: &[EmploymentPeriod],
    resolution: &OverlapResolution,
    official: &OfficialWeeks,
    tolerance_weeks: u32,
) -> WeeksAccount {
    let computed_weeks = periods
        .iter()
        .fold(0u32, |total, p| total.saturating_add(p.reported_weeks));

    // Totals are sums over the ledger entries; carries are never pooled
    // into extra weeks.
    let (discounted_weeks, carry_days) = resolution
        .ledger
        .iter()
        .filter(|e| matches!(e.reason, LedgerReason::Overlap { .. }))
        .fold((0u32, 0u32), |(weeks, carry), e| {
            (weeks.saturating_add(e.weeks), carry.saturating_add(e.carry_days))
        });

    let mut ledger = resolution.ledger.clone();
    let mut observations = Vec::new();
    let mut reinstated: u32 = 0;
    for period in periods.iter().filter(|p| p.reinstated_weeks > 0) {
        reinstated = reinstated.saturating_add(period.reinstated_weeks);
        ledger.push(DiscountLedgerEntry {
            period_id: period.id,
            employer_id: period.employer_id.clone(),
            days: 0,
            weeks: period.reinstated_weeks,
            carry_days: 0,
            reason: LedgerReason::Reintegration,
        });
    }
    let reintegrated_weeks = reinstated.min(discounted_weeks);
    if reinstated > reintegrated_weeks {
        observations.push(format!(
            "Correction records reinstate {} weeks but only {} were discounted; reintegration capped",
            reinstated, discounted_weeks
        ));
    }

    let net_weeks = computed_weeks
        .saturating_sub(discounted_weeks)
        .saturating_add(reintegrated_weeks);
    let discount_percentage = if computed_weeks == 0 {
        round2(Decimal::ZERO)
    } else {
        round2(Decimal::from(discounted_weeks) * dec!(100) / Decimal::from(computed_weeks))
    };

    let overlap_count = resolution.groups.len();
    if overlap_count > 0 {
        observations.push(format!(
            "Corrected {} overlapping employment groups, discounting {} weeks ({} days carried)",
            overlap_count, discounted_weeks, carry_days
        ));
    }
    if discounted_weeks > 0 {
        observations.push(format!(
            "{} weeks discounted ({}% of {} computed weeks)",
            discounted_weeks, discount_percentage, computed_weeks
        ));
        if discount_percentage > HIGH_DISCOUNT_PERCENTAGE {
            observations.push("High discount percentage; review the discounted periods".to_string());
        }
    }
    if reintegrated_weeks > 0 {
        observations.push(format!("{} weeks reinstated to the recognized total", reintegrated_weeks));
    }
    observations.push(format!("Total recognized: {} weeks", net_weeks));

    let official_total_weeks = official.total;
    let difference = i64::from(net_weeks) - i64::from(official_total_weeks);
    let precision = classify(difference, tolerance_weeks);
    match precision {
        Precision::Exact => observations.push("Exact match with the certificate total".to_string()),
        _ => observations.push(format!(
            "Computed {} weeks vs certificate total {} (difference {:+}, tolerance {})",
            net_weeks, official_total_weeks, difference, tolerance_weeks
        )),
    }
    if precision == Precision::Divergent {
        warn!(net_weeks, official_total_weeks, difference, "computed weeks diverge from certificate");
    }
    debug!(computed_weeks, discounted_weeks, reintegrated_weeks, net_weeks, "weeks accounted");

    WeeksAccount {
        computed_weeks,
        discounted_weeks,
        carry_days,
        reintegrated_weeks,
        net_weeks,
        discount_percentage,
        officially_reported_weeks: official.contributed.unwrap_or(official_total_weeks),
        official_total_weeks,
        difference,
        precision,
        ledger,
        observations: observations
            .into_iter()
            .map(|m| Observation::new(ObservationSource::Reconciliation, m))
            .collect(),
    }
}

fn classify(difference: i64, tolerance_weeks: u32) -> Precision {
    match difference.unsigned_abs() {
        0 => Precision::Exact,
        d if d <= u64::from(tolerance_weeks) => Precision::WithinTolerance,
        _ => Precision::Divergent,
    }
}
