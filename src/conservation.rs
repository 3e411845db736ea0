//! Conservation of rights.
//!
//! Accrued weeks stay valid for a grace period after the last
//! contribution.  The length of that period comes from the regime's
//! rule table; this module only applies it:
//!
//! ```text
//! conserved_weeks = clamp(floor(recognized_weeks / divisor), min, max)
//! expiry          = last_contribution + conserved_weeks * 7 days
//! vigente         = reference_date <= expiry
//! ```
//!
//! When rights have lapsed the reactivation tiers decide whether, and
//! with how many new weeks, they can be recovered.

use crate::error::{AnalysisError, Result};
use crate::models::{ConservationResult, Regime, RightsStatus};
use crate::rules::RegimeRules;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use tracing::debug;

const WEEKS_PER_YEAR: u32 = 52;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConservationInput {
    pub net_weeks: u32,
    pub regime: Regime,
    pub last_contribution: Option<NaiveDate>,
    pub reference_date: NaiveDate,
    /// The worker still has an open employment; `last_contribution` is
    /// the certificate issue date.
    pub hypothetical: bool,
}

pub fn evaluate_conservation(input: &ConservationInput, rules: &RegimeRules) -> Result<ConservationResult> {
    let last_contribution = input
        .last_contribution
        .ok_or(AnalysisError::MissingLastContribution)?;

    let conserved_weeks = rules.conservation.conserved_weeks(input.net_weeks);
    let conserved_days = i64::from(conserved_weeks) * 7;
    let expiry_date = last_contribution + Duration::days(conserved_days);

    let vigente = input.reference_date <= expiry_date;
    let status = if vigente {
        RightsStatus::Vigente
    } else {
        RightsStatus::NoVigente
    };

    let mut notices = rules.notices.clone();
    if input.hypothetical {
        notices.push("Estimated calculation: the worker still has an open employment".to_string());
        notices.push(format!(
            "The expiry date assumes the employment ends on the certificate issue date {}",
            last_contribution
        ));
        notices.push("Recalculate once the employment is terminated".to_string());
    }

    let (puede_reactivar, reactivation_required_weeks) = match status {
        RightsStatus::Vigente => (false, None),
        RightsStatus::NoVigente => {
            let gap_days = (input.reference_date - last_contribution).num_days();
            let tier = rules
                .reactivation
                .iter()
                .find(|t| t.max_gap_days.map_or(true, |max| gap_days <= max));
            match tier {
                Some(tier) if tier.required_weeks == 0 => {
                    notices.push("Accrued weeks are recognized again upon re-registration".to_string());
                    (true, Some(0))
                }
                Some(tier) => {
                    notices.push(format!(
                        "Accrued weeks are recognized again after {} new contribution weeks",
                        tier.required_weeks
                    ));
                    (true, Some(tier.required_weeks))
                }
                None => {
                    notices.push(format!(
                        "No reactivation rule covers a gap of {} days under {} {}",
                        gap_days, rules.regime, rules.version
                    ));
                    (false, None)
                }
            }
        }
    };

    let days_to_expiry = (expiry_date - input.reference_date).num_days();
    debug!(
        regime = %input.regime,
        conserved_weeks,
        %expiry_date,
        vigente,
        puede_reactivar,
        "conservation evaluated"
    );

    Ok(ConservationResult {
        regime: input.regime,
        rules_version: rules.version.clone(),
        status,
        recognized_weeks: input.net_weeks,
        years_contributed: Decimal::from(input.net_weeks) / Decimal::from(WEEKS_PER_YEAR),
        conserved_weeks,
        conserved_years: Decimal::from(conserved_weeks) / Decimal::from(WEEKS_PER_YEAR),
        conserved_days,
        last_contribution,
        expiry_date,
        vigente,
        puede_reactivar,
        reactivation_required_weeks,
        hypothetical: input.hypothetical,
        days_remaining: vigente.then_some(days_to_expiry),
        days_elapsed: (!vigente).then_some(-days_to_expiry),
        notices,
    })
}
