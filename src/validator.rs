//! Quality and cross validation.
//!
//! Runs after every calculator has produced its figures.  Nothing found
//! here aborts a run: identity gaps and incoherent dates are appended as
//! observations and cap the overall precision at
//! [`Precision::WithinTolerance`].  The validator is also where the
//! observation streams of the earlier stages are merged into the single
//! source-labelled list carried by the report.

use crate::models::{
    ConservationResult, EmploymentPeriod, Observation, ObservationSource, Precision, Regime,
    SalaryWindowResult, Worker,
};
use crate::rules::RegimeRules;
use tracing::{debug, warn};

const NSS_DIGITS: usize = 11;
const CURP_LENGTH: usize = 18;

pub struct ValidationInput<'a> {
    pub worker: &'a Worker,
    pub periods: &'a [EmploymentPeriod],
    pub rules: &'a RegimeRules,
    /// Classification produced by the weeks reconciliation.
    pub weeks_precision: Precision,
    pub conservation: &'a ConservationResult,
    pub salary: &'a SalaryWindowResult,
    /// Observations already labelled by earlier stages, in pipeline order.
    pub prior: Vec<Observation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub precision: Precision,
    pub observations: Vec<Observation>,
}

pub fn validate(input: ValidationInput<'_>) -> Validation {
    let mut concerns = Vec::new();
    check_identity(input.worker, input.periods, &mut concerns);
    check_regime(input.worker, input.rules, &mut concerns);
    check_salary_window(input.salary, input.conservation, &mut concerns);

    let mut precision = input.weeks_precision;
    if !concerns.is_empty() {
        warn!(concerns = concerns.len(), "data quality concerns lower precision");
        precision = precision.worst(Precision::WithinTolerance);
    }

    let mut observations = input.prior;
    observations.push(conservation_summary(input.conservation));
    observations.extend(
        input
            .salary
            .observations
            .iter()
            .map(|m| Observation::new(ObservationSource::SalaryWindow, m.clone())),
    );
    observations.extend(concerns);
    debug!(?precision, observations = observations.len(), "validation finished");

    Validation {
        precision,
        observations,
    }
}

fn check_identity(worker: &Worker, periods: &[EmploymentPeriod], out: &mut Vec<Observation>) {
    let mut concern = |message: String| out.push(Observation::new(ObservationSource::Identity, message));

    let nss = worker.nss.trim();
    if nss.len() != NSS_DIGITS || !nss.chars().all(|c| c.is_ascii_digit()) {
        concern(format!("Insurance number {:?} is not {} digits", nss, NSS_DIGITS));
    }
    let curp = worker.curp.trim();
    if curp.is_empty() {
        concern("National ID (CURP) is missing".to_string());
    } else if curp.chars().count() != CURP_LENGTH || !curp.chars().all(|c| c.is_ascii_alphanumeric()) {
        concern(format!("National ID {:?} is not {} alphanumeric characters", curp, CURP_LENGTH));
    }
    if worker.name.trim().is_empty() {
        concern("Worker name is missing".to_string());
    }

    match (worker.birth_date, worker.first_registration) {
        (Some(birth), Some(registration)) if birth >= registration => concern(format!(
            "Birth date {} does not precede first registration {}",
            birth, registration
        )),
        (None, _) => concern("Birth date is missing".to_string()),
        _ => {}
    }

    let earliest = periods.iter().map(|p| p.start).min();
    let latest = periods.iter().map(|p| p.end).max();
    match (worker.first_registration, earliest) {
        (Some(registration), Some(earliest)) if registration > earliest => concern(format!(
            "First registration {} is after the earliest employment start {}",
            registration, earliest
        )),
        (None, _) => concern("First registration date is missing".to_string()),
        _ => {}
    }
    if let Some(latest) = latest {
        if worker.issue_date < latest {
            concern(format!(
                "Certificate issue date {} precedes the last employment end {}",
                worker.issue_date, latest
            ));
        }
    }
}

fn check_regime(worker: &Worker, rules: &RegimeRules, out: &mut Vec<Observation>) {
    if let Some(years) = worker.years_before_cutoff {
        let incoherent = match worker.regime {
            _ if years.is_sign_negative() && !years.is_zero() => true,
            Regime::Ley73 => years.is_zero(),
            Regime::Ley97 => !years.is_zero(),
        };
        if incoherent {
            out.push(Observation::new(
                ObservationSource::CrossCheck,
                format!(
                    "Certificate reports {} years before the regime cutoff, which does not fit {}",
                    years, worker.regime
                ),
            ));
        }
    }
    if let Some(registration) = worker.first_registration {
        if !rules.first_registration.contains(registration) {
            out.push(Observation::new(
                ObservationSource::CrossCheck,
                format!(
                    "First registration {} is outside the range covered by {}; check the applicable regime",
                    registration, worker.regime
                ),
            ));
        }
    }
}

fn check_salary_window(salary: &SalaryWindowResult, conservation: &ConservationResult, out: &mut Vec<Observation>) {
    if let Some(end) = salary.window_end {
        if end > conservation.last_contribution {
            out.push(Observation::new(
                ObservationSource::CrossCheck,
                format!(
                    "Salary window ends {} after the last contribution {}",
                    end, conservation.last_contribution
                ),
            ));
        }
    }
}

fn conservation_summary(result: &ConservationResult) -> Observation {
    let message = match (result.vigente, result.reactivation_required_weeks) {
        (true, _) => format!(
            "Rights valid until {} ({} weeks conserved)",
            result.expiry_date, result.conserved_weeks
        ),
        (false, Some(0)) => format!(
            "Rights expired on {}; re-registration restores them",
            result.expiry_date
        ),
        (false, Some(weeks)) => format!(
            "Rights expired on {}; {} new weeks restore them",
            result.expiry_date, weeks
        ),
        (false, None) => format!("Rights expired on {}", result.expiry_date),
    };
    Observation::new(ObservationSource::Conservation, message)
}
