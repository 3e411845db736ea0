//! Regime rule tables.
//!
//! The `rules` module holds the policy side of the engine: the
//! jurisdiction-specific numbers (conservation divisor and bounds,
//! reactivation tiers, salary-window size, salary ceilings) that the
//! calculators consume.  Tables are versioned, stored externally as
//! JSON files, and looked up through the [`RuleSource`] trait so that a
//! run never depends on hard-coded legal fractions.

use crate::error::ConfigError;
use crate::models::Regime;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Rules for one regime, effective from a given date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeRules {
    pub regime: Regime,
    /// Version label, e.g. `"2025-01"`.
    pub version: String,
    pub effective_from: NaiveDate,
    /// First-registration dates this regime applies to.
    #[serde(default)]
    pub first_registration: RegistrationRange,
    pub conservation: ConservationRule,
    /// Tiers ordered by increasing gap.  Empty means reactivation is
    /// never possible under this regime.
    #[serde(default)]
    pub reactivation: Vec<ReactivationTier>,
    #[serde(default)]
    pub salary_window: SalaryWindowRule,
    #[serde(default)]
    pub salary_cap: Option<SalaryCapTable>,
    /// Advisory notices attached to every conservation result.
    #[serde(default)]
    pub notices: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRange {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    /// Exclusive upper bound.
    #[serde(default)]
    pub before: Option<NaiveDate>,
}

impl RegistrationRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.before.map_or(true, |before| date < before)
    }
}

/// Conserved time, in weeks, as a function of recognized weeks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConservationRule {
    /// Recognized weeks are divided by this (floor).
    pub divisor: u32,
    /// Truncate the quotient to a whole multiple of this many weeks.
    #[serde(default)]
    pub granularity_weeks: Option<u32>,
    pub min_weeks: u32,
    pub max_weeks: u32,
}

impl ConservationRule {
    pub fn conserved_weeks(&self, recognized_weeks: u32) -> u32 {
        let mut weeks = recognized_weeks / self.divisor;
        if let Some(step) = self.granularity_weeks.filter(|s| *s > 0) {
            weeks -= weeks % step;
        }
        weeks.clamp(self.min_weeks, self.max_weeks)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivationTier {
    /// Largest gap (days since the last contribution) this tier covers.
    /// `None` covers any gap.
    #[serde(default)]
    pub max_gap_days: Option<i64>,
    /// New contribution weeks needed to recover the accrued weeks.
    pub required_weeks: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryWindowRule {
    pub target_days: i64,
}

impl Default for SalaryWindowRule {
    /// 250 weeks of seven days.
    fn default() -> Self {
        Self { target_days: 1750 }
    }
}

/// Daily salary ceiling: a multiple applied to a yearly base amount
/// (minimum wage or UMA).  Both maps are keyed by the first year a value
/// applies; later years inherit the latest earlier entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryCapTable {
    pub multiple_by_year: BTreeMap<i32, Decimal>,
    pub base_by_year: BTreeMap<i32, Decimal>,
}

impl SalaryCapTable {
    pub fn cap_for_year(&self, year: i32) -> Option<Decimal> {
        let multiple = lookup_year(&self.multiple_by_year, year)?;
        let base = lookup_year(&self.base_by_year, year)?;
        Some(multiple * base)
    }
}

/// Latest entry not after `year`, falling back to the earliest entry.
fn lookup_year(table: &BTreeMap<i32, Decimal>, year: i32) -> Option<Decimal> {
    table
        .range(..=year)
        .next_back()
        .or_else(|| table.iter().next())
        .map(|(_, value)| *value)
}

impl RegimeRules {
    /// Reject tables the calculators cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidTable {
            regime: self.regime,
            version: self.version.clone(),
            reason: reason.to_string(),
        };
        if self.conservation.divisor == 0 {
            return Err(invalid("conservation divisor must be positive"));
        }
        if self.conservation.min_weeks > self.conservation.max_weeks {
            return Err(invalid("conservation min_weeks exceeds max_weeks"));
        }
        if self.salary_window.target_days <= 0 {
            return Err(invalid("salary window target_days must be positive"));
        }
        let gaps: Vec<Option<i64>> = self.reactivation.iter().map(|t| t.max_gap_days).collect();
        let open_ended = gaps.iter().filter(|g| g.is_none()).count();
        if open_ended > 1 || (open_ended == 1 && gaps.last().map_or(false, |g| g.is_some())) {
            return Err(invalid("only the last reactivation tier may omit max_gap_days"));
        }
        if gaps.windows(2).any(|w| matches!((w[0], w[1]), (Some(a), Some(b)) if a >= b)) {
            return Err(invalid("reactivation tiers must have increasing max_gap_days"));
        }
        if let Some(cap) = &self.salary_cap {
            if cap.multiple_by_year.is_empty() || cap.base_by_year.is_empty() {
                return Err(invalid("salary cap table needs at least one multiple and one base"));
            }
            if cap
                .multiple_by_year
                .values()
                .chain(cap.base_by_year.values())
                .any(|v| v.is_sign_negative() || v.is_zero())
            {
                return Err(invalid("salary cap values must be positive"));
            }
        }
        Ok(())
    }
}

/// Source of regime rule tables.  Implementations must be thread-safe
/// because batch runs look rules up from several threads.
pub trait RuleSource: Send + Sync {
    /// The table for `regime` in force on `date`.
    fn rules_for(&self, regime: Regime, date: NaiveDate) -> Result<&RegimeRules, ConfigError>;
}

/// An in-memory collection of validated rule tables.
#[derive(Debug, Clone, Default)]
pub struct RuleBook {
    tables: BTreeMap<Regime, Vec<RegimeRules>>,
}

const BUILTIN_TABLES: &[(&str, &str)] = &[
    ("rules/ley73.json", include_str!("../rules/ley73.json")),
    ("rules/ley97.json", include_str!("../rules/ley97.json")),
];

impl RuleBook {
    pub fn new(tables: Vec<RegimeRules>) -> Result<Self, ConfigError> {
        let mut book = RuleBook::default();
        for table in tables {
            table.validate()?;
            book.tables.entry(table.regime).or_default().push(table);
        }
        for versions in book.tables.values_mut() {
            versions.sort_by_key(|t| t.effective_from);
        }
        Ok(book)
    }

    /// The tables shipped with the crate.
    pub fn builtin() -> Result<Self, ConfigError> {
        let tables = BUILTIN_TABLES
            .iter()
            .map(|(name, data)| {
                serde_json::from_str::<RegimeRules>(data).map_err(|source| ConfigError::Parse {
                    path: name.into(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(tables)
    }

    /// Load every `.json` file in `path` as a [`RegimeRules`] table.
    /// Any unreadable or invalid file fails the whole load.
    pub fn load_from_dir(path: &Path) -> Result<Self, ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut files = Vec::new();
        for entry in std::fs::read_dir(path).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let file = entry.path();
            if file.is_file() && file.extension().map_or(false, |ext| ext == "json") {
                files.push(file);
            }
        }
        files.sort();
        let mut tables = Vec::with_capacity(files.len());
        for file in files {
            let data = std::fs::read_to_string(&file).map_err(|source| ConfigError::Io {
                path: file.clone(),
                source,
            })?;
            let table: RegimeRules =
                serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
                    path: file.clone(),
                    source,
                })?;
            debug!(file = %file.display(), regime = %table.regime, version = %table.version, "loaded rule table");
            tables.push(table);
        }
        let book = Self::new(tables)?;
        info!(dir = %path.display(), tables = book.len(), "rule book loaded");
        Ok(book)
    }

    pub fn len(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RuleSource for RuleBook {
    fn rules_for(&self, regime: Regime, date: NaiveDate) -> Result<&RegimeRules, ConfigError> {
        self.tables
            .get(&regime)
            .and_then(|versions| versions.iter().rev().find(|t| t.effective_from <= date))
            .ok_or(ConfigError::MissingRegime { regime, date })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// A small table with round numbers for calculator tests.
    pub(crate) fn sample_rules(regime: Regime) -> RegimeRules {
        RegimeRules {
            regime,
            version: "test".into(),
            effective_from: date(1990, 1, 1),
            first_registration: RegistrationRange::default(),
            conservation: ConservationRule {
                divisor: 4,
                granularity_weeks: None,
                min_weeks: 52,
                max_weeks: 624,
            },
            reactivation: vec![
                ReactivationTier {
                    max_gap_days: Some(1095),
                    required_weeks: 0,
                },
                ReactivationTier {
                    max_gap_days: None,
                    required_weeks: 52,
                },
            ],
            salary_window: SalaryWindowRule::default(),
            salary_cap: None,
            notices: vec!["test notice".into()],
        }
    }

    #[test]
    fn conserved_weeks_applies_divisor_and_bounds() {
        let rule = sample_rules(Regime::Ley73).conservation;
        assert_eq!(rule.conserved_weeks(1000), 250);
        assert_eq!(rule.conserved_weeks(100), 52);
        assert_eq!(rule.conserved_weeks(5000), 624);
    }

    #[test]
    fn conserved_weeks_truncates_to_granularity() {
        let rule = ConservationRule {
            divisor: 1,
            granularity_weeks: Some(52),
            min_weeks: 0,
            max_weeks: 624,
        };
        assert_eq!(rule.conserved_weeks(130), 104);
        assert_eq!(rule.conserved_weeks(51), 0);
    }

    #[test]
    fn cap_lookup_inherits_latest_year_and_falls_back_to_earliest() {
        let cap = SalaryCapTable {
            multiple_by_year: BTreeMap::from([(1990, dec!(10)), (2008, dec!(25))]),
            base_by_year: BTreeMap::from([(2000, dec!(40)), (2010, dec!(60))]),
        };
        assert_eq!(cap.cap_for_year(2005), Some(dec!(400)));
        assert_eq!(cap.cap_for_year(2012), Some(dec!(1500)));
        assert_eq!(cap.cap_for_year(1995), Some(dec!(400)));
    }

    #[test]
    fn rule_book_selects_latest_effective_version() {
        let mut newer = sample_rules(Regime::Ley73);
        newer.version = "newer".into();
        newer.effective_from = date(2020, 1, 1);
        let book = RuleBook::new(vec![newer, sample_rules(Regime::Ley73)]).unwrap();
        assert_eq!(book.rules_for(Regime::Ley73, date(2019, 6, 1)).unwrap().version, "test");
        assert_eq!(book.rules_for(Regime::Ley73, date(2021, 6, 1)).unwrap().version, "newer");
        assert!(matches!(
            book.rules_for(Regime::Ley97, date(2021, 6, 1)),
            Err(ConfigError::MissingRegime { .. })
        ));
    }

    #[test]
    fn invalid_tables_are_rejected() {
        let mut rules = sample_rules(Regime::Ley97);
        rules.conservation.divisor = 0;
        assert!(matches!(rules.validate(), Err(ConfigError::InvalidTable { .. })));

        let mut rules = sample_rules(Regime::Ley97);
        rules.reactivation.reverse();
        assert!(rules.validate().is_err());
    }

    #[test]
    fn builtin_tables_cover_both_regimes() {
        let book = RuleBook::builtin().unwrap();
        let today = date(2025, 1, 29);
        let ley73 = book.rules_for(Regime::Ley73, today).unwrap();
        assert_eq!(ley73.conservation.divisor, 4);
        assert_eq!(ley73.salary_window.target_days, 1750);
        assert!(ley73.salary_cap.is_some());
        assert!(book.rules_for(Regime::Ley97, today).is_ok());
    }

    #[test]
    fn registration_range_is_half_open() {
        let range = RegistrationRange {
            from: None,
            before: Some(date(1997, 7, 1)),
        };
        assert!(range.contains(date(1997, 6, 30)));
        assert!(!range.contains(date(1997, 7, 1)));
    }
}
