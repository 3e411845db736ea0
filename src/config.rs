//! Process configuration read from the environment.
//!
//! | Variable                  | Default            |
//! |---------------------------|--------------------|
//! | `PENSION_RULES_DIR`       | built-in tables    |
//! | `PENSION_BIND_ADDR`       | `127.0.0.1:3000`   |
//! | `PENSION_TOLERANCE_WEEKS` | `1`                |
//! | `PENSION_LOG`             | `info`             |

use crate::engine::DEFAULT_TOLERANCE_WEEKS;
use crate::rules::RuleBook;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Directory of rule table JSON files.  `None` uses the tables
    /// compiled into the binary.
    pub rules_dir: Option<PathBuf>,
    pub bind_addr: String,
    pub tolerance_weeks: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules_dir: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            tolerance_weeks: DEFAULT_TOLERANCE_WEEKS,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.  Empty values
    /// count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        if let Some(dir) = get("PENSION_RULES_DIR") {
            config.rules_dir = Some(PathBuf::from(dir));
        }
        if let Some(addr) = get("PENSION_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(tolerance) = get("PENSION_TOLERANCE_WEEKS") {
            config.tolerance_weeks = tolerance
                .trim()
                .parse()
                .with_context(|| format!("PENSION_TOLERANCE_WEEKS must be a whole number of weeks, got {tolerance:?}"))?;
        }
        Ok(config)
    }

    pub fn load_rules(&self) -> Result<RuleBook> {
        match &self.rules_dir {
            Some(dir) => RuleBook::load_from_dir(dir)
                .with_context(|| format!("failed to load rule tables from {}", dir.display())),
            None => {
                let book = RuleBook::builtin().context("built-in rule tables are invalid")?;
                info!(tables = book.len(), "using built-in rule tables");
                Ok(book)
            }
        }
    }
}
