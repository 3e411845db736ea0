//! Pension Engine library crate.
//!
//! This crate derives the entitlement facts of a retirement-pension
//! assessment from a worker's employment history: overlap-adjusted
//! weeks of contribution, conservation of rights under the applicable
//! regime, and the regulated trailing salary average.  External
//! applications may call [`engine::analyze`] directly or embed the HTTP
//! API via [`api::build_router`].

pub mod api;
pub mod config;
pub mod conservation;
pub mod engine;
pub mod error;
pub mod models;
pub mod normalize;
pub mod overlap;
pub mod rules;
pub mod salary;
pub mod validator;
pub mod weeks;

pub use engine::{analyze, analyze_batch, AnalysisOptions};
pub use error::{AnalysisError, ConfigError};
pub use models::{AnalysisInput, AnalysisReport};
pub use rules::{RuleBook, RuleSource};
