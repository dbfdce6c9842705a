//! LCA uncertainty and sensitivity simulation library
//!
//! This crate drives an external LCA calculation engine through repeated
//! reconfigurations of a supply-chain model. It supports:
//! - Base case runs with every provider and parameter at its `base` mark
//! - Range (one-factor-at-a-time) runs over `low`/`high` alternatives
//! - Monte Carlo runs with market-share weighted provider picks and
//!   distribution-sampled parameters
//! - Per-subgroup Monte Carlo runs that isolate one uncertainty group
//!
//! The engine itself is consumed through the [`engine::Engine`] trait.
//!
//! # Example
//!
//! ```ignore
//! use impactsim_core::{ResultRecorder, Session, SessionConfig};
//!
//! let config = SessionConfig::default().with_seed(7);
//! let mut session = Session::from_config(&engine, &providers, &config);
//!
//! let plan = session.identify(&specs)?;
//! let mut recorder = ResultRecorder::create(&path, &plan.header)?;
//! let summary = session.run(&plan, &mut recorder)?;
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod cache;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod recorder;
pub mod selector;
pub mod session;
pub mod substitution;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod config;
pub mod model;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use cache::ModelCache;
pub use config::{LinkingConfig, ProviderLinking, SessionConfig};
pub use distribution::{Distribution, ValueMode};
pub use engine::{Calculation, Engine, ProviderSource};
pub use error::{
    CalculationError, EngineError, InputDataError, LookupError, RecorderError, SessionError,
    UnitReconciliationError,
};
pub use recorder::{RecordHeader, ResultRecorder, ResultsLayout};
pub use selector::{provider_shares, select_provider};
pub use session::{Phase, RunPlan, Session, SessionPlan, SessionProgress, SessionSummary, survey};
pub use substitution::{DensityConversion, SubstitutionOutcome, apply_substitution};
