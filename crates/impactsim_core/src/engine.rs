//! Collaborator contracts consumed by the core
//!
//! [`Engine`] is the external LCA calculation engine: it owns the model
//! library, builds computable models and computes impacts. [`ProviderSource`]
//! loads provider sheets. Neither is implemented here; the session receives
//! handles to both so tests can substitute in-memory doubles.
//!
//! Every engine call is a blocking request/response. The engine holds one
//! mutable model library, so callers must not issue calls concurrently.

use crate::config::LinkingConfig;
use crate::error::{CalculationError, EngineError, InputDataError, LookupError};
use crate::model::{
    FlowRef, ImpactMethodRef, ImpactValue, ModelRef, ParameterRedefinitionSet, Process,
    ProcessId, ProcessRef, ProviderCandidate, UnitRef,
};

/// Handle to a running or finished calculation
pub trait Calculation {
    /// Block until the engine reports the result ready
    fn wait_until_ready(&mut self) -> Result<(), CalculationError>;

    /// Total impacts per category of the finished calculation
    fn total_impacts(&self) -> Result<Vec<ImpactValue>, CalculationError>;

    /// Release the engine-side result
    fn dispose(self);
}

/// External LCA calculation engine
pub trait Engine {
    type Calculation: Calculation;

    fn resolve_process(&self, id: &ProcessId) -> Result<ProcessRef, LookupError>;

    fn find_process(&self, name: &str) -> Result<ProcessRef, LookupError>;

    fn fetch_process(&self, id: &ProcessId) -> Result<Process, LookupError>;

    fn find_flow(&self, name: &str) -> Result<FlowRef, LookupError>;

    fn find_unit(&self, name: &str) -> Result<UnitRef, LookupError>;

    fn find_impact_method(&self, name: &str) -> Result<ImpactMethodRef, LookupError>;

    /// Overwrite the stored definition of a process
    fn persist_process(&self, process: &Process) -> Result<(), EngineError>;

    /// Build an ephemeral computable model linked from `top` down the supply chain
    fn build_model(
        &self,
        top: &ProcessRef,
        linking: &LinkingConfig,
    ) -> Result<ModelRef, EngineError>;

    fn delete_model(&self, model: &ModelRef) -> Result<(), EngineError>;

    /// Start an impact calculation on `model` with the given redefinitions
    fn calculate(
        &self,
        model: &ModelRef,
        method: &ImpactMethodRef,
        redefs: &ParameterRedefinitionSet,
    ) -> Result<Self::Calculation, CalculationError>;
}

/// Loads the candidate rows of one provider sheet
pub trait ProviderSource {
    fn load_sheet(&self, sheet: &str) -> Result<Vec<ProviderCandidate>, InputDataError>;
}
