mod ids;
mod impacts;
mod process;
mod records;
mod specs;

pub use ids::ProcessId;
pub use impacts::{IMPACT_TABLE, ImpactMetric, ImpactVector, metric_for};
pub use process::{
    Exchange, FlowRef, ImpactMethodRef, ImpactValue, ModelRef, Process, ProcessRef, ReferenceFlow,
    Uncertainty, UnitRef,
};
pub use records::{
    ParameterRedef, ParameterRedefinitionSet, ProviderAssignment, RunKind, RunRecord,
};
pub use specs::{FlowMatchset, Mark, ParameterDefinition, ProviderCandidate, SubstitutionSpec};
