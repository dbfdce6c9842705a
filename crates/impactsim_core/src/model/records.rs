//! Per-run assignments and the immutable run record
//!
//! A run is fully described by which provider each sheet got, which value
//! each parameter got, the resulting impact vector, and the kind of run.

use std::fmt;

use rustc_hash::FxHashMap;

use super::impacts::ImpactVector;
use super::process::ProcessRef;
use super::specs::ParameterDefinition;

/// Kind of run, written to the `sim_type` column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RunKind {
    Base,
    Range,
    MonteCarlo,
    /// Subgroup Monte Carlo for the named uncertainty group
    Subgroup(String),
}

impl RunKind {
    pub fn tag(&self) -> &str {
        match self {
            RunKind::Base => "base",
            RunKind::Range => "range",
            RunKind::MonteCarlo => "mca",
            RunKind::Subgroup(group) => group,
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Provider chosen for each provider sheet in one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderAssignment {
    picks: FxHashMap<String, ProcessRef>,
}

impl ProviderAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sheet: impl Into<String>, provider: ProcessRef) {
        self.picks.insert(sheet.into(), provider);
    }

    pub fn get(&self, sheet: &str) -> Option<&ProcessRef> {
        self.picks.get(sheet)
    }

    pub fn len(&self) -> usize {
        self.picks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.picks.is_empty()
    }

    /// Provider names in `sheets` order; unassigned sheets give an empty cell
    pub fn names_for(&self, sheets: &[String]) -> Vec<String> {
        sheets
            .iter()
            .map(|s| self.get(s).map(|p| p.name.clone()).unwrap_or_default())
            .collect()
    }
}

/// One parameter redefinition sent to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterRedef {
    pub context: ProcessRef,
    pub name: String,
    pub value: f64,
}

impl From<ParameterDefinition> for ParameterRedef {
    fn from(definition: ParameterDefinition) -> Self {
        Self {
            context: ProcessRef {
                id: definition.context_id,
                name: definition.context_name,
            },
            name: definition.parameter,
            value: definition.value,
        }
    }
}

/// Ordered redefinitions for one calculation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterRedefinitionSet(Vec<ParameterRedef>);

impl ParameterRedefinitionSet {
    pub fn with_capacity(n: usize) -> Self {
        Self(Vec::with_capacity(n))
    }

    pub fn push(&mut self, redef: ParameterRedef) {
        self.0.push(redef);
    }

    pub fn redefs(&self) -> &[ParameterRedef] {
        &self.0
    }

    pub fn values(&self) -> Vec<f64> {
        self.0.iter().map(|r| r.value).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub providers: Vec<String>,
    pub parameters: Vec<f64>,
    pub impacts: ImpactVector,
    pub kind: RunKind,
}

impl RunRecord {
    /// Row fields in header order
    pub fn fields(&self) -> Vec<String> {
        let mut fields = Vec::with_capacity(self.providers.len() + self.parameters.len() + 11);
        fields.extend(self.providers.iter().cloned());
        fields.extend(self.parameters.iter().map(f64::to_string));
        fields.extend(self.impacts.output_values().iter().map(f64::to_string));
        fields.push(self.kind.tag().to_string());
        fields
    }
}
