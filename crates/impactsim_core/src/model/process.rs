//! Process graph types exchanged with the calculation engine
//!
//! These mirror the subset of the engine's schema that substitution needs:
//! a process with its exchanges, and lightweight references to flows,
//! units, impact methods and ephemeral computable models.

use serde::{Deserialize, Serialize};

use super::ids::ProcessId;

/// Lightweight descriptor of a process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRef {
    pub id: ProcessId,
    pub name: String,
}

/// Descriptor of a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRef {
    pub id: String,
    pub name: String,
}

/// Descriptor of a unit of measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRef {
    pub id: String,
    pub name: String,
}

/// Descriptor of an LCIA method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactMethodRef {
    pub id: String,
    pub name: String,
}

/// Handle to an ephemeral computable model (product system) held by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRef {
    pub id: String,
    pub name: String,
}

/// Uncertainty attached to an exchange amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Uncertainty {
    LogNormal { geom_mean: f64, geom_sd: f64 },
    Normal { mean: f64, sd: f64 },
    Uniform { minimum: f64, maximum: f64 },
    Triangular { minimum: f64, mode: f64, maximum: f64 },
}

impl Uncertainty {
    /// Rescale to a new unit where `new_amount = old_amount * factor`.
    ///
    /// The geometric standard deviation of a log-normal is a dimensionless
    /// multiplier and stays as is.
    pub fn scale(&mut self, factor: f64) {
        match self {
            Uncertainty::LogNormal { geom_mean, .. } => *geom_mean *= factor,
            Uncertainty::Normal { mean, sd } => {
                *mean *= factor;
                *sd *= factor.abs();
            }
            Uncertainty::Uniform { minimum, maximum } => {
                *minimum *= factor;
                *maximum *= factor;
            }
            Uncertainty::Triangular {
                minimum,
                mode,
                maximum,
            } => {
                *minimum *= factor;
                *mode *= factor;
                *maximum *= factor;
            }
        }
    }
}

/// One input or output of a process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub is_input: bool,
    #[serde(default)]
    pub is_quantitative_reference: bool,
    pub flow: FlowRef,
    /// Measurement type of the flow, e.g. `Mass`, `Energy`, `Volume`
    #[serde(default)]
    pub flow_property: Option<String>,
    pub unit: UnitRef,
    pub amount: f64,
    #[serde(default)]
    pub uncertainty: Option<Uncertainty>,
    #[serde(default)]
    pub default_provider: Option<ProcessRef>,
}

/// Full process definition as stored by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub id: ProcessId,
    pub name: String,
    pub exchanges: Vec<Exchange>,
}

impl Process {
    pub fn reference(&self) -> ProcessRef {
        ProcessRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    /// The exchange marked as the process's quantitative reference, if any
    pub fn quantitative_reference(&self) -> Option<&Exchange> {
        self.exchanges.iter().find(|e| e.is_quantitative_reference)
    }
}

/// Reference (quantitative) flow of a provider process, resolved for linking
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceFlow {
    pub flow: FlowRef,
    pub flow_property: Option<String>,
    pub unit: String,
    pub amount: f64,
}

/// One row of an engine's total impact result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactValue {
    pub category: String,
    pub amount: f64,
    pub unit: String,
}
