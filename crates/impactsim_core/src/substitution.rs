//! Rebinding process inputs to a newly selected provider
//!
//! A substitution takes a process, the names of the input flows to replace,
//! and a provider process. Every matching input exchange is pointed at the
//! provider's reference flow and declared as its default provider, so the
//! next model build links the supply chain through it.
//!
//! When the exchange is measured in a different quantity than the provider's
//! reference flow (e.g. natural gas in m3 against a provider producing MJ),
//! a fixed density conversion is applied if one is known for the substance.

use crate::cache::ModelCache;
use crate::engine::Engine;
use crate::error::{EngineError, UnitReconciliationError};
use crate::model::{Exchange, FlowMatchset, Process, ProcessId, ProcessRef, ReferenceFlow};

/// Fixed volume/energy conversion for one substance class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityConversion {
    /// Matched case-insensitively as a substring of the new flow's name
    pub substance: &'static str,
    pub volume_unit: &'static str,
    pub energy_unit: &'static str,
    pub energy_per_volume: f64,
}

impl DensityConversion {
    pub const NATURAL_GAS: DensityConversion = DensityConversion {
        substance: "natural gas",
        volume_unit: "m3",
        energy_unit: "MJ",
        energy_per_volume: 38.0,
    };

    pub fn applies_to(&self, flow_name: &str) -> bool {
        flow_name.to_lowercase().contains(self.substance)
    }

    /// Volume to energy
    pub fn to_energy(&self, volume: f64) -> f64 {
        volume * self.energy_per_volume
    }

    /// Energy to volume
    pub fn to_volume(&self, energy: f64) -> f64 {
        energy / self.energy_per_volume
    }

    /// Direction of the conversion from `unit` into `target_property`
    fn direction(&self, unit: &str, target_property: &str) -> Option<Direction> {
        match target_property {
            ENERGY if unit == self.volume_unit => Some(Direction::ToEnergy),
            VOLUME if unit == self.energy_unit => Some(Direction::ToVolume),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToEnergy,
    ToVolume,
}

const ENERGY: &str = "Energy";
const VOLUME: &str = "Volume";

static CONVERSIONS: &[DensityConversion] = &[DensityConversion::NATURAL_GAS];

/// Result of applying one substitution
#[derive(Debug, Clone, PartialEq)]
pub struct SubstitutionOutcome {
    /// The process as persisted (unchanged when nothing matched)
    pub process: Process,
    /// Number of exchanges rebound
    pub modifications: usize,
    pub issues: Vec<UnitReconciliationError>,
}

/// Rebind the matching inputs of `process_id` to `provider` and persist.
///
/// Returns zero modifications, with a warning, when no input matched. Nothing
/// is persisted in that case.
pub fn apply_substitution<E: Engine>(
    cache: &mut ModelCache<'_, E>,
    process_id: &ProcessId,
    matchset: &FlowMatchset,
    provider: &ProcessRef,
) -> Result<SubstitutionOutcome, EngineError> {
    let reference = cache.reference_flow(&provider.id)?.clone();
    let mut process = cache.process(process_id)?.clone();
    let engine = cache.engine();

    let mut modifications = 0;
    let mut issues = Vec::new();

    for exchange in process
        .exchanges
        .iter_mut()
        .filter(|e| e.is_input && matchset.contains(&e.flow.name))
    {
        tracing::debug!(
            process = %process.name,
            from = %exchange.flow.name,
            to = %reference.flow.name,
            provider = %provider.name,
            "Rebinding exchange"
        );
        let old_amount = exchange.amount;
        exchange.flow = reference.flow.clone();
        exchange.default_provider = Some(provider.clone());

        if let Some(issue) = reconcile_units(engine, &process.name, exchange, &reference)? {
            tracing::warn!(process = %process.name, "{issue}");
            issues.push(issue);
        }
        tracing::debug!(
            old_amount,
            new_amount = exchange.amount,
            unit = %exchange.unit.name,
            "Exchange amount"
        );
        modifications += 1;
    }

    if modifications == 0 {
        tracing::warn!(
            process = %process.name,
            flows = %matchset,
            "No exchanges modified; check process names and ids in the substitution table"
        );
        return Ok(SubstitutionOutcome {
            process,
            modifications,
            issues,
        });
    }

    engine.persist_process(&process)?;
    cache.store_process(process.clone());
    tracing::debug!(process = %process.name, modifications, "Substitution persisted");

    Ok(SubstitutionOutcome {
        process,
        modifications,
        issues,
    })
}

/// Convert `exchange` to the quantity of the new reference flow if needed.
///
/// A same-typed or same-unit exchange is left alone. Known density
/// conversions rescale the amount and its uncertainty; anything else is
/// reported and left unconverted.
fn reconcile_units<E: Engine>(
    engine: &E,
    process_name: &str,
    exchange: &mut Exchange,
    reference: &ReferenceFlow,
) -> Result<Option<UnitReconciliationError>, EngineError> {
    if exchange.flow_property.is_some() && exchange.flow_property == reference.flow_property {
        return Ok(None);
    }
    if exchange.unit.name == reference.unit {
        return Ok(None);
    }

    let target_property = reference.flow_property.as_deref().unwrap_or_default();
    let conversion = CONVERSIONS.iter().find_map(|c| {
        c.applies_to(&exchange.flow.name)
            .then(|| c.direction(&exchange.unit.name, target_property))
            .flatten()
            .map(|d| (c, d))
    });

    let Some((conversion, direction)) = conversion else {
        return Ok(Some(UnitReconciliationError::NoConversionPath {
            process: process_name.to_string(),
            flow: exchange.flow.name.clone(),
            from_unit: exchange.unit.name.clone(),
            to_unit: reference.unit.clone(),
        }));
    };

    let (unit_name, factor) = match direction {
        Direction::ToEnergy => {
            exchange.amount = conversion.to_energy(exchange.amount);
            (conversion.energy_unit, conversion.energy_per_volume)
        }
        Direction::ToVolume => {
            exchange.amount = conversion.to_volume(exchange.amount);
            (conversion.volume_unit, conversion.energy_per_volume.recip())
        }
    };
    exchange.unit = engine.find_unit(unit_name)?;
    exchange.flow_property = reference.flow_property.clone();

    match exchange.uncertainty.as_mut() {
        Some(uncertainty) => {
            uncertainty.scale(factor);
            Ok(None)
        }
        None => Ok(Some(UnitReconciliationError::MissingUncertainty {
            process: process_name.to_string(),
            flow: exchange.flow.name.clone(),
        })),
    }
}
