//! Session plan: what a session will simulate
//!
//! [`survey`] reads the substitution rows and provider sheets and works out
//! the header layout, the base and range alternatives, the uncertainty
//! groups and the expected number of runs. It needs no engine, so inputs
//! can be checked before a calculation engine is available.

use std::fmt;

use crate::config::SessionConfig;
use crate::distribution::Distribution;
use crate::engine::ProviderSource;
use crate::error::{InputDataError, SessionError};
use crate::model::{
    ImpactMethodRef, Mark, ParameterDefinition, ProcessRef, ProviderCandidate, SubstitutionSpec,
};
use crate::recorder::RecordHeader;

/// Candidates of one provider sheet as loaded at identify time
#[derive(Debug, Clone, PartialEq)]
pub struct SheetPlan {
    pub name: String,
    /// Uncertainty groups of the substitution rows referencing this sheet
    pub groups: Vec<String>,
    pub candidates: Vec<ProviderCandidate>,
    /// The single `base` candidate, if the sheet has one
    pub base: Option<ProviderCandidate>,
    /// `low`/`high` candidates that differ from the base provider; identify
    /// drops the ones the engine cannot resolve or that resolve to the base
    pub range: Vec<ProviderCandidate>,
    /// Problem found while loading the sheet
    pub problem: Option<InputDataError>,
}

impl SheetPlan {
    fn load<S: ProviderSource + ?Sized>(name: &str, source: &S) -> Self {
        let mut plan = SheetPlan {
            name: name.to_string(),
            groups: Vec::new(),
            candidates: Vec::new(),
            base: None,
            range: Vec::new(),
            problem: None,
        };

        let candidates = match source.load_sheet(name) {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(sheet = name, error = %e, "Provider sheet could not be loaded");
                plan.problem = Some(e);
                return plan;
            }
        };

        let bases: Vec<&ProviderCandidate> = candidates
            .iter()
            .filter(|c| !c.skip && c.mark == Some(Mark::Base))
            .collect();
        match bases.as_slice() {
            [] => {
                tracing::warn!(sheet = name, "Provider sheet has no base row");
                plan.problem = Some(InputDataError::MissingBaseCandidate {
                    sheet: name.to_string(),
                });
            }
            [base] => plan.base = Some((*base).clone()),
            [first, ..] => {
                tracing::warn!(
                    sheet = name,
                    count = bases.len(),
                    provider = %first.name,
                    "Provider sheet has several base rows; using the first"
                );
                plan.base = Some((*first).clone());
                plan.problem = Some(InputDataError::AmbiguousBaseCandidate {
                    sheet: name.to_string(),
                    count: bases.len(),
                });
            }
        }

        plan.range = candidates
            .iter()
            .filter(|c| !c.skip && matches!(c.mark, Some(Mark::Low | Mark::High)))
            .filter(|c| match &plan.base {
                Some(base) if same_provider(base, c) => {
                    tracing::debug!(
                        sheet = name,
                        provider = %c.name,
                        "Range provider equals base; skipped"
                    );
                    false
                }
                _ => true,
            })
            .cloned()
            .collect();
        plan.candidates = candidates;
        plan
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// Two candidates name the same provider process
fn same_provider(a: &ProviderCandidate, b: &ProviderCandidate) -> bool {
    match (&a.process_id, &b.process_id) {
        (Some(x), Some(y)) => x == y,
        _ => a.name == b.name,
    }
}

/// A parameter redefined by the session
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterPlan {
    /// Context process; replaced by the engine's descriptor at identify
    pub context: ProcessRef,
    pub parameter: String,
    /// Header label, `"{context name}.{parameter}"`
    pub label: String,
    pub group: Option<String>,
    pub distribution: Distribution,
}

impl ParameterPlan {
    pub fn in_group(&self, group: &str) -> bool {
        self.group.as_deref() == Some(group)
    }

    pub fn definition(&self, mark: Mark) -> ParameterDefinition {
        let value = match mark {
            Mark::Base => self.distribution.base(),
            Mark::Low => self.distribution.low(),
            Mark::High => self.distribution.high(),
        };
        ParameterDefinition {
            context_id: self.context.id.clone(),
            context_name: self.context.name.clone(),
            parameter: self.parameter.clone(),
            mark,
            value,
        }
    }

    /// Marks that give a value different from base, low before high
    pub fn range_marks(&self) -> Vec<Mark> {
        let base = self.distribution.base();
        let low = self.distribution.low();
        let high = self.distribution.high();

        let mut marks = Vec::with_capacity(2);
        if low != base {
            marks.push(Mark::Low);
        }
        if high != base && high != low {
            marks.push(Mark::High);
        }
        marks
    }
}

/// Expected number of runs per phase.
///
/// Range counts are final only after identify has resolved the range
/// candidates against the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunPlan {
    pub base: usize,
    pub range: usize,
    pub monte_carlo: usize,
    /// Runs per uncertainty group, in group order
    pub subgroups: Vec<(String, usize)>,
}

impl RunPlan {
    fn new(
        config: &SessionConfig,
        sheets: &[SheetPlan],
        parameters: &[ParameterPlan],
        groups: &[String],
    ) -> Self {
        let range = if config.range {
            sheets.iter().map(|s| s.range.len()).sum::<usize>()
                + parameters
                    .iter()
                    .map(|p| p.range_marks().len())
                    .sum::<usize>()
        } else {
            0
        };
        let subgroups = if config.subgroup_monte_carlo {
            groups
                .iter()
                .map(|g| (g.clone(), config.monte_carlo_runs()))
                .collect()
        } else {
            Vec::new()
        };

        Self {
            base: usize::from(config.base),
            range,
            monte_carlo: if config.monte_carlo {
                config.monte_carlo_runs()
            } else {
                0
            },
            subgroups,
        }
    }

    pub fn total(&self) -> usize {
        self.base
            + self.range
            + self.monte_carlo
            + self.subgroups.iter().map(|(_, n)| n).sum::<usize>()
    }
}

impl fmt::Display for RunPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "base:        {}", self.base)?;
        writeln!(f, "range:       {}", self.range)?;
        writeln!(f, "monte carlo: {}", self.monte_carlo)?;
        for (group, runs) in &self.subgroups {
            writeln!(f, "subgroup {group}: {runs}")?;
        }
        write!(f, "total:       {}", self.total())
    }
}

/// Reference amount of the top-level process
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceAmount {
    pub amount: f64,
    pub unit: String,
}

/// Everything a session needs to run, derived from the input tables
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    /// Context process of the first active substitution row
    pub top: ProcessRef,
    /// Set once the top process has been resolved against the engine
    pub reference: Option<ReferenceAmount>,
    pub sheets: Vec<SheetPlan>,
    pub parameters: Vec<ParameterPlan>,
    /// Active rows that rebind exchanges to a provider sheet's pick
    pub substitutions: Vec<SubstitutionSpec>,
    /// Distinct uncertainty groups in order of first occurrence
    pub groups: Vec<String>,
    /// Resolved LCIA methods; empty until identify
    pub methods: Vec<ImpactMethodRef>,
    pub header: RecordHeader,
    pub runs: RunPlan,
}

impl SessionPlan {
    pub fn is_identified(&self) -> bool {
        self.reference.is_some() && !self.methods.is_empty()
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetPlan> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Recompute the header and run counts after sheets or parameters changed
    pub(crate) fn refresh(&mut self, config: &SessionConfig) {
        self.header = header_for(&self.sheets, &self.parameters);
        self.runs = RunPlan::new(config, &self.sheets, &self.parameters, &self.groups);
    }
}

fn header_for(sheets: &[SheetPlan], parameters: &[ParameterPlan]) -> RecordHeader {
    RecordHeader::new(
        sheets.iter().map(|s| s.name.clone()).collect(),
        parameters.iter().map(|p| p.label.clone()).collect(),
    )
}

/// Build a session plan from the substitution rows without touching the engine.
///
/// Provider sheets that fail to load are kept (they become empty cells) and
/// their problem is recorded on the sheet. Parameters with a missing or
/// malformed distribution are dropped with a warning.
pub fn survey<S: ProviderSource + ?Sized>(
    specs: &[SubstitutionSpec],
    source: &S,
    config: &SessionConfig,
) -> Result<SessionPlan, SessionError> {
    let active: Vec<&SubstitutionSpec> = specs.iter().filter(|s| !s.skip).collect();
    let Some(first) = active.first() else {
        return Err(SessionError::NoSubstitutions);
    };
    let top = ProcessRef {
        id: first.process_id.clone(),
        name: first.process_name.clone(),
    };

    let mut sheets: Vec<SheetPlan> = Vec::new();
    let mut parameters = Vec::new();
    let mut substitutions = Vec::new();
    let mut groups: Vec<String> = Vec::new();

    for spec in &active {
        let group = spec.uncertainty_group.as_deref();
        if let Some(g) = group {
            if !groups.iter().any(|known| known == g) {
                groups.push(g.to_string());
            }
        }

        if let Some(sheet_name) = spec.provider_sheet.as_deref() {
            let index = match sheets.iter().position(|s| s.name == sheet_name) {
                Some(index) => index,
                None => {
                    sheets.push(SheetPlan::load(sheet_name, source));
                    sheets.len() - 1
                }
            };
            let sheet = &mut sheets[index];
            if let Some(g) = group.filter(|g| !sheet.in_group(g)) {
                sheet.groups.push(g.to_string());
            }

            if spec.find_flow.is_empty() {
                tracing::warn!(
                    process = %spec.process_name,
                    sheet = sheet_name,
                    "Substitution row has no flows to find; skipped"
                );
            } else {
                substitutions.push((*spec).clone());
            }
        }

        let label = spec.parameter_label();
        if let (Some(parameter), Some(label)) = (spec.parameter.as_deref(), label) {
            let Some(sample) = spec.sample.as_deref() else {
                tracing::warn!(parameter = %label, "Parameter has no distribution; dropped");
                continue;
            };
            match sample.parse::<Distribution>() {
                Ok(distribution) => parameters.push(ParameterPlan {
                    context: ProcessRef {
                        id: spec.process_id.clone(),
                        name: spec.process_name.clone(),
                    },
                    parameter: parameter.to_string(),
                    label,
                    group: spec.uncertainty_group.clone(),
                    distribution,
                }),
                Err(e) => {
                    tracing::warn!(parameter = %label, error = %e, "Parameter dropped");
                }
            }
        }
    }

    tracing::info!(
        top = %top.name,
        sheets = sheets.len(),
        parameters = parameters.len(),
        substitutions = substitutions.len(),
        groups = groups.len(),
        "Survey complete"
    );

    let mut plan = SessionPlan {
        top,
        reference: None,
        sheets,
        parameters,
        substitutions,
        groups,
        methods: Vec::new(),
        header: RecordHeader::default(),
        runs: RunPlan::default(),
    };
    plan.refresh(config);
    Ok(plan)
}
