//! Simulation orchestrator
//!
//! A [`Session`] sequences the phases of one study against the engine:
//!
//! 1. IDENTIFY: survey the input tables and resolve the top-level process,
//!    parameter contexts and LCIA methods ([`Session::identify`])
//! 2. BASE: one run with every provider and parameter at `base`
//! 3. RANGE: one run per `low`/`high` alternative, one factor at a time
//! 4. MONTE CARLO: `loop_runs` provider picks, each followed by
//!    `param_runs` parameter draws on the same model
//! 5. SUBGROUP MONTE CARLO: Monte Carlo per uncertainty group, with
//!    everything outside the group held at base
//!
//! Every completed run is appended to the recorder immediately. Input
//! problems with a single sheet or substitution row are logged and skip
//! that contribution; lookup failures of the top-level process, failed
//! model builds, failed calculations and recorder errors end the session.

mod plan;
mod progress;

pub use plan::{ParameterPlan, ReferenceAmount, RunPlan, SessionPlan, SheetPlan, survey};
pub use progress::{SessionProgress, SessionSummary};

use std::fmt;
use std::io::Write;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cache::ModelCache;
use crate::config::SessionConfig;
use crate::distribution::ValueMode;
use crate::engine::{Calculation, Engine, ProviderSource};
use crate::error::{CalculationError, InputDataError, LookupError, SessionError};
use crate::model::{
    ImpactVector, Mark, ModelRef, ParameterRedef, ParameterRedefinitionSet, ProcessId,
    ProcessRef, ProviderAssignment, ProviderCandidate, RunKind, RunRecord, SubstitutionSpec,
};
use crate::recorder::ResultRecorder;
use crate::selector::select_provider;
use crate::substitution::apply_substitution;

/// Session phases in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Identify,
    Base,
    Range,
    MonteCarlo,
    SubgroupMonteCarlo,
}

impl Phase {
    /// The phase after this one; phases only move forward
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Identify => Some(Phase::Base),
            Phase::Base => Some(Phase::Range),
            Phase::Range => Some(Phase::MonteCarlo),
            Phase::MonteCarlo => Some(Phase::SubgroupMonteCarlo),
            Phase::SubgroupMonteCarlo => None,
        }
    }

    pub fn is_enabled(self, config: &SessionConfig) -> bool {
        match self {
            Phase::Identify => true,
            Phase::Base => config.base,
            Phase::Range => config.range,
            Phase::MonteCarlo => config.monte_carlo,
            Phase::SubgroupMonteCarlo => config.subgroup_monte_carlo,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Identify => "identify",
            Phase::Base => "base",
            Phase::Range => "range",
            Phase::MonteCarlo => "monte carlo",
            Phase::SubgroupMonteCarlo => "subgroup monte carlo",
        };
        f.write_str(name)
    }
}

/// Why a provider could not be picked for a sheet
#[derive(Debug)]
enum PickError {
    Input(InputDataError),
    Lookup(LookupError),
}

impl fmt::Display for PickError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickError::Input(e) => write!(f, "{e}"),
            PickError::Lookup(e) => write!(f, "{e}"),
        }
    }
}

impl From<InputDataError> for PickError {
    fn from(err: InputDataError) -> Self {
        PickError::Input(err)
    }
}

impl From<LookupError> for PickError {
    fn from(err: LookupError) -> Self {
        PickError::Lookup(err)
    }
}

/// One simulation session against one engine model library
pub struct Session<'a, E: Engine, S: ProviderSource, R: Rng> {
    cache: ModelCache<'a, E>,
    source: &'a S,
    config: &'a SessionConfig,
    rng: R,
    progress: SessionProgress,
    summary: SessionSummary,
}

impl<'a, E: Engine, S: ProviderSource> Session<'a, E, S, StdRng> {
    /// Session drawing from `config.seed`, or from OS entropy when no seed is set
    pub fn from_config(engine: &'a E, source: &'a S, config: &'a SessionConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::new(engine, source, config, rng)
    }
}

impl<'a, E: Engine, S: ProviderSource, R: Rng> Session<'a, E, S, R> {
    pub fn new(engine: &'a E, source: &'a S, config: &'a SessionConfig, rng: R) -> Self {
        Self {
            cache: ModelCache::new(engine),
            source,
            config,
            rng,
            progress: SessionProgress::default(),
            summary: SessionSummary::default(),
        }
    }

    /// Shared progress handle; stays valid across `run`
    pub fn progress(&self) -> SessionProgress {
        self.progress.clone()
    }

    pub fn cache(&self) -> &ModelCache<'a, E> {
        &self.cache
    }

    /// IDENTIFY: build the plan and resolve it against the engine.
    ///
    /// Fails if the top-level process, its reference flow or any configured
    /// impact method cannot be resolved. Parameters whose context process
    /// is unknown are dropped with a warning.
    pub fn identify(&mut self, specs: &[SubstitutionSpec]) -> Result<SessionPlan, SessionError> {
        tracing::info!(phase = %Phase::Identify, "Phase started");
        let mut plan = survey(specs, self.source, self.config)?;
        let engine = self.cache.engine();

        let top = engine.resolve_process(&plan.top.id)?;
        let reference = self
            .cache
            .process(&top.id)?
            .quantitative_reference()
            .map(|e| ReferenceAmount {
                amount: e.amount,
                unit: e.unit.name.clone(),
            })
            .ok_or_else(|| LookupError::NoReferenceFlow(top.id.clone()))?;
        tracing::info!(
            process = %top.name,
            amount = reference.amount,
            unit = %reference.unit,
            "Top-level process resolved"
        );
        plan.top = top;
        plan.reference = Some(reference);

        plan.parameters
            .retain_mut(|p| match engine.resolve_process(&p.context.id) {
                Ok(context) => {
                    p.context = context;
                    true
                }
                Err(e) => {
                    tracing::warn!(
                        parameter = %p.label,
                        error = %e,
                        "Parameter context not found; dropped"
                    );
                    false
                }
            });

        if self.config.impact_methods.is_empty() {
            return Err(SessionError::Config("no impact methods configured".to_string()));
        }
        plan.methods = self
            .config
            .impact_methods
            .iter()
            .map(|name| self.cache.impact_method(name).cloned())
            .collect::<Result<Vec<_>, LookupError>>()?;

        for sheet in &mut plan.sheets {
            self.resolve_range(sheet);
        }

        plan.refresh(self.config);
        tracing::info!(
            columns = plan.header.column_count(),
            runs = plan.runs.total(),
            "Session plan ready"
        );
        Ok(plan)
    }

    /// Pin the sheet's range candidates to engine processes.
    ///
    /// Candidates that cannot be resolved, or that resolve to the same process
    /// as the base candidate, are dropped so the planned run count matches
    /// what RANGE will actually record.
    fn resolve_range(&self, sheet: &mut SheetPlan) {
        let base_id = sheet
            .base
            .as_ref()
            .and_then(|b| self.resolve_candidate(b).ok())
            .map(|p| p.id);

        let candidates = std::mem::take(&mut sheet.range);
        for mut candidate in candidates {
            match self.resolve_candidate(&candidate) {
                Ok(provider) if base_id.as_ref() == Some(&provider.id) => {
                    tracing::debug!(
                        sheet = %sheet.name,
                        provider = %provider.name,
                        "Range provider equals base; skipped"
                    );
                }
                Ok(provider) => {
                    candidate.process_id = Some(provider.id);
                    sheet.range.push(candidate);
                }
                Err(e) => {
                    tracing::warn!(
                        sheet = %sheet.name,
                        provider = %candidate.name,
                        error = %e,
                        "Range provider not found; skipped"
                    );
                }
            }
        }
    }

    /// Run every enabled phase in order, appending one row per run.
    pub fn run<W: Write>(
        &mut self,
        plan: &SessionPlan,
        recorder: &mut ResultRecorder<W>,
    ) -> Result<SessionSummary, SessionError> {
        if !plan.is_identified() {
            return Err(SessionError::Config(
                "plan has not been identified against the engine".to_string(),
            ));
        }
        if recorder.columns() != plan.header.column_count() {
            return Err(SessionError::Config(format!(
                "recorder has {} columns, plan header has {}",
                recorder.columns(),
                plan.header.column_count()
            )));
        }

        self.progress.reset(plan.runs.total());
        self.summary = SessionSummary::default();
        let started = Instant::now();
        let base = self.base_assignment(plan);

        let mut phase = Phase::Identify;
        while let Some(next) = phase.next() {
            phase = next;
            if !phase.is_enabled(self.config) {
                tracing::debug!(phase = %phase, "Phase disabled");
                continue;
            }
            tracing::info!(phase = %phase, "Phase started");
            match phase {
                Phase::Identify => {}
                Phase::Base => self.run_base(plan, &base, recorder)?,
                Phase::Range => self.run_range(plan, &base, recorder)?,
                Phase::MonteCarlo => self.run_monte_carlo(plan, &base, None, recorder)?,
                Phase::SubgroupMonteCarlo => {
                    for group in &plan.groups {
                        self.run_monte_carlo(plan, &base, Some(group.as_str()), recorder)?;
                    }
                }
            }
        }

        self.cache.log_stats();
        tracing::info!(
            runs = self.summary.total_runs(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            zero_match = self.summary.zero_match_substitutions,
            skipped_picks = self.summary.skipped_picks,
            "Session finished"
        );
        Ok(std::mem::take(&mut self.summary))
    }

    fn run_base<W: Write>(
        &mut self,
        plan: &SessionPlan,
        base: &ProviderAssignment,
        recorder: &mut ResultRecorder<W>,
    ) -> Result<(), SessionError> {
        let redefs = fixed_parameters(plan, None);
        self.with_model(plan, base, |session, model| {
            session.calculate_and_record(plan, model, base, &redefs, RunKind::Base, recorder)
        })
    }

    fn run_range<W: Write>(
        &mut self,
        plan: &SessionPlan,
        base: &ProviderAssignment,
        recorder: &mut ResultRecorder<W>,
    ) -> Result<(), SessionError> {
        for sheet in &plan.sheets {
            for candidate in &sheet.range {
                let provider = match self.resolve_candidate(candidate) {
                    Ok(provider) => provider,
                    Err(e) => {
                        tracing::warn!(
                            sheet = %sheet.name,
                            provider = %candidate.name,
                            error = %e,
                            "Range provider not found; skipped"
                        );
                        self.summary.skipped_picks += 1;
                        continue;
                    }
                };
                if base.get(&sheet.name).is_some_and(|b| b.id == provider.id) {
                    tracing::debug!(
                        sheet = %sheet.name,
                        provider = %provider.name,
                        "Range provider equals base; skipped"
                    );
                    continue;
                }
                tracing::info!(
                    sheet = %sheet.name,
                    mark = ?candidate.mark,
                    provider = %provider.name,
                    "Provider range run"
                );

                let mut assignment = base.clone();
                assignment.insert(sheet.name.clone(), provider);
                let redefs = fixed_parameters(plan, None);
                self.with_model(plan, &assignment, |session, model| {
                    session.calculate_and_record(
                        plan,
                        model,
                        &assignment,
                        &redefs,
                        RunKind::Range,
                        recorder,
                    )
                })?;
            }
        }

        let perturbations: Vec<_> = plan
            .parameters
            .iter()
            .enumerate()
            .flat_map(|(index, p)| p.range_marks().into_iter().map(move |mark| (index, mark)))
            .collect();
        if perturbations.is_empty() {
            return Ok(());
        }

        // Only parameters change, so one model serves every parameter range run
        self.with_model(plan, base, |session, model| {
            for (index, mark) in perturbations {
                tracing::info!(
                    parameter = %plan.parameters[index].label,
                    %mark,
                    "Parameter range run"
                );
                let redefs = fixed_parameters(plan, Some((index, mark)));
                session.calculate_and_record(
                    plan,
                    model,
                    base,
                    &redefs,
                    RunKind::Range,
                    recorder,
                )?;
            }
            Ok(())
        })
    }

    /// Monte Carlo over every sheet and parameter, or only over `group`
    fn run_monte_carlo<W: Write>(
        &mut self,
        plan: &SessionPlan,
        base: &ProviderAssignment,
        group: Option<&str>,
        recorder: &mut ResultRecorder<W>,
    ) -> Result<(), SessionError> {
        let kind = match group {
            Some(g) => RunKind::Subgroup(g.to_string()),
            None => RunKind::MonteCarlo,
        };
        let loop_runs = self.config.loop_runs;
        let param_runs = self.config.param_runs;
        let started = Instant::now();

        for iteration in 0..loop_runs {
            let assignment = self.sample_assignment(plan, base, group);
            self.with_model(plan, &assignment, |session, model| {
                for _ in 0..param_runs {
                    let redefs = session.parameter_set(plan, |_, p| match group {
                        Some(g) if !p.in_group(g) => ValueMode::Base,
                        _ => ValueMode::Sample,
                    });
                    session.calculate_and_record(
                        plan,
                        model,
                        &assignment,
                        &redefs,
                        kind.clone(),
                        recorder,
                    )?;
                }
                Ok(())
            })?;

            let done = iteration + 1;
            let elapsed = started.elapsed();
            let remaining = elapsed.mul_f64((loop_runs - done) as f64 / done as f64);
            tracing::info!(
                sim_type = kind.tag(),
                iteration = done,
                of = loop_runs,
                completed = self.progress.completed(),
                total = self.progress.total(),
                elapsed_secs = elapsed.as_secs_f64(),
                remaining_secs = remaining.as_secs_f64(),
                "Monte Carlo iteration finished"
            );
        }
        Ok(())
    }

    /// Base candidate of every sheet; sheets without one stay unassigned
    fn base_assignment(&mut self, plan: &SessionPlan) -> ProviderAssignment {
        let mut assignment = ProviderAssignment::new();
        for sheet in &plan.sheets {
            let Some(candidate) = &sheet.base else {
                tracing::warn!(sheet = %sheet.name, "No base provider; sheet left unassigned");
                continue;
            };
            match self.resolve_candidate(candidate) {
                Ok(provider) => assignment.insert(sheet.name.clone(), provider),
                Err(e) => {
                    tracing::warn!(
                        sheet = %sheet.name,
                        provider = %candidate.name,
                        error = %e,
                        "Base provider not found; sheet left unassigned"
                    );
                    self.summary.skipped_picks += 1;
                }
            }
        }
        assignment
    }

    /// Fresh weighted picks for the sheets in scope, base for the rest.
    ///
    /// A sheet whose pick fails keeps its base provider for this iteration.
    fn sample_assignment(
        &mut self,
        plan: &SessionPlan,
        base: &ProviderAssignment,
        group: Option<&str>,
    ) -> ProviderAssignment {
        let mut assignment = base.clone();
        for sheet in &plan.sheets {
            if group.is_some_and(|g| !sheet.in_group(g)) {
                continue;
            }
            match self.pick(&sheet.name) {
                Ok(provider) => assignment.insert(sheet.name.clone(), provider),
                Err(e) => {
                    tracing::warn!(
                        sheet = %sheet.name,
                        error = %e,
                        fallback = assignment.get(&sheet.name).map(|p| p.name.as_str()),
                        "Provider pick failed; base provider kept for this iteration"
                    );
                    self.summary.skipped_picks += 1;
                }
            }
        }
        assignment
    }

    /// Reload a provider sheet and draw one provider by market share
    fn pick(&mut self, sheet: &str) -> Result<ProcessRef, PickError> {
        let candidates = self.source.load_sheet(sheet)?;
        let candidate = select_provider(sheet, &candidates, self.config.regions(), &mut self.rng)?;
        let provider = self.resolve_candidate(candidate)?;
        tracing::debug!(sheet, provider = %provider.name, "Provider picked");
        Ok(provider)
    }

    fn resolve_candidate(&self, candidate: &ProviderCandidate) -> Result<ProcessRef, LookupError> {
        let engine = self.cache.engine();
        match &candidate.process_id {
            Some(id) => engine.resolve_process(id),
            None => engine.find_process(&candidate.name),
        }
    }

    /// Redefinitions for every planned parameter, in header order
    fn parameter_set(
        &mut self,
        plan: &SessionPlan,
        mode_for: impl Fn(usize, &ParameterPlan) -> ValueMode,
    ) -> ParameterRedefinitionSet {
        let mut redefs = ParameterRedefinitionSet::with_capacity(plan.parameters.len());
        for (index, parameter) in plan.parameters.iter().enumerate() {
            let mode = mode_for(index, parameter);
            let value = match parameter.distribution.resolve(mode, &mut self.rng) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(
                        parameter = %parameter.label,
                        error = %e,
                        "Sampling failed; using base"
                    );
                    parameter.distribution.base()
                }
            };
            tracing::debug!(parameter = %parameter.label, ?mode, value, "Parameter value");
            redefs.push(ParameterRedef {
                context: parameter.context.clone(),
                name: parameter.parameter.clone(),
                value,
            });
        }
        redefs
    }

    /// Re-apply every substitution row with the providers in `assignment`.
    ///
    /// Processes with a row whose sheet has no provider are first put back to
    /// their original definition, so no earlier pick leaks into this model.
    fn apply_substitutions(&mut self, plan: &SessionPlan, assignment: &ProviderAssignment) {
        let mut unassigned: Vec<&ProcessId> = Vec::new();
        for row in &plan.substitutions {
            let missing = row
                .provider_sheet
                .as_deref()
                .is_some_and(|sheet| assignment.get(sheet).is_none());
            if missing && !unassigned.contains(&&row.process_id) {
                unassigned.push(&row.process_id);
            }
        }
        for id in unassigned {
            if let Err(e) = self.cache.restore_original(id) {
                tracing::warn!(process = %id, error = %e, "Could not restore original process");
            }
        }

        for row in &plan.substitutions {
            let Some(sheet) = row.provider_sheet.as_deref() else {
                continue;
            };
            let Some(provider) = assignment.get(sheet) else {
                tracing::warn!(
                    process = %row.process_name,
                    sheet,
                    "No provider assigned for sheet; substitution skipped"
                );
                self.summary.skipped_substitutions += 1;
                continue;
            };
            match apply_substitution(&mut self.cache, &row.process_id, &row.find_flow, provider) {
                Ok(outcome) => {
                    if outcome.modifications == 0 {
                        self.summary.zero_match_substitutions += 1;
                    }
                    self.summary.reconciliation_issues += outcome.issues.len();
                }
                Err(e) => {
                    tracing::warn!(
                        process = %row.process_name,
                        sheet,
                        error = %e,
                        "Substitution failed; skipped for this iteration"
                    );
                    self.summary.skipped_substitutions += 1;
                }
            }
        }
    }

    /// Apply substitutions, build a model, run `body` on it, then delete it.
    ///
    /// The model is deleted even when `body` fails; the failure is returned
    /// after the delete attempt.
    fn with_model<F>(
        &mut self,
        plan: &SessionPlan,
        assignment: &ProviderAssignment,
        body: F,
    ) -> Result<(), SessionError>
    where
        F: FnOnce(&mut Self, &ModelRef) -> Result<(), SessionError>,
    {
        self.apply_substitutions(plan, assignment);

        let engine = self.cache.engine();
        let model = engine.build_model(&plan.top, &self.config.linking)?;
        tracing::debug!(model = %model.name, "Model built");

        let result = body(self, &model);

        if let Err(e) = engine.delete_model(&model) {
            tracing::warn!(
                model = %model.id,
                error = %e,
                "Failed to delete model; remove it from the engine manually"
            );
        }
        result
    }

    /// Calculate every configured method on `model` and record one row
    fn calculate_and_record<W: Write>(
        &mut self,
        plan: &SessionPlan,
        model: &ModelRef,
        assignment: &ProviderAssignment,
        redefs: &ParameterRedefinitionSet,
        kind: RunKind,
        recorder: &mut ResultRecorder<W>,
    ) -> Result<(), SessionError> {
        let engine = self.cache.engine();
        let mut impacts = ImpactVector::default();

        for method in &plan.methods {
            let mut calculation = engine.calculate(model, method, redefs)?;
            let result = calculation
                .wait_until_ready()
                .and_then(|()| calculation.total_impacts());
            calculation.dispose();

            let values = result?;
            if values.is_empty() {
                return Err(CalculationError::EmptyResult {
                    method: method.name.clone(),
                }
                .into());
            }
            let mapped = impacts.absorb(&method.name, &values);
            tracing::debug!(
                method = %method.name,
                rows = values.len(),
                mapped,
                "Impacts received"
            );
        }

        let record = RunRecord {
            providers: assignment.names_for(&plan.header.provider_sheets),
            parameters: redefs.values(),
            impacts,
            kind,
        };
        recorder.append(&record)?;

        self.summary.record_run(record.kind.tag());
        self.progress.increment();
        tracing::debug!(
            sim_type = record.kind.tag(),
            completed = self.progress.completed(),
            total = self.progress.total(),
            "Run recorded"
        );
        Ok(())
    }
}

/// Every planned parameter at base, except `perturbed` at its mark
fn fixed_parameters(
    plan: &SessionPlan,
    perturbed: Option<(usize, Mark)>,
) -> ParameterRedefinitionSet {
    let mut redefs = ParameterRedefinitionSet::with_capacity(plan.parameters.len());
    for (index, parameter) in plan.parameters.iter().enumerate() {
        let mark = match perturbed {
            Some((i, mark)) if i == index => mark,
            _ => Mark::Base,
        };
        let definition = parameter.definition(mark);
        tracing::debug!(
            parameter = %definition.label(),
            mark = %definition.mark,
            value = definition.value,
            "Parameter value"
        );
        redefs.push(ParameterRedef::from(definition));
    }
    redefs
}
