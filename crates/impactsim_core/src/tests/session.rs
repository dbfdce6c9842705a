//! Tests for session sequencing and failure handling
//!
//! These tests verify:
//! - Run counts per phase and header/row agreement
//! - Substitutions are re-applied on every model rebuild
//! - Missing provider sheets during Monte Carlo do not abort the session
//! - Recorded providers match the providers the model was built with
//! - Sheets with no, several, or redundant base/range rows
//! - Fatal lookup and calculation failures, with model cleanup

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::engine_double::{Call, FakeEngine, FakeSource, candidate, engine, source, specs};
use crate::config::SessionConfig;
use crate::error::{CalculationError, InputDataError, LookupError, SessionError};
use crate::model::{
    ImpactMetric, Mark, ParameterRedef, ProcessId, ProviderCandidate, SubstitutionSpec,
};
use crate::recorder::ResultRecorder;
use crate::session::{Phase, Session, SessionPlan, SessionSummary, survey};

fn config(loop_runs: usize, param_runs: usize) -> SessionConfig {
    SessionConfig {
        subgroup_monte_carlo: false,
        ..SessionConfig::default()
    }
    .with_loops(loop_runs, param_runs)
}

/// Run a whole session and return the plan, summary and parsed rows
fn run_session(
    engine: &FakeEngine,
    source: &FakeSource,
    config: &SessionConfig,
) -> Result<(SessionPlan, SessionSummary, Vec<Vec<String>>), SessionError> {
    let mut session = Session::new(engine, source, config, StdRng::seed_from_u64(42));
    let plan = session.identify(&specs())?;
    let mut recorder = ResultRecorder::from_writer(Vec::new(), &plan.header)?;
    let summary = session.run(&plan, &mut recorder)?;

    let bytes = recorder.into_inner()?;
    Ok((plan, summary, parse_rows(&bytes)))
}

fn parse_rows(bytes: &[u8]) -> Vec<Vec<String>> {
    csv::Reader::from_reader(bytes)
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

/// Run an identified plan and parse the rows it recorded
fn run_plan<R: Rng>(
    session: &mut Session<'_, FakeEngine, FakeSource, R>,
    plan: &SessionPlan,
) -> (SessionSummary, Vec<Vec<String>>) {
    let mut recorder = ResultRecorder::from_writer(Vec::new(), &plan.header).unwrap();
    let summary = session.run(plan, &mut recorder).unwrap();
    let bytes = recorder.into_inner().unwrap();
    (summary, parse_rows(&bytes))
}

/// Substitution rows only, without the efficiency parameter
fn provider_specs() -> Vec<SubstitutionSpec> {
    specs()
        .into_iter()
        .filter(|s| s.parameter.is_none())
        .collect()
}

/// Every provider named in a row's sheet cells was linked when the row was calculated
fn assert_rows_match_model(rows: &[Vec<String>], engine: &FakeEngine, sheets: usize) {
    let calculated = engine.calculated_providers();
    assert_eq!(rows.len(), calculated.len());
    for (row, providers) in rows.iter().zip(&calculated) {
        for cell in row[..sheets].iter().filter(|c| !c.is_empty()) {
            assert!(providers.contains(cell), "{cell} not in {providers:?}");
        }
    }
}

#[test]
fn test_phase_order_is_forward_only() {
    let mut phases = vec![Phase::Identify];
    while let Some(next) = phases.last().and_then(|p| p.next()) {
        phases.push(next);
    }
    assert_eq!(
        phases,
        [
            Phase::Identify,
            Phase::Base,
            Phase::Range,
            Phase::MonteCarlo,
            Phase::SubgroupMonteCarlo
        ]
    );
    assert!(phases.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_two_sheets_one_parameter_gives_ten_records() {
    let engine = engine();
    let source = source();
    let config = config(3, 2);

    let (plan, summary, rows) = run_session(&engine, &source, &config).unwrap();

    assert_eq!(plan.runs.total(), 10);
    assert_eq!(rows.len(), 10);
    assert!(rows.iter().all(|r| r.len() == plan.header.column_count()));

    assert_eq!(summary.runs_for("base"), 1);
    assert_eq!(summary.runs_for("range"), 3);
    assert_eq!(summary.runs_for("mca"), 6);
    assert_eq!(summary.total_runs(), 10);
    assert_eq!(summary.zero_match_substitutions, 0);

    let tags: Vec<&str> = rows.iter().map(|r| r.last().unwrap().as_str()).collect();
    assert_eq!(&tags[..4], ["base", "range", "range", "range"]);
    assert!(tags[4..].iter().all(|t| *t == "mca"));

    // Base row: base providers, base parameter, mapped impacts
    assert_eq!(rows[0][0], "gas, US");
    assert_eq!(rows[0][1], "grid, US");
    assert_eq!(rows[0][2], "0.8");
    assert_eq!(rows[0][3], "1.8");
    assert_eq!(rows[0][3 + 3], "0.01");
    assert_eq!(rows[0][4], "NaN");

    // Range rows perturb one factor each
    assert_eq!(rows[1][..3], ["gas, CA", "grid, US", "0.8"]);
    assert_eq!(rows[2][..3], ["gas, US", "grid, TX", "0.8"]);
    assert_eq!(rows[3][..3], ["gas, US", "grid, US", "0.95"]);
}

#[test]
fn test_header_layout() {
    let source = source();
    let plan = survey(&specs(), &source, &config(3, 2)).unwrap();
    let columns = plan.header.columns();

    assert_eq!(&columns[..3], ["gas", "power", "boiler.efficiency"]);
    assert_eq!(columns[3], ImpactMetric::Gwp.column());
    assert_eq!(columns.last().unwrap(), "sim_type");
    assert_eq!(columns.len(), 2 + 1 + 10 + 1);
    assert_eq!(plan.groups, ["fuel", "energy"]);
    assert!(!plan.is_identified());
}

#[test]
fn test_monte_carlo_reuses_model_across_parameter_draws() {
    let engine = engine();
    let source = source();
    let config = SessionConfig {
        base: false,
        range: false,
        ..config(3, 2)
    };

    let (_, _, rows) = run_session(&engine, &source, &config).unwrap();
    assert_eq!(rows.len(), 6);

    // One model per outer iteration, each used for both inner draws
    assert_eq!(engine.count(|c| matches!(c, Call::Build(_))), 3);
    let calls = engine.calls();
    for model in ["model-1", "model-2", "model-3"] {
        let uses = calls
            .iter()
            .filter(|c| matches!(c, Call::Calculate { model: m, .. } if m == model))
            .count();
        assert_eq!(uses, 2, "{model}");
    }
    assert!(engine.live_models().is_empty());

    // Sheets reload on every outer iteration, after the identify load
    assert_eq!(source.loads_of("gas"), 1 + 3);
    assert_eq!(source.loads_of("power"), 1 + 3);

    // Sampled parameter stays within its bounds
    for row in &rows {
        let value: f64 = row[2].parse().unwrap();
        assert!((0.8..=0.95).contains(&value), "{value}");
    }
}

#[test]
fn test_substitutions_reapplied_and_processes_cached() {
    let engine = engine();
    let source = source();
    let config = SessionConfig {
        monte_carlo: false,
        ..config(1, 1)
    };

    let (_, _, rows) = run_session(&engine, &source, &config).unwrap();
    assert_eq!(rows.len(), 4);

    // 4 model builds, 2 substitution rows each
    assert_eq!(engine.count(|c| matches!(c, Call::Build(_))), 4);
    assert_eq!(
        engine.count(|c| matches!(c, Call::Persist(id) if id.as_str() == "p-boiler")),
        8
    );
    // The boiler is fetched once; later rebuilds use the cached copy
    assert_eq!(
        engine.count(|c| matches!(c, Call::FetchProcess(id) if id.as_str() == "p-boiler")),
        1
    );

    // Last build ran with base providers, so the stored boiler is back on gas, US in MJ
    let boiler = engine.stored("p-boiler");
    let gas = boiler
        .exchanges
        .iter()
        .find(|e| e.flow.name == "natural gas, high pressure")
        .unwrap();
    assert_eq!(gas.unit.name, "MJ");
    assert_eq!(gas.amount, 38.0);
    assert_eq!(
        gas.default_provider.as_ref().map(|p| p.id.clone()),
        Some(ProcessId::from("p-gas-us"))
    );
}

#[test]
fn test_missing_sheet_during_monte_carlo_continues() {
    let engine = engine();
    let source = source();
    let config = SessionConfig {
        base: false,
        range: false,
        ..config(3, 2)
    };

    let mut session = Session::new(&engine, &source, &config, StdRng::seed_from_u64(3));
    let plan = session.identify(&specs()).unwrap();
    source.remove("power");

    let mut recorder = ResultRecorder::from_writer(Vec::new(), &plan.header).unwrap();
    let summary = session.run(&plan, &mut recorder).unwrap();

    assert_eq!(summary.runs_for("mca"), 6);
    assert_eq!(summary.skipped_picks, 3);
    assert_eq!(summary.skipped_substitutions, 0);

    // The unreadable sheet keeps its base provider
    let rows = parse_rows(&recorder.into_inner().unwrap());
    for row in &rows {
        assert!(!row[0].is_empty());
        assert_eq!(row[1], "grid, US");
    }
    assert_rows_match_model(&rows, &engine, 2);
}

#[test]
fn test_failed_pick_after_range_uses_base_provider() {
    let engine = engine();
    let source = source();
    let config = SessionConfig {
        base: false,
        ..config(3, 1)
    };

    let mut session = Session::new(&engine, &source, &config, StdRng::seed_from_u64(8));
    let plan = session.identify(&provider_specs()).unwrap();
    source.remove("power");
    let (summary, rows) = run_plan(&mut session, &plan);

    // Range left the boiler on grid, TX; Monte Carlo must not inherit it
    assert_eq!(summary.runs_for("range"), 2);
    assert_eq!(rows[1][..2], ["gas, US", "grid, TX"]);
    for row in &rows[2..] {
        assert_eq!(row[1], "grid, US");
    }
    assert_rows_match_model(&rows, &engine, 2);
    for providers in &engine.calculated_providers()[2..] {
        assert!(!providers.iter().any(|p| p == "grid, TX"), "{providers:?}");
    }
}

#[test]
fn test_sheet_without_base_row() {
    let engine = engine();
    let source = source().with_sheet(
        "power",
        vec![
            candidate("power", "p-grid-us", "grid, US", 70.0, Some(Mark::Low)),
            candidate("power", "p-grid-tx", "grid, TX", 30.0, Some(Mark::High)),
        ],
    );
    let config = config(2, 1);

    let mut session = Session::new(&engine, &source, &config, StdRng::seed_from_u64(4));
    let plan = session.identify(&provider_specs()).unwrap();
    let power = plan.sheet("power").unwrap();
    assert_eq!(power.base, None);
    assert_eq!(power.range.len(), 2);
    assert_eq!(
        power.problem,
        Some(InputDataError::MissingBaseCandidate {
            sheet: "power".to_string()
        })
    );
    // base + gas CA + both power alternatives + Monte Carlo
    assert_eq!(plan.runs.total(), 1 + 3 + 2);

    source.remove("power");
    let (summary, rows) = run_plan(&mut session, &plan);
    assert_eq!(rows.len(), 6);

    // Unassigned in base and in the gas range run
    assert_eq!(rows[0][..2], ["gas, US", ""]);
    assert_eq!(rows[1][..2], ["gas, CA", ""]);
    assert_eq!(rows[2][..2], ["gas, US", "grid, US"]);
    assert_eq!(rows[3][..2], ["gas, US", "grid, TX"]);
    for row in &rows[4..] {
        assert_eq!(row[1], "");
    }
    assert_eq!(summary.skipped_substitutions, 4);

    // Unassigned rows run on the original boiler, not on an earlier power pick
    assert_rows_match_model(&rows, &engine, 2);
    let calculated = engine.calculated_providers();
    for index in [0, 1, 4, 5] {
        assert!(
            !calculated[index].iter().any(|p| p.starts_with("grid")),
            "row {index}: {:?}",
            calculated[index]
        );
    }
    let boiler = engine.stored("p-boiler");
    let electricity = boiler
        .exchanges
        .iter()
        .find(|e| e.flow.name == "electricity")
        .unwrap();
    assert_eq!(electricity.default_provider, None);
    assert_eq!(electricity.amount, 0.2);
}

#[test]
fn test_several_base_rows_use_the_first() {
    let engine = engine();
    let source = source().with_sheet(
        "power",
        vec![
            candidate("power", "p-grid-tx", "grid, TX", 30.0, Some(Mark::Base)),
            candidate("power", "p-grid-us", "grid, US", 70.0, Some(Mark::Base)),
        ],
    );
    let config = SessionConfig {
        range: false,
        monte_carlo: false,
        ..config(1, 1)
    };

    let plan = survey(&provider_specs(), &source, &config).unwrap();
    let power = plan.sheet("power").unwrap();
    assert_eq!(power.base.as_ref().map(|b| b.name.as_str()), Some("grid, TX"));
    assert!(power.range.is_empty());
    assert_eq!(
        power.problem,
        Some(InputDataError::AmbiguousBaseCandidate {
            sheet: "power".to_string(),
            count: 2
        })
    );

    let mut session = Session::new(&engine, &source, &config, StdRng::seed_from_u64(2));
    let plan = session.identify(&provider_specs()).unwrap();
    let (_, rows) = run_plan(&mut session, &plan);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][..2], ["gas, US", "grid, TX"]);
    assert_rows_match_model(&rows, &engine, 2);
}

#[test]
fn test_range_candidates_equal_to_base_are_not_planned() {
    let engine = engine();
    let by_name = ProviderCandidate {
        process_id: None,
        ..candidate("power", "", "grid, US", 10.0, Some(Mark::High))
    };
    let source = source().with_sheet(
        "power",
        vec![
            candidate("power", "p-grid-us", "US grid mix", 70.0, Some(Mark::Base)),
            // Same process id as the base row
            candidate("power", "p-grid-us", "grid, US (dup)", 5.0, Some(Mark::Low)),
            // Resolves by name to the base process
            by_name,
            // Not in the model library
            candidate("power", "p-grid-mx", "grid, MX", 15.0, Some(Mark::High)),
        ],
    );
    let config = SessionConfig {
        monte_carlo: false,
        ..config(1, 1)
    };

    // Without the engine only the id duplicate is recognised
    let surveyed = survey(&provider_specs(), &source, &config).unwrap();
    let names: Vec<&str> = surveyed
        .sheet("power")
        .unwrap()
        .range
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, ["grid, US", "grid, MX"]);
    assert_eq!(surveyed.runs.total(), 1 + 1 + 2);

    let mut session = Session::new(&engine, &source, &config, StdRng::seed_from_u64(6));
    let plan = session.identify(&provider_specs()).unwrap();
    assert!(plan.sheet("power").unwrap().range.is_empty());
    assert_eq!(plan.runs.total(), 1 + 1);

    let progress = session.progress();
    let (_, rows) = run_plan(&mut session, &plan);
    assert_eq!(rows.len(), plan.runs.total());
    assert_eq!(progress.completed(), progress.total());
    assert_eq!(rows[0][1], "grid, US");
    assert_eq!(rows[1][..2], ["gas, CA", "grid, US"]);
}

#[test]
fn test_seeded_config_reproduces_session() {
    let config = config(3, 2).with_seed(7);
    let run = || {
        let engine = engine();
        let source = source();
        let mut session = Session::from_config(&engine, &source, &config);
        let plan = session.identify(&specs()).unwrap();
        run_plan(&mut session, &plan).1
    };

    let first = run();
    let second = run();
    assert_eq!(first.len(), 10);
    assert_eq!(first, second);
}

#[test]
fn test_range_values_come_from_parameter_definitions() {
    let source = source();
    let plan = survey(&specs(), &source, &config(1, 1)).unwrap();
    let efficiency = &plan.parameters[0];

    let high = efficiency.definition(Mark::High);
    assert_eq!(high.label(), "boiler.efficiency");
    assert_eq!(high.value, 0.95);
    assert_eq!(efficiency.definition(Mark::Low).value, 0.8);

    let redef = ParameterRedef::from(high);
    assert_eq!(redef.context.id, ProcessId::from("p-boiler"));
    assert_eq!(redef.name, "efficiency");
    assert_eq!(redef.value, 0.95);
}

#[test]
fn test_subgroup_runs_hold_other_factors_at_base() {
    let engine = engine();
    let source = source();
    let config = SessionConfig {
        base: false,
        range: false,
        monte_carlo: false,
        subgroup_monte_carlo: true,
        ..SessionConfig::default()
    }
    .with_loops(2, 2);

    let (plan, summary, rows) = run_session(&engine, &source, &config).unwrap();
    assert_eq!(plan.runs.total(), 8);
    assert_eq!(summary.runs_for("fuel"), 4);
    assert_eq!(summary.runs_for("energy"), 4);

    for row in &rows {
        match row.last().unwrap().as_str() {
            // Only the gas sheet varies; power and the parameter stay at base
            "fuel" => {
                assert_eq!(row[1], "grid, US");
                assert_eq!(row[2], "0.8");
            }
            // Power and the parameter vary; gas stays at base
            "energy" => assert_eq!(row[0], "gas, US"),
            other => panic!("unexpected sim_type {other}"),
        }
    }
}

#[test]
fn test_unknown_top_process_is_fatal() {
    let engine = FakeEngine::new();
    let source = source();
    let config = config(1, 1);

    let mut session = Session::new(&engine, &source, &config, StdRng::seed_from_u64(1));
    let err = session.identify(&specs()).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Lookup(LookupError::ProcessNotFound(ref id)) if id.as_str() == "p-boiler"
    ));
}

#[test]
fn test_no_active_rows_is_an_error() {
    let source = source();
    let mut rows = specs();
    rows.iter_mut().for_each(|r| r.skip = true);
    assert!(matches!(
        survey(&rows, &source, &SessionConfig::default()),
        Err(SessionError::NoSubstitutions)
    ));
}

#[test]
fn test_calculation_failure_is_fatal_and_model_deleted() {
    let engine = engine();
    let source = source();
    let config = config(2, 2);

    let mut session = Session::new(&engine, &source, &config, StdRng::seed_from_u64(5));
    let plan = session.identify(&specs()).unwrap();
    engine.fail_calculations.set(true);

    let mut recorder = ResultRecorder::from_writer(Vec::new(), &plan.header).unwrap();
    let err = session.run(&plan, &mut recorder).unwrap_err();

    assert!(matches!(
        err,
        SessionError::Calculation(CalculationError::Failed { .. })
    ));
    assert_eq!(recorder.rows(), 0);
    assert_eq!(engine.calls().last(), Some(&Call::Delete("model-1".to_string())));
    assert!(engine.live_models().is_empty());
}

#[test]
fn test_rejected_persist_skips_substitution_only() {
    let engine = engine();
    let source = source();
    let config = SessionConfig {
        range: false,
        monte_carlo: false,
        ..config(1, 1)
    };

    let mut session = Session::new(&engine, &source, &config, StdRng::seed_from_u64(9));
    let plan = session.identify(&specs()).unwrap();
    engine.reject_persist.set(true);

    let mut recorder = ResultRecorder::from_writer(Vec::new(), &plan.header).unwrap();
    let summary = session.run(&plan, &mut recorder).unwrap();
    assert_eq!(summary.runs_for("base"), 1);
    assert_eq!(summary.skipped_substitutions, 2);
}

#[test]
fn test_run_requires_identified_plan() {
    let engine = engine();
    let source = source();
    let config = config(1, 1);

    let plan = survey(&specs(), &source, &config).unwrap();
    let mut session = Session::new(&engine, &source, &config, StdRng::seed_from_u64(1));
    let mut recorder = ResultRecorder::from_writer(Vec::new(), &plan.header).unwrap();
    assert!(matches!(
        session.run(&plan, &mut recorder),
        Err(SessionError::Config(_))
    ));
}
