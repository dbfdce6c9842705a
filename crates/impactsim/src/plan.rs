//! Offline commands: `plan` and `sample`

use std::fmt;
use std::path::{Path, PathBuf};

use impactsim_core::distribution::Distribution;
use impactsim_core::session::SheetPlan;
use impactsim_core::{ResultsLayout, SessionPlan, ValueMode, provider_shares, survey};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::study::StudyFile;
use crate::tables::{CsvProviderDirectory, load_substitution_table};

/// Human-readable summary of a surveyed session plan
pub struct PlanReport<'a> {
    plan: &'a SessionPlan,
    regions: Option<&'a [String]>,
}

impl<'a> PlanReport<'a> {
    pub fn new(plan: &'a SessionPlan, regions: Option<&'a [String]>) -> Self {
        Self { plan, regions }
    }

    fn write_sheet(&self, f: &mut fmt::Formatter<'_>, sheet: &SheetPlan) -> fmt::Result {
        write!(f, "  {}", sheet.name)?;
        if !sheet.groups.is_empty() {
            write!(f, " [{}]", sheet.groups.join(", "))?;
        }
        writeln!(f)?;
        if let Some(problem) = &sheet.problem {
            writeln!(f, "    ! {problem}")?;
        }

        let shares = match provider_shares(&sheet.name, &sheet.candidates, self.regions) {
            Ok(shares) => shares,
            Err(e) => {
                writeln!(f, "    ! {e}")?;
                Vec::new()
            }
        };
        for candidate in &sheet.candidates {
            let mark = candidate.mark.map_or("", |m| m.as_str());
            let share = shares
                .iter()
                .find(|(c, _)| std::ptr::eq(*c, candidate))
                .map_or_else(|| "-".to_string(), |(_, s)| format!("{:.2}%", s * 100.0));
            writeln!(f, "    {:<40} {:<5} {:>8}", candidate.name, mark, share)?;
        }
        Ok(())
    }
}

impl fmt::Display for PlanReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plan = self.plan;
        writeln!(f, "process: {} ({})", plan.top.name, plan.top.id)?;

        writeln!(f, "\nprovider sheets:")?;
        for sheet in &plan.sheets {
            self.write_sheet(f, sheet)?;
        }

        writeln!(f, "\nparameters:")?;
        if plan.parameters.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for p in &plan.parameters {
            let d = &p.distribution;
            writeln!(
                f,
                "  {:<40} {:<10} base={} low={} high={}",
                p.label,
                d.kind(),
                d.base(),
                d.low(),
                d.high()
            )?;
        }

        writeln!(f, "\nheader:\n  {}", plan.header.columns().join(", "))?;
        writeln!(f, "\nruns:")?;
        for line in plan.runs.to_string().lines() {
            writeln!(f, "  {line}")?;
        }
        Ok(())
    }
}

/// `impactsim plan`: survey the study inputs without an engine
pub fn plan_command(study_path: &Path, copy_inputs: bool) -> color_eyre::Result<()> {
    let study = StudyFile::load(study_path)?;
    let specs = load_substitution_table(&study.substitution_table)?;
    let source = CsvProviderDirectory::new(&study.providers_dir);
    let plan = survey(&specs, &source, &study.session)?;

    print!("{}", PlanReport::new(&plan, study.session.regions()));

    let layout = ResultsLayout::new(&study.results_dir, &plan.top.name);
    println!("\nresults: {}", layout.results_path().display());

    if copy_inputs {
        let sheets: Vec<PathBuf> = plan
            .sheets
            .iter()
            .map(|s| source.sheet_path(&s.name))
            .collect();
        let copied = layout.copy_inputs(&study.substitution_table, &sheets)?;
        println!("inputs:  {copied} files copied to {}", layout.debug_dir().display());
    }
    Ok(())
}

/// Base/low/high and `draws` samples of one distribution string
pub fn sample_report(spec: &str, draws: usize, seed: Option<u64>) -> color_eyre::Result<String> {
    let dist: Distribution = spec.parse()?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut out = format!(
        "{dist}\nbase={} low={} high={}\n",
        dist.base(),
        dist.low(),
        dist.high()
    );
    for _ in 0..draws {
        let value = dist.resolve(ValueMode::Sample, &mut rng)?;
        out.push_str(&format!("{value}\n"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use impactsim_core::SessionConfig;

    fn write_study(dir: &Path) -> PathBuf {
        let providers = dir.join("providers");
        std::fs::create_dir_all(&providers).unwrap();
        std::fs::write(
            dir.join("subs.csv"),
            "uuid,name,parameter,sample,uf_group,provider_sheet,find_flow,skip\n\
             p-boiler,boiler,,,fuel,gas,natural gas,\n\
             p-boiler,boiler,efficiency,triangular; min=0.7; mode=0.85; max=0.9; base=0.85,fuel,,,\n",
        )
        .unwrap();
        std::fs::write(
            providers.join("gas.csv"),
            "process_uuid,name,mark,amount,region\n\
             p-gas-us,gas US,base,75,US\n\
             p-gas-ca,gas CA,low,25,CA\n",
        )
        .unwrap();

        let study = dir.join("study.yaml");
        std::fs::write(
            &study,
            "substitution_table: subs.csv\nproviders_dir: providers\nsession:\n  loop_runs: 4\n  param_runs: 2\n",
        )
        .unwrap();
        study
    }

    #[test]
    fn test_plan_report() {
        let dir = tempfile::tempdir().unwrap();
        let study = StudyFile::load(&write_study(dir.path())).unwrap();
        let specs = load_substitution_table(&study.substitution_table).unwrap();
        let source = CsvProviderDirectory::new(&study.providers_dir);
        let plan = survey(&specs, &source, &study.session).unwrap();

        let report = PlanReport::new(&plan, None).to_string();
        assert!(report.contains("process: boiler (p-boiler)"));
        assert!(report.contains("gas [fuel]"));
        assert!(report.contains("75.00%"));
        assert!(report.contains("25.00%"));
        assert!(report.contains("boiler.efficiency"));
        assert!(report.contains("base=0.85 low=0.7 high=0.9"));
        assert!(report.contains("gas, boiler.efficiency, gwp,"));
        // base 1 + range (1 provider, 2 parameter marks) + MC 8 + one group 8
        assert!(report.contains("total:       20"));
    }

    #[test]
    fn test_region_filter_hides_shares() {
        let dir = tempfile::tempdir().unwrap();
        let study = StudyFile::load(&write_study(dir.path())).unwrap();
        let specs = load_substitution_table(&study.substitution_table).unwrap();
        let source = CsvProviderDirectory::new(&study.providers_dir);
        let plan = survey(&specs, &source, &SessionConfig::default()).unwrap();

        let us = ["US".to_string()];
        let report = PlanReport::new(&plan, Some(&us)).to_string();
        assert!(report.contains("100.00%"));
        assert!(!report.contains("25.00%"));
    }

    #[test]
    fn test_plan_command_copies_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let study = write_study(dir.path());
        plan_command(&study, true).unwrap();

        let raw = dir.path().join("results files").join("boiler").join("raw");
        let debug_dirs: Vec<_> = std::fs::read_dir(&raw)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with("input debug"))
            .collect();
        assert_eq!(debug_dirs.len(), 1);
        assert!(debug_dirs[0].path().join("subs.csv").is_file());
    }

    #[test]
    fn test_sample_report_is_reproducible() {
        let spec = "uniform; min=1; max=2; base=1.5";
        let a = sample_report(spec, 5, Some(11)).unwrap();
        let b = sample_report(spec, 5, Some(11)).unwrap();
        assert_eq!(a, b);

        let lines: Vec<&str> = a.lines().collect();
        assert_eq!(lines.len(), 2 + 5);
        assert_eq!(lines[1], "base=1.5 low=1 high=2");
        for line in &lines[2..] {
            let v: f64 = line.parse().unwrap();
            assert!((1.0..=2.0).contains(&v));
        }
    }

    #[test]
    fn test_sample_report_rejects_bad_spec() {
        assert!(sample_report("gamma; k=2", 3, Some(1)).is_err());
    }
}
