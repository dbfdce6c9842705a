//! CSV input tables
//!
//! The substitution table lists what to modify; each provider sheet lives in
//! its own `<providers_dir>/<sheet>.csv` file.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use impactsim_core::model::{
    FlowMatchset, Mark, ProcessId, ProviderCandidate, SubstitutionSpec,
};
use impactsim_core::{InputDataError, ProviderSource};
use serde::Deserialize;

/// Raw substitution table row
#[derive(Debug, Deserialize)]
struct SubstitutionRow {
    uuid: String,
    name: String,
    parameter: Option<String>,
    sample: Option<String>,
    uf_group: Option<String>,
    provider_sheet: Option<String>,
    find_flow: Option<String>,
    skip: Option<String>,
}

/// Raw provider sheet row
#[derive(Debug, Deserialize)]
struct ProviderRow {
    process_uuid: Option<String>,
    name: String,
    location: Option<String>,
    mark: Option<String>,
    amount: Option<f64>,
    region: Option<String>,
    skip: Option<String>,
}

/// Blank or whitespace-only cells are absent values
fn cell(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_skipped(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("yes"))
}

fn reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input)
}

fn schema_error(table: &str, err: impl std::fmt::Display) -> InputDataError {
    InputDataError::Schema {
        table: table.to_string(),
        reason: err.to_string(),
    }
}

/// Parse a substitution table
pub fn parse_substitution_table<R: Read>(
    input: R,
) -> Result<Vec<SubstitutionSpec>, InputDataError> {
    let mut specs = Vec::new();
    for (line, row) in reader(input).deserialize::<SubstitutionRow>().enumerate() {
        let row = row.map_err(|e| schema_error("substitution", e))?;
        let uuid = row.uuid.trim();
        if uuid.is_empty() {
            return Err(schema_error(
                "substitution",
                format_args!("row {} has no process uuid", line + 1),
            ));
        }
        specs.push(SubstitutionSpec {
            process_id: ProcessId::from(uuid),
            process_name: row.name.trim().to_string(),
            parameter: cell(row.parameter),
            sample: cell(row.sample),
            uncertainty_group: cell(row.uf_group),
            provider_sheet: cell(row.provider_sheet),
            find_flow: cell(row.find_flow)
                .map(|f| FlowMatchset::parse(&f))
                .unwrap_or_default(),
            skip: is_skipped(row.skip.as_deref()),
        });
    }
    Ok(specs)
}

/// Parse one provider sheet
pub fn parse_provider_sheet<R: Read>(
    sheet: &str,
    input: R,
) -> Result<Vec<ProviderCandidate>, InputDataError> {
    reader(input)
        .deserialize::<ProviderRow>()
        .map(|row| -> Result<ProviderCandidate, InputDataError> {
            let row = row.map_err(|e| schema_error(sheet, e))?;
            let mark = cell(row.mark).map(|m| m.parse::<Mark>()).transpose()?;
            Ok(ProviderCandidate {
                sheet: sheet.to_string(),
                process_id: cell(row.process_uuid).map(ProcessId::new),
                name: row.name.trim().to_string(),
                location: cell(row.location),
                amount: row.amount,
                mark,
                region: cell(row.region),
                skip: is_skipped(row.skip.as_deref()),
            })
        })
        .collect()
}

pub fn load_substitution_table(path: &Path) -> Result<Vec<SubstitutionSpec>, InputDataError> {
    let file = File::open(path).map_err(|e| {
        schema_error(
            "substitution",
            format_args!("cannot open {}: {e}", path.display()),
        )
    })?;
    let specs = parse_substitution_table(file)?;
    tracing::info!(path = %path.display(), rows = specs.len(), "Substitution table loaded");
    Ok(specs)
}

/// Provider sheets stored as one CSV file per sheet
#[derive(Debug, Clone)]
pub struct CsvProviderDirectory {
    dir: PathBuf,
}

impl CsvProviderDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn sheet_path(&self, sheet: &str) -> PathBuf {
        self.dir.join(format!("{sheet}.csv"))
    }
}

impl ProviderSource for CsvProviderDirectory {
    fn load_sheet(&self, sheet: &str) -> Result<Vec<ProviderCandidate>, InputDataError> {
        let path = self.sheet_path(sheet);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Provider sheet not readable");
                return Err(InputDataError::MissingProviderSheet(sheet.to_string()));
            }
        };
        let candidates = parse_provider_sheet(sheet, file)?;
        tracing::debug!(sheet, candidates = candidates.len(), "Provider sheet loaded");
        Ok(candidates)
    }
}
