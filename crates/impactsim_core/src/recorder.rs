//! Append-only results file
//!
//! One CSV file per session. The header is written once when the file is
//! created; every completed run appends exactly one row and flushes it
//! before returning, so an abnormal exit loses at most the run in flight.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::RecorderError;
use crate::model::{ImpactMetric, RunRecord};

/// Column layout of the results file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordHeader {
    pub provider_sheets: Vec<String>,
    /// Parameter labels, `"{context}.{parameter}"`
    pub parameters: Vec<String>,
}

impl RecordHeader {
    pub fn new(provider_sheets: Vec<String>, parameters: Vec<String>) -> Self {
        Self {
            provider_sheets,
            parameters,
        }
    }

    /// Sheets, then parameters, then impact metrics, then `sim_type`
    pub fn columns(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.column_count());
        columns.extend(self.provider_sheets.iter().cloned());
        columns.extend(self.parameters.iter().cloned());
        columns.extend(ImpactMetric::ALL.iter().map(|m| m.column().to_string()));
        columns.push("sim_type".to_string());
        columns
    }

    pub fn column_count(&self) -> usize {
        self.provider_sheets.len() + self.parameters.len() + ImpactMetric::ALL.len() + 1
    }
}

pub struct ResultRecorder<W: Write> {
    writer: csv::Writer<W>,
    columns: usize,
    rows: usize,
}

impl ResultRecorder<File> {
    /// Create the results file (and its parent directories) and write the header
    pub fn create(path: &Path, header: &RecordHeader) -> Result<Self, RecorderError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        tracing::info!(
            path = %path.display(),
            columns = header.column_count(),
            "Results file created"
        );
        Self::from_writer(file, header)
    }
}

impl<W: Write> ResultRecorder<W> {
    pub fn from_writer(inner: W, header: &RecordHeader) -> Result<Self, RecorderError> {
        let mut writer = csv::WriterBuilder::new().from_writer(inner);
        writer.write_record(header.columns())?;
        writer.flush()?;
        Ok(Self {
            writer,
            columns: header.column_count(),
            rows: 0,
        })
    }

    /// Write one record and flush it.
    ///
    /// A record whose field count differs from the header is rejected before
    /// anything is written.
    pub fn append(&mut self, record: &RunRecord) -> Result<(), RecorderError> {
        let fields = record.fields();
        if fields.len() != self.columns {
            return Err(RecorderError::FieldCount {
                expected: self.columns,
                actual: fields.len(),
            });
        }
        self.writer.write_record(&fields)?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Rows appended so far, excluding the header
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn into_inner(self) -> Result<W, RecorderError> {
        self.writer
            .into_inner()
            .map_err(|e| RecorderError::Io(io::Error::new(e.error().kind(), e.error().to_string())))
    }
}

/// Where a session writes its results and input snapshots.
///
/// ```text
/// {root}/{process}/raw/{process} {yymmdd-HHMM}.csv
/// {root}/{process}/raw/{process} {yymmdd-HHMM} input debug/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsLayout {
    raw_dir: PathBuf,
    stem: String,
}

impl ResultsLayout {
    pub fn new(root: impl AsRef<Path>, process_name: &str) -> Self {
        Self::at(root, process_name, jiff::Zoned::now().datetime())
    }

    pub fn at(root: impl AsRef<Path>, process_name: &str, when: jiff::civil::DateTime) -> Self {
        let stamp = when.strftime("%y%m%d-%H%M");
        Self {
            raw_dir: root.as_ref().join(process_name).join("raw"),
            stem: format!("{process_name} {stamp}"),
        }
    }

    pub fn results_path(&self) -> PathBuf {
        self.raw_dir.join(format!("{}.csv", self.stem))
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.raw_dir.join(format!("{} input debug", self.stem))
    }

    /// Snapshot the input tables next to the results file.
    ///
    /// The substitution table must exist. Missing provider tables are
    /// logged and skipped, matching how the session treats missing sheets.
    pub fn copy_inputs(
        &self,
        substitution_table: &Path,
        provider_tables: &[PathBuf],
    ) -> Result<usize, RecorderError> {
        let debug_dir = self.debug_dir();
        fs::create_dir_all(&debug_dir)?;

        let mut copied = 0;
        for (source, required) in std::iter::once((substitution_table, true))
            .chain(provider_tables.iter().map(|p| (p.as_path(), false)))
        {
            let Some(file_name) = source.file_name() else {
                continue;
            };
            match fs::copy(source, debug_dir.join(file_name)) {
                Ok(_) => copied += 1,
                Err(e) if !required && e.kind() == io::ErrorKind::NotFound => {
                    tracing::warn!(path = %source.display(), "Input table missing; not copied");
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!(dir = %debug_dir.display(), copied, "Input tables copied");
        Ok(copied)
    }
}
