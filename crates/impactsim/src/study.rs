//! Study files
//!
//! A study is a YAML file naming the input tables, the results root and the
//! session configuration:
//!
//! ```yaml
//! substitution_table: inputs/substitutions.csv
//! providers_dir: inputs/providers
//! results_dir: results files
//! session:
//!   loop_runs: 100
//!   regions: [US, CA]
//! ```
//!
//! Relative paths are resolved against the directory holding the study file.

use std::path::{Path, PathBuf};

use color_eyre::eyre::WrapErr;
use impactsim_core::SessionConfig;
use serde::{Deserialize, Serialize};

fn default_results_dir() -> PathBuf {
    PathBuf::from("results files")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyFile {
    pub substitution_table: PathBuf,
    /// Directory holding one `<sheet>.csv` per provider sheet
    pub providers_dir: PathBuf,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default)]
    pub session: SessionConfig,
}

impl StudyFile {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_saphyr::Error> {
        serde_saphyr::from_str(yaml)
    }

    /// Read a study file and anchor its relative paths next to it
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading study file {}", path.display()))?;
        let study = Self::from_yaml(&yaml)
            .wrap_err_with(|| format!("parsing study file {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(study.relative_to(base))
    }

    fn relative_to(mut self, base: &Path) -> Self {
        for path in [
            &mut self.substitution_table,
            &mut self.providers_dir,
            &mut self.results_dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }
}
