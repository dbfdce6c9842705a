//! Input tables: substitution rows, provider candidates, parameter definitions
//!
//! All of these are read-only once loaded. The orchestrator derives its
//! per-run assignments from them but never edits them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ids::ProcessId;
use crate::error::InputDataError;

/// Role of a provider candidate or parameter value in base/range runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mark {
    Base,
    Low,
    High,
}

impl Mark {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mark::Base => "base",
            Mark::Low => "low",
            Mark::High => "high",
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mark {
    type Err = InputDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base" => Ok(Mark::Base),
            "low" => Ok(Mark::Low),
            "high" => Ok(Mark::High),
            other => Err(InputDataError::Schema {
                table: "provider".to_string(),
                reason: format!("unknown mark {other:?}"),
            }),
        }
    }
}

/// Set of flow names that identify the exchanges to rebind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowMatchset(Vec<String>);

impl FlowMatchset {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// Parse a `find_flow` cell.
    ///
    /// Cells list quoted names separated by `", "`, e.g.
    /// `"natural gas", "natural gas, at plant"`. Names may themselves contain
    /// commas, so splitting only happens between quotes. A cell without
    /// quotes is a single name.
    pub fn parse(cell: &str) -> Self {
        let cell = cell.trim();
        if !cell.contains('"') {
            return if cell.is_empty() {
                Self::default()
            } else {
                Self(vec![cell.to_string()])
            };
        }
        let names = cell
            .split("\", \"")
            .map(|part| part.trim().trim_matches('"').trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        Self(names)
    }

    pub fn contains(&self, flow_name: &str) -> bool {
        self.0.iter().any(|n| n == flow_name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for FlowMatchset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(" | "))
    }
}

/// One row of the substitution table
#[derive(Debug, Clone, PartialEq)]
pub struct SubstitutionSpec {
    /// Process whose exchanges are modified, or the context of `parameter`
    pub process_id: ProcessId,
    pub process_name: String,
    /// Parameter to redefine in the context process
    pub parameter: Option<String>,
    /// Distribution string for `parameter`, e.g. `normal; mean=1; sd=0.1; base=1`
    pub sample: Option<String>,
    /// Uncertainty group tag used by subgroup Monte Carlo
    pub uncertainty_group: Option<String>,
    /// Provider sheet supplying the substituted flow
    pub provider_sheet: Option<String>,
    pub find_flow: FlowMatchset,
    pub skip: bool,
}

impl SubstitutionSpec {
    /// Header label of the parameter, `"{context}.{parameter}"`
    pub fn parameter_label(&self) -> Option<String> {
        self.parameter
            .as_ref()
            .map(|p| format!("{}.{}", self.process_name, p))
    }
}

/// One row of a provider sheet
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCandidate {
    pub sheet: String,
    /// Process UUID; when absent the provider is resolved by `name`
    pub process_id: Option<ProcessId>,
    pub name: String,
    pub location: Option<String>,
    /// Production amount used as market-share weight
    pub amount: Option<f64>,
    pub mark: Option<Mark>,
    pub region: Option<String>,
    pub skip: bool,
}

/// A parameter value at one mark, resolved from its distribution
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDefinition {
    pub context_id: ProcessId,
    pub context_name: String,
    pub parameter: String,
    pub mark: Mark,
    pub value: f64,
}

impl ParameterDefinition {
    pub fn label(&self) -> String {
        format!("{}.{}", self.context_name, self.parameter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matchset_parses_quoted_names_with_commas() {
        let set = FlowMatchset::parse(r#""natural gas", "natural gas, at plant""#);
        assert_eq!(set.names(), ["natural gas", "natural gas, at plant"]);
        assert!(set.contains("natural gas, at plant"));
        assert!(!set.contains("natural gas, at"));
    }

    #[test]
    fn test_matchset_single_unquoted_name() {
        let set = FlowMatchset::parse("electricity, medium voltage");
        assert_eq!(set.names(), ["electricity, medium voltage"]);
        assert!(FlowMatchset::parse("  ").is_empty());
    }

    #[test]
    fn test_mark_parse() {
        assert_eq!(" Base ".parse::<Mark>().unwrap(), Mark::Base);
        assert_eq!("HIGH".parse::<Mark>().unwrap(), Mark::High);
        assert!("medium".parse::<Mark>().is_err());
    }
}
