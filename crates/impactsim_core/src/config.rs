//! Session configuration
//!
//! `SessionConfig` holds everything the orchestrator needs besides the input
//! tables: which phases run, how many Monte Carlo iterations, which LCIA
//! methods to compute, and how the engine links the supply chain.

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_loop_runs() -> usize {
    50
}

fn default_param_runs() -> usize {
    5
}

fn default_impact_methods() -> Vec<String> {
    vec!["TRACI 2.1 (openIMPACT)".to_string()]
}

/// How default providers declared on exchanges are used when linking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderLinking {
    #[default]
    PreferDefaults,
    OnlyDefaults,
    IgnoreDefaults,
}

/// Product-system linking options passed to the engine on every model build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkingConfig {
    #[serde(default = "default_true")]
    pub prefer_unit_processes: bool,
    #[serde(default)]
    pub provider_linking: ProviderLinking,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            prefer_unit_processes: true,
            provider_linking: ProviderLinking::PreferDefaults,
        }
    }
}

/// Complete session configuration
///
/// Every field has a default, so an empty YAML mapping is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Run the single all-base run
    #[serde(default = "default_true")]
    pub base: bool,
    /// Run one-factor-at-a-time low/high perturbations
    #[serde(default = "default_true")]
    pub range: bool,
    #[serde(default = "default_true")]
    pub monte_carlo: bool,
    /// Run Monte Carlo once per uncertainty group
    #[serde(default = "default_true")]
    pub subgroup_monte_carlo: bool,

    /// Outer Monte Carlo iterations (provider resample + model rebuild)
    #[serde(default = "default_loop_runs")]
    pub loop_runs: usize,
    /// Inner Monte Carlo iterations per outer iteration (parameter resample)
    #[serde(default = "default_param_runs")]
    pub param_runs: usize,

    #[serde(default = "default_impact_methods")]
    pub impact_methods: Vec<String>,

    /// Provider candidates outside these regions are never picked in Monte Carlo
    #[serde(default)]
    pub regions: Option<Vec<String>>,

    #[serde(default)]
    pub linking: LinkingConfig,

    /// Seed for reproducible sampling; entropy-seeded when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base: true,
            range: true,
            monte_carlo: true,
            subgroup_monte_carlo: true,
            loop_runs: default_loop_runs(),
            param_runs: default_param_runs(),
            impact_methods: default_impact_methods(),
            regions: None,
            linking: LinkingConfig::default(),
            seed: None,
        }
    }
}

impl SessionConfig {
    /// Region allow-list as a slice, if one is configured
    pub fn regions(&self) -> Option<&[String]> {
        self.regions.as_deref()
    }

    /// Monte Carlo runs per full pass (`loop_runs * param_runs`)
    pub fn monte_carlo_runs(&self) -> usize {
        self.loop_runs * self.param_runs
    }

    pub fn with_loops(mut self, loop_runs: usize, param_runs: usize) -> Self {
        self.loop_runs = loop_runs;
        self.param_runs = param_runs;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert!(config.base && config.range && config.monte_carlo && config.subgroup_monte_carlo);
        assert_eq!(config.monte_carlo_runs(), 250);
        assert_eq!(config.impact_methods, ["TRACI 2.1 (openIMPACT)"]);
        assert!(config.linking.prefer_unit_processes);
        assert_eq!(config.linking.provider_linking, ProviderLinking::PreferDefaults);
        assert!(config.regions().is_none());
    }

    #[test]
    fn test_builders() {
        let config = SessionConfig::default().with_loops(3, 2).with_seed(9);
        assert_eq!(config.monte_carlo_runs(), 6);
        assert_eq!(config.seed, Some(9));
    }
}
