//! Parameter distributions and value picking
//!
//! Distribution strings come from the `sample` column of the substitution
//! table, e.g. `triangular; min=0.01; mode=0.0771; max=0.08; base=0.05`.
//! They are parsed once into a [`Distribution`] and then resolved to a value
//! in one of four modes: a random draw, or the deterministic base/low/high
//! values used by base and range runs.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::distr::Distribution as _;

use crate::error::InputDataError;

/// How to turn a distribution into a single value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueMode {
    /// Fresh random draw
    Sample,
    Base,
    Low,
    High,
}

/// Probability distribution of one parameter, with its analyst-chosen base value
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    Uniform {
        min: f64,
        max: f64,
        base: f64,
    },
    Triangular {
        min: f64,
        mode: f64,
        max: f64,
        base: f64,
    },
    Normal {
        mean: f64,
        sd: f64,
        base: f64,
    },
    /// Log-normal with `mu`/`sigma` of the underlying normal
    LogNormal {
        mu: f64,
        sigma: f64,
        base: f64,
    },
    /// Discrete uniform choice over `values`
    List {
        values: Vec<f64>,
        base: f64,
    },
}

impl Distribution {
    pub fn kind(&self) -> &'static str {
        match self {
            Distribution::Uniform { .. } => "uniform",
            Distribution::Triangular { .. } => "triangular",
            Distribution::Normal { .. } => "normal",
            Distribution::LogNormal { .. } => "lognormal",
            Distribution::List { .. } => "list",
        }
    }

    pub fn base(&self) -> f64 {
        match self {
            Distribution::Uniform { base, .. }
            | Distribution::Triangular { base, .. }
            | Distribution::Normal { base, .. }
            | Distribution::LogNormal { base, .. }
            | Distribution::List { base, .. } => *base,
        }
    }

    /// Lower bound used by range runs
    pub fn low(&self) -> f64 {
        match self {
            Distribution::Uniform { min, .. } | Distribution::Triangular { min, .. } => *min,
            Distribution::Normal { mean, sd, .. } => mean - sd,
            Distribution::LogNormal { mu, sigma, .. } => (mu - sigma).exp(),
            Distribution::List { values, .. } => {
                values.iter().copied().fold(f64::INFINITY, f64::min)
            }
        }
    }

    /// Upper bound used by range runs
    pub fn high(&self) -> f64 {
        match self {
            Distribution::Uniform { max, .. } | Distribution::Triangular { max, .. } => *max,
            Distribution::Normal { mean, sd, .. } => mean + sd,
            Distribution::LogNormal { mu, sigma, .. } => (mu + sigma).exp(),
            Distribution::List { values, .. } => {
                values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            }
        }
    }

    /// Draw one random value
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, InputDataError> {
        match self {
            Distribution::Uniform { min, max, .. } => {
                if min == max {
                    return Ok(*min);
                }
                rand::distr::Uniform::new_inclusive(*min, *max)
                    .map(|d| d.sample(rng))
                    .map_err(|e| self.invalid(e))
            }
            Distribution::Triangular { min, mode, max, .. } => {
                if min == max {
                    return Ok(*min);
                }
                rand_distr::Triangular::new(*min, *max, *mode)
                    .map(|d| d.sample(rng))
                    .map_err(|e| self.invalid(e))
            }
            Distribution::Normal { mean, sd, .. } => rand_distr::Normal::new(*mean, *sd)
                .map(|d| d.sample(rng))
                .map_err(|e| self.invalid(e)),
            Distribution::LogNormal { mu, sigma, .. } => rand_distr::LogNormal::new(*mu, *sigma)
                .map(|d| d.sample(rng))
                .map_err(|e| self.invalid(e)),
            Distribution::List { values, .. } => {
                if values.is_empty() {
                    return Err(self.invalid("no values to choose from"));
                }
                Ok(values[rng.random_range(0..values.len())])
            }
        }
    }

    /// Resolve to a value in the given mode
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        mode: ValueMode,
        rng: &mut R,
    ) -> Result<f64, InputDataError> {
        match mode {
            ValueMode::Sample => self.sample(rng),
            ValueMode::Base => Ok(self.base()),
            ValueMode::Low => Ok(self.low()),
            ValueMode::High => Ok(self.high()),
        }
    }

    fn validate(self, spec: &str) -> Result<Self, InputDataError> {
        let reason = match &self {
            Distribution::Uniform { min, max, .. } if min > max => Some("min exceeds max"),
            Distribution::Triangular { min, mode, max, .. } if !(min <= mode && mode <= max) => {
                Some("mode must lie within [min, max]")
            }
            Distribution::Normal { sd, .. } if !(*sd >= 0.0 && sd.is_finite()) => {
                Some("sd must be non-negative and finite")
            }
            Distribution::LogNormal { sigma, .. } if !(*sigma >= 0.0 && sigma.is_finite()) => {
                Some("sigma must be non-negative and finite")
            }
            Distribution::List { values, .. } if values.is_empty() => Some("list has no values"),
            _ => None,
        };
        match reason {
            Some(reason) => Err(invalid_spec(spec, reason)),
            None => Ok(self),
        }
    }

    fn invalid(&self, reason: impl fmt::Display) -> InputDataError {
        invalid_spec(&self.to_string(), reason)
    }
}

fn invalid_spec(spec: &str, reason: impl fmt::Display) -> InputDataError {
    InputDataError::InvalidDistributionSpec {
        spec: spec.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse one numeric argument, ignoring an optional `key=` prefix
fn parse_number(spec: &str, arg: &str) -> Result<f64, InputDataError> {
    let value = arg.split_once('=').map_or(arg, |(_, v)| v).trim();
    value
        .parse::<f64>()
        .map_err(|_| invalid_spec(spec, format_args!("{value:?} is not a number")))
}

impl FromStr for Distribution {
    type Err = InputDataError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let mut parts = spec.split(';').map(str::trim);
        let kind = parts.next().unwrap_or_default().to_ascii_lowercase();
        let args: Vec<&str> = parts.filter(|a| !a.is_empty()).collect();

        let numbers = |expected: usize| -> Result<Vec<f64>, InputDataError> {
            if args.len() != expected {
                return Err(invalid_spec(
                    spec,
                    format_args!("{kind} takes {expected} arguments, got {}", args.len()),
                ));
            }
            args.iter().map(|a| parse_number(spec, a)).collect()
        };

        let dist = match kind.as_str() {
            "uniform" => {
                let n = numbers(3)?;
                Distribution::Uniform {
                    min: n[0],
                    max: n[1],
                    base: n[2],
                }
            }
            "triangular" => {
                let n = numbers(4)?;
                Distribution::Triangular {
                    min: n[0],
                    mode: n[1],
                    max: n[2],
                    base: n[3],
                }
            }
            "normal" => {
                let n = numbers(3)?;
                Distribution::Normal {
                    mean: n[0],
                    sd: n[1],
                    base: n[2],
                }
            }
            "lognormal" => {
                let n = numbers(3)?;
                Distribution::LogNormal {
                    mu: n[0],
                    sigma: n[1],
                    base: n[2],
                }
            }
            "list" => {
                let Some((base, groups)) = args.split_last() else {
                    return Err(invalid_spec(spec, "list needs values and a base"));
                };
                let values = groups
                    .iter()
                    .flat_map(|g| {
                        let g = g.split_once('=').map_or(*g, |(_, v)| v);
                        g.split(',').map(str::trim).filter(|v| !v.is_empty())
                    })
                    .map(|v| parse_number(spec, v))
                    .collect::<Result<Vec<_>, _>>()?;
                Distribution::List {
                    values,
                    base: parse_number(spec, base)?,
                }
            }
            "" => return Err(invalid_spec(spec, "missing distribution kind")),
            other => {
                return Err(invalid_spec(
                    spec,
                    format_args!("unknown distribution kind {other:?}"),
                ));
            }
        };
        dist.validate(spec)
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Uniform { min, max, base } => {
                write!(f, "uniform; min={min}; max={max}; base={base}")
            }
            Distribution::Triangular {
                min,
                mode,
                max,
                base,
            } => write!(
                f,
                "triangular; min={min}; mode={mode}; max={max}; base={base}"
            ),
            Distribution::Normal { mean, sd, base } => {
                write!(f, "normal; mean={mean}; sd={sd}; base={base}")
            }
            Distribution::LogNormal { mu, sigma, base } => {
                write!(f, "lognormal; mu={mu}; sigma={sigma}; base={base}")
            }
            Distribution::List { values, base } => {
                let values: Vec<String> = values.iter().map(f64::to_string).collect();
                write!(f, "list; {}; base={base}", values.join(","))
            }
        }
    }
}

/// Parse a distribution string and resolve it in one step
pub fn resolve<R: Rng + ?Sized>(
    spec: &str,
    mode: ValueMode,
    rng: &mut R,
) -> Result<f64, InputDataError> {
    spec.parse::<Distribution>()?.resolve(mode, rng)
}
