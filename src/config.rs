use anyhow::{Context, Result, bail};
use epidyn::{Compartment, FailurePolicy, Model, OdeSystem, SolverOptions};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Model kind and parameters.
    pub model: Model,
    /// Initial condition.
    pub init: InitConfig,
    /// Solver tolerances and step budget.
    #[serde(default)]
    pub solver: SolverOptions,
    /// Sampling grid of the trajectory.
    #[serde(default)]
    pub trace: TraceConfig,
    /// Reproduction number sweep.
    #[serde(default)]
    pub sweep: SweepConfig,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitConfig {
    /// Initial state, one value per compartment in model order.
    pub state: Vec<f64>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraceConfig {
    /// Start of the time span.
    pub t_min: f64,
    /// End of the time span (excluded from the samples).
    pub t_max: f64,
    /// Spacing between samples.
    pub t_step: f64,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            t_min: 0.0,
            t_max: 26.0,
            t_step: 0.1,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    /// Smallest reproduction number.
    pub r0_min: f64,
    /// Largest reproduction number.
    pub r0_max: f64,
    /// Number of evenly spaced values between `r0_min` and `r0_max`.
    pub n_points: usize,
    /// End of every integration.
    pub horizon: f64,
    /// Compartment read at the horizon.
    pub compartment: Compartment,
    /// Behaviour on a failed integration.
    pub on_failure: FailurePolicy,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            r0_min: 0.1,
            r0_max: 5.0,
            n_points: 50,
            horizon: 1e5,
            compartment: Compartment::I,
            on_failure: FailurePolicy::Abort,
        }
    }
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.model.validate().context("invalid model")?;
        check_vec(&self.init.state, self.model.dim()).context("invalid initial state")?;

        check_num(self.solver.rtol, 1e-14..1.0).context("invalid relative tolerance")?;
        check_num(self.solver.atol, 0.0..1.0).context("invalid absolute tolerance")?;
        check_num(self.solver.max_steps, 1..=100_000_000).context("invalid step budget")?;

        check_num(self.trace.t_min, 0.0..1e9).context("invalid trace start")?;
        check_num(self.trace.t_max, self.trace.t_min..1e9)
            .and_then(|()| check_gt(self.trace.t_max, self.trace.t_min))
            .context("invalid trace end")?;
        check_num(self.trace.t_step, f64::MIN_POSITIVE..=self.trace.t_max - self.trace.t_min)
            .context("invalid trace step")?;
        check_num((self.trace.t_max - self.trace.t_min) / self.trace.t_step, 1.0..=1e7)
            .context("too many trace samples")?;

        check_num(self.sweep.r0_min, 0.0..1e3).context("invalid minimum R0")?;
        check_num(self.sweep.r0_max, self.sweep.r0_min..1e3).context("invalid maximum R0")?;
        check_num(self.sweep.n_points, 1..=100_000).context("invalid number of sweep points")?;
        check_num(self.sweep.horizon, self.trace.t_min..1e12)
            .and_then(|()| check_gt(self.sweep.horizon, self.trace.t_min))
            .context("invalid sweep horizon")?;
        self.model
            .index_of(self.sweep.compartment)
            .context("invalid sweep compartment")?;

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_gt(num: f64, bound: f64) -> Result<()> {
    if num <= bound {
        bail!("number must be greater than {bound}, but is {num}");
    }
    Ok(())
}

fn check_vec(vec: &[f64], exp_len: usize) -> Result<()> {
    // Ensure vector has expected length.
    let len = vec.len();
    if len != exp_len {
        bail!("vector length must be {exp_len}, but is {len}");
    }
    if vec.iter().any(|&ele| !(ele >= 0.0 && ele.is_finite())) {
        bail!("vector must have only finite non-negative elements");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEIR_CONFIG: &str = r#"
[model]
kind = "seir"
beta = 2.0
mu = 0.0
sigma = 1.0
gamma = 0.5
n = 1.0

[init]
state = [0.999, 0.0, 0.001, 0.0]
"#;

    fn parse(contents: &str) -> Result<Config> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn defaults_follow_reference_scenario() {
        let config = parse(SEIR_CONFIG).unwrap();
        assert_eq!(config.trace, TraceConfig::default());
        assert_eq!(config.sweep.n_points, 50);
        assert_eq!(config.sweep.horizon, 1e5);
        assert_eq!(config.sweep.compartment, Compartment::I);
        assert_eq!(config.solver, SolverOptions::default());
    }

    #[test]
    fn sections_override_defaults() {
        let contents = String::from(SEIR_CONFIG)
            + "[solver]\nrtol = 1e-6\n"
            + "[sweep]\ncompartment = \"R\"\non_failure = \"record\"\nn_points = 10\n";
        let config = parse(&contents).unwrap();
        assert_eq!(config.solver.rtol, 1e-6);
        assert_eq!(config.solver.atol, 1e-6);
        assert_eq!(config.sweep.compartment, Compartment::R);
        assert_eq!(config.sweep.on_failure, FailurePolicy::Record);
        assert_eq!(config.sweep.n_points, 10);
    }

    #[test]
    fn rejects_state_of_wrong_length() {
        let contents = SEIR_CONFIG.replace("[0.999, 0.0, 0.001, 0.0]", "[0.999, 0.001, 0.0]");
        assert!(parse(&contents).is_err());
    }

    #[test]
    fn rejects_reversed_trace_span() {
        let contents = String::from(SEIR_CONFIG) + "[trace]\nt_min = 10.0\nt_max = 5.0\n";
        assert!(parse(&contents).is_err());
    }

    #[test]
    fn rejects_tiny_trace_step() {
        for t_step in ["1e-300", "1e-9"] {
            let contents = String::from(SEIR_CONFIG) + "[trace]\nt_step = " + t_step + "\n";
            assert!(parse(&contents).is_err(), "t_step = {t_step} was accepted");
        }
        let contents = String::from(SEIR_CONFIG) + "[trace]\nt_step = 1e-5\n";
        assert!(parse(&contents).is_ok());
    }

    #[test]
    fn rejects_exposed_compartment_for_sir() {
        let contents = r#"
[model]
kind = "sir"
beta = 2.0
mu = 0.0
gamma = 0.5
n = 1.0

[init]
state = [0.999, 0.001, 0.0]

[sweep]
compartment = "E"
"#;
        assert!(parse(contents).is_err());
    }
}
