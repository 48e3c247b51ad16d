//! Integration driver.

use crate::error::{Error, Result};
use crate::model::{Compartment, Model};
use crate::solver::{Dopri5, OdeSystem, Solution, SolverOptions};
use serde::{Deserialize, Serialize};

/// State of a model sampled at increasing times.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    compartments: &'static [Compartment],
    times: Vec<f64>,
    states: Vec<Vec<f64>>,
}

/// One value of a trajectory in long format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub time: f64,
    pub state: Compartment,
    pub number: f64,
}

impl Trajectory {
    pub fn compartments(&self) -> &'static [Compartment] {
        self.compartments
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn states(&self) -> &[Vec<f64>] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Iterate over `(time, state)` samples in time order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &[f64])> {
        self.times
            .iter()
            .zip(&self.states)
            .map(|(&t, y)| (t, y.as_slice()))
    }

    /// Values of one compartment over time.
    pub fn series(&self, compartment: Compartment) -> Option<Vec<f64>> {
        let idx = self.compartments.iter().position(|&c| c == compartment)?;
        Some(self.states.iter().map(|y| y[idx]).collect())
    }

    /// Reshape into long format: one record per time and compartment,
    /// ordered by time and then by compartment.
    pub fn to_records(&self) -> Vec<Record> {
        self.iter()
            .flat_map(|(time, y)| {
                self.compartments
                    .iter()
                    .zip(y)
                    .map(move |(&state, &number)| Record {
                        time,
                        state,
                        number,
                    })
            })
            .collect()
    }
}

/// Integrates models with an adaptive Dormand-Prince solver.
///
/// Holds no state between calls, so one integrator can be shared across
/// threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct Integrator {
    solver: Dopri5,
}

impl Integrator {
    pub fn new(opts: SolverOptions) -> Self {
        Self {
            solver: Dopri5::new(opts),
        }
    }

    pub fn options(&self) -> &SolverOptions {
        self.solver.options()
    }

    /// Integrate over `t_span` and report the state at each of `sample_times`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if the time span is empty or reversed,
    /// if the initial state does not match the model, or if the sample times
    /// are not strictly increasing inside `t_span`. Returns
    /// [`Error::IntegrationFailure`] if the solver gives up.
    pub fn trace(
        &self,
        model: &Model,
        initial_state: &[f64],
        t_span: (f64, f64),
        sample_times: &[f64],
    ) -> Result<Trajectory> {
        check_inputs(model, initial_state, t_span)?;
        check_sample_times(sample_times, t_span)?;

        let sol = self.solve(model, initial_state, t_span, Some(sample_times))?;

        Ok(Trajectory {
            compartments: model.compartments(),
            times: sol.t,
            states: sol.y,
        })
    }

    /// Integrate from `t_start` up to `horizon` and return the value of
    /// `compartment` at the end.
    ///
    /// The horizon stands in for the asymptotic state: there is no check that
    /// the dynamics have settled, so a horizon that is too short silently
    /// yields a value that is still changing.
    ///
    /// # Errors
    /// Same as [`Integrator::trace`], plus [`Error::InvalidInput`] if the
    /// model has no such compartment.
    pub fn final_size(
        &self,
        model: &Model,
        initial_state: &[f64],
        t_start: f64,
        horizon: f64,
        compartment: Compartment,
    ) -> Result<f64> {
        let idx = model.index_of(compartment)?;
        check_inputs(model, initial_state, (t_start, horizon))?;

        // Only the terminal state is kept, not every accepted step.
        let sol = self.solve(model, initial_state, (t_start, horizon), Some(&[horizon]))?;

        let (_, y) = sol
            .last()
            .ok_or_else(|| Error::integration_failure(t_start, "solver produced no output"))?;
        Ok(y[idx])
    }

    fn solve(
        &self,
        model: &Model,
        initial_state: &[f64],
        (t_min, t_max): (f64, f64),
        t_eval: Option<&[f64]>,
    ) -> Result<Solution> {
        let sol = self
            .solver
            .integrate(model, t_min, t_max, initial_state, t_eval)?;

        let stats = &sol.stats;
        log::debug!(
            "integrated {model} (beta = {}) over [{t_min}, {t_max}]: {} evaluations, {} accepted and {} rejected steps",
            model.beta(),
            stats.nfev,
            stats.naccpt,
            stats.nrejct,
        );

        Ok(sol)
    }
}

fn check_inputs(model: &Model, initial_state: &[f64], (t_min, t_max): (f64, f64)) -> Result<()> {
    model.validate()?;

    if !(t_min.is_finite() && t_max.is_finite() && t_min < t_max) {
        return Err(Error::invalid_input(format!(
            "time span must be finite and increasing, but is ({t_min}, {t_max})"
        )));
    }

    let dim = model.dim();
    if initial_state.len() != dim {
        return Err(Error::invalid_input(format!(
            "{model} initial state must have {dim} elements, but has {}",
            initial_state.len()
        )));
    }
    if let Some(val) = initial_state.iter().find(|val| !val.is_finite()) {
        return Err(Error::invalid_input(format!(
            "initial state must be finite, but contains {val}"
        )));
    }

    Ok(())
}

fn check_sample_times(sample_times: &[f64], (t_min, t_max): (f64, f64)) -> Result<()> {
    if let Some(t) = sample_times.iter().find(|t| !(t_min..=t_max).contains(*t)) {
        return Err(Error::invalid_input(format!(
            "sample time {t} is outside the time span ({t_min}, {t_max})"
        )));
    }
    if let Some(w) = sample_times.windows(2).find(|w| w[0] >= w[1]) {
        return Err(Error::invalid_input(format!(
            "sample times must be strictly increasing, but {} is followed by {}",
            w[0], w[1]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SeirParams, SirParams};
    use crate::utils::arange;
    use approx::assert_abs_diff_eq;

    fn sir() -> Model {
        Model::Sir(SirParams {
            beta: 2.0,
            mu: 0.0,
            gamma: 0.5,
            n: 1.0,
        })
    }

    fn seir() -> Model {
        Model::Seir(SeirParams {
            beta: 2.0,
            mu: 0.0,
            sigma: 1.0,
            gamma: 0.5,
            n: 1.0,
        })
    }

    #[test]
    fn trace_reports_every_sample() {
        let times = arange(0.0, 26.0, 0.1);
        let traj = Integrator::default()
            .trace(&sir(), &[0.999, 0.001, 0.0], (0.0, 26.0), &times)
            .unwrap();
        assert_eq!(traj.len(), 260);
        assert_eq!(traj.times(), times.as_slice());
        assert_eq!(traj.states()[0], vec![0.999, 0.001, 0.0]);
    }

    #[test]
    fn records_are_long_format() {
        let traj = Integrator::default()
            .trace(&seir(), &[0.999, 0.0, 0.001, 0.0], (0.0, 2.0), &[0.0, 1.0, 2.0])
            .unwrap();
        let records = traj.to_records();
        assert_eq!(records.len(), 12);
        assert_eq!(records[0].state, Compartment::S);
        assert_eq!(records[3].state, Compartment::R);
        assert_eq!(records[4].time, 1.0);
        assert_eq!(records[4].state, Compartment::S);
        assert_eq!(records[2].number, 0.001);
    }

    #[test]
    fn series_selects_compartment() {
        let traj = Integrator::default()
            .trace(&sir(), &[0.999, 0.001, 0.0], (0.0, 1.0), &[0.0, 1.0])
            .unwrap();
        let i = traj.series(Compartment::I).unwrap();
        assert_eq!(i.len(), 2);
        assert_eq!(i[0], 0.001);
        assert!(traj.series(Compartment::E).is_none());
    }

    #[test]
    fn final_size_burns_out() {
        let integrator = Integrator::default();
        let y0 = [0.999, 0.001, 0.0];
        let i_end = integrator
            .final_size(&sir(), &y0, 0.0, 1e5, Compartment::I)
            .unwrap();
        let r_end = integrator
            .final_size(&sir(), &y0, 0.0, 1e5, Compartment::R)
            .unwrap();
        assert_abs_diff_eq!(i_end, 0.0, epsilon = 1e-4);
        assert!(r_end > 0.9);
    }

    #[test]
    fn final_size_keeps_only_terminal_state() {
        let integrator = Integrator::default();
        let y0 = [0.999, 0.001, 0.0];
        let span = (0.0, 1e5);

        let terminal = integrator.solve(&sir(), &y0, span, Some(&[span.1])).unwrap();
        assert_eq!(terminal.t, vec![span.1]);
        assert_eq!(terminal.y.len(), 1);

        let every_step = integrator.solve(&sir(), &y0, span, None).unwrap();
        assert!(every_step.t.len() > 2);
        assert_eq!(terminal.stats, every_step.stats);
        let (_, y_end) = every_step.last().unwrap();
        assert_eq!(terminal.y[0].as_slice(), y_end);

        let r_end = integrator
            .final_size(&sir(), &y0, span.0, span.1, Compartment::R)
            .unwrap();
        assert_eq!(r_end, y_end[2]);
    }

    #[test]
    fn rejects_invalid_input() {
        let integrator = Integrator::default();
        let y0 = [0.999, 0.001, 0.0];
        let invalid = |res: Result<Trajectory>| matches!(res, Err(Error::InvalidInput(_)));

        assert!(invalid(integrator.trace(&sir(), &y0, (1.0, 1.0), &[1.0])));
        assert!(invalid(integrator.trace(&sir(), &y0, (2.0, 1.0), &[1.5])));
        assert!(invalid(integrator.trace(&sir(), &[0.5, 0.5], (0.0, 1.0), &[0.5])));
        assert!(invalid(integrator.trace(&sir(), &y0, (0.0, 1.0), &[0.5, 1.5])));
        assert!(invalid(integrator.trace(&sir(), &y0, (0.0, 1.0), &[0.5, 0.5])));
        assert!(invalid(integrator.trace(&sir(), &[f64::NAN, 0.0, 0.0], (0.0, 1.0), &[0.5])));
        assert!(matches!(
            integrator.final_size(&sir(), &y0, 0.0, 10.0, Compartment::E),
            Err(Error::InvalidInput(_))
        ));
    }
}
