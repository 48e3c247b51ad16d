//! Adaptive explicit ODE solver.
//!
//! Implements the Dormand-Prince 5(4) embedded Runge-Kutta pair with
//! first-same-as-last stage reuse, step size control from the embedded
//! fourth-order error estimate and the fourth-order continuous extension of
//! Hairer, Nørsett and Wanner for output at arbitrary times.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// System of first-order ordinary differential equations `dy/dt = f(t, y)`.
pub trait OdeSystem {
    /// Number of state variables.
    fn dim(&self) -> usize;

    /// Write `f(t, y)` into `dy`. Both slices have length [`OdeSystem::dim`].
    fn derivative(&self, t: f64, y: &[f64], dy: &mut [f64]);
}

/// Solver tolerances and step budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Relative tolerance.
    pub rtol: f64,
    /// Absolute tolerance.
    pub atol: f64,
    /// Maximum number of attempted steps.
    pub max_steps: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-3,
            atol: 1e-6,
            max_steps: 1_000_000,
        }
    }
}

/// Work done by the solver during one integration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolverStats {
    /// Number of derivative evaluations.
    pub nfev: usize,
    /// Number of attempted steps.
    pub nstep: usize,
    /// Number of accepted steps.
    pub naccpt: usize,
    /// Number of rejected steps.
    pub nrejct: usize,
}

/// Output of one integration.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Output times.
    pub t: Vec<f64>,
    /// State at each output time.
    pub y: Vec<Vec<f64>>,
    pub stats: SolverStats,
}

impl Solution {
    /// Last output time and state, if any output was produced.
    pub fn last(&self) -> Option<(f64, &[f64])> {
        Some((*self.t.last()?, self.y.last()?.as_slice()))
    }
}

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;
const ERROR_EXPONENT: f64 = -1.0 / 5.0;

const C: [f64; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];

const A: [[f64; 6]; 6] = [
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0],
    [
        19372.0 / 6561.0,
        -25360.0 / 2187.0,
        64448.0 / 6561.0,
        -212.0 / 729.0,
        0.0,
        0.0,
    ],
    [
        9017.0 / 3168.0,
        -355.0 / 33.0,
        46732.0 / 5247.0,
        49.0 / 176.0,
        -5103.0 / 18656.0,
        0.0,
    ],
];

// Fifth-order weights; also the coefficients of the last stage (FSAL).
const B: [f64; 7] = [
    35.0 / 384.0,
    0.0,
    500.0 / 1113.0,
    125.0 / 192.0,
    -2187.0 / 6784.0,
    11.0 / 84.0,
    0.0,
];

// Difference between the fifth- and fourth-order weights.
const E: [f64; 7] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

// Continuous extension weights.
const D: [f64; 7] = [
    -12715105075.0 / 11282082432.0,
    0.0,
    87487479700.0 / 32700410799.0,
    -10690763975.0 / 1880347072.0,
    701980252875.0 / 199316789632.0,
    -1453857185.0 / 822651844.0,
    69997945.0 / 29380423.0,
];

/// Dormand-Prince 5(4) solver.
///
/// The solver holds only its options; every call to [`Dopri5::integrate`]
/// owns its working memory, so one solver can serve concurrent integrations.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dopri5 {
    opts: SolverOptions,
}

impl Dopri5 {
    pub fn new(opts: SolverOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &SolverOptions {
        &self.opts
    }

    /// Integrate `system` from `(t0, y0)` up to `t_end`.
    ///
    /// With `t_eval` the solution is reported at exactly those times (which
    /// must be increasing and lie in `[t0, t_end]`), otherwise at every
    /// accepted step including both end points.
    pub fn integrate<S: OdeSystem + ?Sized>(
        &self,
        system: &S,
        t0: f64,
        t_end: f64,
        y0: &[f64],
        t_eval: Option<&[f64]>,
    ) -> Result<Solution> {
        let n = system.dim();
        if y0.len() != n {
            return Err(Error::invalid_input(format!(
                "state must have {n} elements, but has {}",
                y0.len()
            )));
        }
        if !(t_end > t0) {
            return Err(Error::invalid_input(format!(
                "time span must be increasing, but is ({t0}, {t_end})"
            )));
        }

        let mut stats = SolverStats::default();
        let mut out = Output::new(t_eval);

        let mut t = t0;
        let mut y = y0.to_vec();
        let mut k = vec![vec![0.0; n]; 7];
        let mut y_tmp = vec![0.0; n];
        let mut y_new = vec![0.0; n];
        let mut err = vec![0.0; n];

        system.derivative(t, &y, &mut k[0]);
        stats.nfev += 1;
        if !all_finite(&k[0]) {
            return Err(Error::integration_failure(t, "non-finite derivative"));
        }

        out.push_start(t, &y);

        let (k0, k_rest) = k.split_at_mut(1);
        let mut h = self.initial_step(system, t, t_end, &y, &k0[0], &mut y_tmp, &mut k_rest[0]);
        stats.nfev += 1;

        while t < t_end {
            let h_min = 10.0 * (next_up(t) - t);
            let mut step_rejected = false;

            // Retry the step with smaller sizes until the error is acceptable.
            let (t_new, h_done, factor) = loop {
                if stats.nstep >= self.opts.max_steps {
                    return Err(Error::integration_failure(
                        t,
                        format!("exceeded the budget of {} steps", self.opts.max_steps),
                    ));
                }
                if h < h_min {
                    return Err(Error::integration_failure(
                        t,
                        format!("step size {h:e} fell below the minimum {h_min:e}"),
                    ));
                }

                let last = t + h >= t_end;
                if last {
                    h = t_end - t;
                }
                let t_new = if last { t_end } else { t + h };

                for s in 1..6 {
                    for i in 0..n {
                        let incr: f64 = (0..s).map(|j| A[s][j] * k[j][i]).sum();
                        y_tmp[i] = y[i] + h * incr;
                    }
                    system.derivative(t + C[s] * h, &y_tmp, &mut k[s]);
                }
                for i in 0..n {
                    let incr: f64 = (0..6).map(|j| B[j] * k[j][i]).sum();
                    y_new[i] = y[i] + h * incr;
                }
                system.derivative(t_new, &y_new, &mut k[6]);
                stats.nfev += 6;
                stats.nstep += 1;

                for i in 0..n {
                    err[i] = h * (0..7).map(|j| E[j] * k[j][i]).sum::<f64>();
                }
                let err_norm = self.error_norm(&err, &y, &y_new);

                if err_norm.is_finite() && err_norm <= 1.0 {
                    let mut factor = if err_norm == 0.0 {
                        MAX_FACTOR
                    } else {
                        MAX_FACTOR.min(SAFETY * err_norm.powf(ERROR_EXPONENT))
                    };
                    if step_rejected {
                        factor = factor.min(1.0);
                    }
                    break (t_new, h, factor);
                }

                let factor = if err_norm.is_finite() {
                    MIN_FACTOR.max(SAFETY * err_norm.powf(ERROR_EXPONENT))
                } else {
                    MIN_FACTOR
                };
                h *= factor;
                step_rejected = true;
                stats.nrejct += 1;
            };

            out.push_step(t, t_new, h_done, &y, &y_new, &k);

            t = t_new;
            y.copy_from_slice(&y_new);
            k.swap(0, 6);
            h = h_done * factor;
            stats.naccpt += 1;
        }

        Ok(Solution {
            t: out.t,
            y: out.y,
            stats,
        })
    }

    fn error_norm(&self, err: &[f64], y: &[f64], y_new: &[f64]) -> f64 {
        let sum: f64 = err
            .iter()
            .zip(y.iter().zip(y_new))
            .map(|(e, (a, b))| {
                let scale = self.opts.atol + self.opts.rtol * a.abs().max(b.abs());
                (e / scale).powi(2)
            })
            .sum();
        (sum / err.len() as f64).sqrt()
    }

    /// Empirical starting step from Hairer, Nørsett and Wanner, section II.4.
    #[allow(clippy::too_many_arguments)]
    fn initial_step<S: OdeSystem + ?Sized>(
        &self,
        system: &S,
        t0: f64,
        t_end: f64,
        y0: &[f64],
        f0: &[f64],
        y1: &mut [f64],
        f1: &mut [f64],
    ) -> f64 {
        let span = t_end - t0;
        let scale: Vec<f64> = y0
            .iter()
            .map(|y| self.opts.atol + self.opts.rtol * y.abs())
            .collect();
        let d0 = rms(y0.iter().zip(&scale).map(|(y, s)| y / s));
        let d1 = rms(f0.iter().zip(&scale).map(|(f, s)| f / s));
        let h0 = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        };
        let h0 = h0.min(span);

        for i in 0..y0.len() {
            y1[i] = y0[i] + h0 * f0[i];
        }
        system.derivative(t0 + h0, y1, f1);
        let d2 = rms(f1.iter().zip(f0).zip(&scale).map(|((a, b), s)| (a - b) / s)) / h0;

        let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
            1e-6_f64.max(h0 * 1e-3)
        } else {
            (0.01 / d1.max(d2)).powf(1.0 / 5.0)
        };

        let h = (100.0 * h0).min(h1).min(span);
        if h.is_finite() && h > 0.0 { h } else { h0 }
    }
}

/// Collects the reported samples of one integration.
struct Output<'a> {
    t_eval: Option<&'a [f64]>,
    next: usize,
    t: Vec<f64>,
    y: Vec<Vec<f64>>,
}

impl<'a> Output<'a> {
    fn new(t_eval: Option<&'a [f64]>) -> Self {
        let capacity = t_eval.map_or(0, <[f64]>::len);
        Self {
            t_eval,
            next: 0,
            t: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
        }
    }

    fn push_start(&mut self, t0: f64, y0: &[f64]) {
        match self.t_eval {
            None => self.push(t0, y0.to_vec()),
            Some(t_eval) => {
                while self.next < t_eval.len() && t_eval[self.next] <= t0 {
                    self.push(t_eval[self.next], y0.to_vec());
                    self.next += 1;
                }
            }
        }
    }

    fn push_step(&mut self, t: f64, t_new: f64, h: f64, y: &[f64], y_new: &[f64], k: &[Vec<f64>]) {
        let Some(t_eval) = self.t_eval else {
            self.push(t_new, y_new.to_vec());
            return;
        };

        let mut dense: Option<DenseStep> = None;
        while self.next < t_eval.len() && t_eval[self.next] <= t_new {
            let te = t_eval[self.next];
            let state = if te == t_new {
                y_new.to_vec()
            } else {
                dense
                    .get_or_insert_with(|| DenseStep::new(t, h, y, y_new, k))
                    .eval(te)
            };
            self.push(te, state);
            self.next += 1;
        }
    }

    fn push(&mut self, t: f64, y: Vec<f64>) {
        self.t.push(t);
        self.y.push(y);
    }
}

/// Continuous extension over one accepted step.
struct DenseStep {
    t: f64,
    h: f64,
    r: [Vec<f64>; 5],
}

impl DenseStep {
    fn new(t: f64, h: f64, y: &[f64], y_new: &[f64], k: &[Vec<f64>]) -> Self {
        let n = y.len();
        let mut r = [
            y.to_vec(),
            vec![0.0; n],
            vec![0.0; n],
            vec![0.0; n],
            vec![0.0; n],
        ];
        for i in 0..n {
            let diff = y_new[i] - y[i];
            let bspl = h * k[0][i] - diff;
            r[1][i] = diff;
            r[2][i] = bspl;
            r[3][i] = diff - h * k[6][i] - bspl;
            r[4][i] = h * (0..7).map(|j| D[j] * k[j][i]).sum::<f64>();
        }
        Self { t, h, r }
    }

    fn eval(&self, te: f64) -> Vec<f64> {
        let theta = (te - self.t) / self.h;
        let theta1 = 1.0 - theta;
        (0..self.r[0].len())
            .map(|i| {
                self.r[0][i]
                    + theta
                        * (self.r[1][i]
                            + theta1
                                * (self.r[2][i]
                                    + theta * (self.r[3][i] + theta1 * self.r[4][i])))
            })
            .collect()
    }
}

fn rms(v: impl Iterator<Item = f64>) -> f64 {
    let (sum, len) = v.fold((0.0, 0usize), |(sum, len), x| (sum + x * x, len + 1));
    (sum / len.max(1) as f64).sqrt()
}

fn all_finite(v: &[f64]) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// Smallest representable value greater than `t`, for `t` finite.
fn next_up(t: f64) -> f64 {
    if t == 0.0 {
        return f64::from_bits(1);
    }
    let bits = t.to_bits();
    if t > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}
