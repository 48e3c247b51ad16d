//! Final size as a function of the basic reproduction number.

use crate::engine::Integrator;
use crate::error::Result;
use crate::model::{Compartment, Model};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// What to do when the integration of a sweep point fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the sweep and return the error.
    #[default]
    Abort,
    /// Mark the point as failed and keep going.
    Record,
}

/// Settings shared by every point of a sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepSettings {
    /// Start of every integration.
    pub t_start: f64,
    /// End of every integration, standing in for the asymptotic state.
    pub horizon: f64,
    /// Compartment read at the horizon.
    pub compartment: Compartment,
    pub on_failure: FailurePolicy,
}

/// Outcome of one sweep point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub r0: f64,
    /// Transmission rate used, `r0 * gamma`.
    pub beta: f64,
    /// Value of the read compartment at the horizon, or `None` if the
    /// integration failed and the failure was recorded.
    pub final_size: Option<f64>,
}

/// Final sizes in the order of the swept values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    pub compartment: Compartment,
    pub points: Vec<SweepPoint>,
}

impl SweepResult {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// `(r0, final_size)` pairs in sweep order.
    pub fn pairs(&self) -> impl Iterator<Item = (f64, Option<f64>)> + '_ {
        self.points.iter().map(|p| (p.r0, p.final_size))
    }

    /// Number of points whose integration failed.
    pub fn n_failed(&self) -> usize {
        self.points.iter().filter(|p| p.final_size.is_none()).count()
    }
}

/// Integrate `model` to the horizon once per value in `r0_values`, each time
/// with `beta = r0 * gamma` and every other parameter unchanged.
///
/// Points are independent; with the `parallel` feature they are evaluated on
/// the rayon thread pool. The result keeps the order of `r0_values`.
///
/// # Errors
/// With [`FailurePolicy::Abort`], returns the error of a failing point.
/// With [`FailurePolicy::Record`], invalid input for the whole sweep (such as
/// a compartment missing from the model) is still returned as an error.
pub fn sweep_r0(
    integrator: &Integrator,
    model: &Model,
    initial_state: &[f64],
    r0_values: &[f64],
    settings: &SweepSettings,
) -> Result<SweepResult> {
    model.index_of(settings.compartment)?;

    let gamma = model.gamma();
    let n_points = r0_values.len();
    let n_done = AtomicUsize::new(0);

    let eval = |&r0: &f64| -> Result<SweepPoint> {
        let beta = r0 * gamma;
        let outcome = integrator.final_size(
            &model.with_beta(beta),
            initial_state,
            settings.t_start,
            settings.horizon,
            settings.compartment,
        );

        let done = n_done.fetch_add(1, Ordering::Relaxed) + 1;
        if done % 10 == 0 || done == n_points {
            let progress = 100.0 * done as f64 / n_points as f64;
            log::info!("completed {progress:06.2}%");
        }

        let final_size = match (outcome, settings.on_failure) {
            (Ok(val), _) => Some(val),
            (Err(err), FailurePolicy::Abort) => return Err(err),
            (Err(err), FailurePolicy::Record) => {
                log::warn!("sweep point r0 = {r0} failed: {err}");
                None
            }
        };

        Ok(SweepPoint {
            r0,
            beta,
            final_size,
        })
    };

    #[cfg(feature = "parallel")]
    let points = r0_values.par_iter().map(eval).collect::<Result<Vec<_>>>()?;
    #[cfg(not(feature = "parallel"))]
    let points = r0_values.iter().map(eval).collect::<Result<Vec<_>>>()?;

    Ok(SweepResult {
        compartment: settings.compartment,
        points,
    })
}
