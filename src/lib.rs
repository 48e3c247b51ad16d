//! Integration of SIR and SEIR compartmental epidemic models.
//!
//! A [`Model`] pairs a compartmental structure with its parameters and
//! provides the derivative of the state. An [`Integrator`] drives an adaptive
//! Dormand-Prince solver over a model, either sampling a [`Trajectory`] at
//! fixed times or reading one compartment at a long horizon as an
//! approximation of the final epidemic size. [`sweep_r0`] repeats the latter
//! over a range of basic reproduction numbers.

pub mod engine;
pub mod error;
pub mod model;
pub mod solver;
pub mod sweep;
pub mod utils;

pub use engine::{Integrator, Record, Trajectory};
pub use error::{Error, Result};
pub use model::{Compartment, Model, SeirParams, SirParams};
pub use solver::{OdeSystem, SolverOptions};
pub use sweep::{FailurePolicy, SweepPoint, SweepResult, SweepSettings, sweep_r0};
