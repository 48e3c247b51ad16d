//! Compartmental model definitions.

use crate::error::{Error, Result};
use crate::solver::OdeSystem;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Compartment of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compartment {
    /// Susceptible.
    S,
    /// Exposed (SEIR only).
    E,
    /// Infectious.
    I,
    /// Recovered.
    R,
}

impl Compartment {
    pub fn name(self) -> &'static str {
        match self {
            Compartment::S => "S",
            Compartment::E => "E",
            Compartment::I => "I",
            Compartment::R => "R",
        }
    }
}

impl fmt::Display for Compartment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const SIR_COMPARTMENTS: [Compartment; 3] = [Compartment::S, Compartment::I, Compartment::R];
const SEIR_COMPARTMENTS: [Compartment; 4] = [
    Compartment::S,
    Compartment::E,
    Compartment::I,
    Compartment::R,
];

/// Parameters of the SIR model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SirParams {
    /// Transmission rate.
    pub beta: f64,
    /// Birth and death rate.
    pub mu: f64,
    /// Recovery rate.
    pub gamma: f64,
    /// Total population.
    pub n: f64,
}

/// Parameters of the SEIR model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeirParams {
    /// Transmission rate.
    pub beta: f64,
    /// Birth and death rate.
    pub mu: f64,
    /// Incubation rate (inverse of the mean latent period).
    pub sigma: f64,
    /// Recovery rate.
    pub gamma: f64,
    /// Total population.
    pub n: f64,
}

/// Compartmental model together with its parameters.
///
/// Both variants share the demographic turnover `mu * (N - S)` into `S` and
/// the outflow `mu` from every other compartment, so with `mu = 0` the total
/// population is conserved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Model {
    Sir(SirParams),
    Seir(SeirParams),
}

impl Model {
    /// Compartments in state vector order.
    pub fn compartments(&self) -> &'static [Compartment] {
        match self {
            Model::Sir(_) => &SIR_COMPARTMENTS,
            Model::Seir(_) => &SEIR_COMPARTMENTS,
        }
    }

    /// Position of `compartment` in the state vector.
    pub fn index_of(&self, compartment: Compartment) -> Result<usize> {
        self.compartments()
            .iter()
            .position(|&c| c == compartment)
            .ok_or_else(|| {
                Error::invalid_input(format!("model {self} has no compartment {compartment}"))
            })
    }

    pub fn beta(&self) -> f64 {
        match self {
            Model::Sir(p) => p.beta,
            Model::Seir(p) => p.beta,
        }
    }

    pub fn gamma(&self) -> f64 {
        match self {
            Model::Sir(p) => p.gamma,
            Model::Seir(p) => p.gamma,
        }
    }

    /// Total population `N`.
    pub fn population(&self) -> f64 {
        match self {
            Model::Sir(p) => p.n,
            Model::Seir(p) => p.n,
        }
    }

    /// Copy of the model with the transmission rate replaced.
    pub fn with_beta(&self, beta: f64) -> Self {
        let mut model = *self;
        match &mut model {
            Model::Sir(p) => p.beta = beta,
            Model::Seir(p) => p.beta = beta,
        }
        model
    }

    /// Check the preconditions of the derivative: `N > 0` and finite rates.
    ///
    /// Negative rates are accepted; they are meaningless epidemiologically but
    /// remain the caller's responsibility.
    pub fn validate(&self) -> Result<()> {
        let rates = match self {
            Model::Sir(p) => vec![("beta", p.beta), ("mu", p.mu), ("gamma", p.gamma)],
            Model::Seir(p) => vec![
                ("beta", p.beta),
                ("mu", p.mu),
                ("sigma", p.sigma),
                ("gamma", p.gamma),
            ],
        };
        for (name, rate) in rates {
            if !rate.is_finite() {
                return Err(Error::invalid_input(format!(
                    "{name} must be finite, but is {rate}"
                )));
            }
        }
        let n = self.population();
        if !(n.is_finite() && n > 0.0) {
            return Err(Error::invalid_input(format!(
                "population must be positive and finite, but is {n}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Sir(_) => f.write_str("SIR"),
            Model::Seir(_) => f.write_str("SEIR"),
        }
    }
}

impl OdeSystem for Model {
    fn dim(&self) -> usize {
        self.compartments().len()
    }

    fn derivative(&self, _t: f64, y: &[f64], dy: &mut [f64]) {
        match self {
            Model::Sir(p) => sir_derivative(p, y, dy),
            Model::Seir(p) => seir_derivative(p, y, dy),
        }
    }
}

fn sir_derivative(p: &SirParams, y: &[f64], dy: &mut [f64]) {
    let (s, i, r) = (y[0], y[1], y[2]);
    let infection = p.beta * s * i / p.n;
    dy[0] = p.mu * (p.n - s) - infection;
    dy[1] = infection - (p.mu + p.gamma) * i;
    dy[2] = p.gamma * i - p.mu * r;
}

fn seir_derivative(p: &SeirParams, y: &[f64], dy: &mut [f64]) {
    let (s, e, i, r) = (y[0], y[1], y[2], y[3]);
    let infection = p.beta * s * i / p.n;
    dy[0] = p.mu * (p.n - s) - infection;
    dy[1] = infection - p.sigma * e;
    dy[2] = p.sigma * e - (p.mu + p.gamma) * i;
    dy[3] = p.gamma * i - p.mu * r;
}
