//! Per-stage data of one inequality-constraint component

use nalgebra::{DMatrix, DVector};

/// Slack, dual and residuals of one constraint component at one stage
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintComponentData {
    pub slack: DVector<f64>,
    pub dual: DVector<f64>,
    pub dslack: DVector<f64>,
    pub ddual: DVector<f64>,
    /// Primal residual `s − g`
    pub residual: DVector<f64>,
    /// Complementarity residual `s ∘ ψ − μ`
    pub cmpl: DVector<f64>,
    /// Condensing coefficient
    pub cond: DVector<f64>,
    /// Constraint value `g`
    pub value: DVector<f64>,
    /// Jacobian of `g` over the stage layout
    pub jacobian: DMatrix<f64>,
}

impl ConstraintComponentData {
    pub fn new(dim: usize, stage_dim: usize) -> Self {
        Self {
            slack: DVector::from_element(dim, 1.0),
            dual: DVector::from_element(dim, 1.0),
            dslack: DVector::zeros(dim),
            ddual: DVector::zeros(dim),
            residual: DVector::zeros(dim),
            cmpl: DVector::zeros(dim),
            cond: DVector::zeros(dim),
            value: DVector::zeros(dim),
            jacobian: DMatrix::zeros(dim, stage_dim),
        }
    }

    pub fn dim(&self) -> usize {
        self.slack.len()
    }

    /// Squared residual and complementarity norms.
    pub fn kkt_error(&self) -> f64 {
        self.residual.norm_squared() + self.cmpl.norm_squared()
    }

    pub fn primal_feasibility(&self) -> f64 {
        self.residual.iter().map(|r| r.abs()).sum()
    }

    /// Strict positivity of slack and dual.
    pub fn is_positive(&self) -> bool {
        self.slack.iter().chain(self.dual.iter()).all(|&x| x > 0.0)
    }
}
