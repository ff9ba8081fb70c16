//! Aggregate convergence measures of one iterate

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Sums over all stages; recomputed every iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceIndex {
    /// Cost without the barrier
    pub cost: f64,
    /// Log-barrier cost
    pub cost_barrier: f64,
    /// l1 norm of the primal residuals
    pub primal_feasibility: f64,
    /// l1 norm of the Lagrangian gradient
    pub dual_feasibility: f64,
    /// Squared norm of all KKT residuals
    pub kkt_error: f64,
}

impl PerformanceIndex {
    pub fn total_cost(&self) -> f64 {
        self.cost + self.cost_barrier
    }
}

impl Add for PerformanceIndex {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for PerformanceIndex {
    fn add_assign(&mut self, rhs: Self) {
        self.cost += rhs.cost;
        self.cost_barrier += rhs.cost_barrier;
        self.primal_feasibility += rhs.primal_feasibility;
        self.dual_feasibility += rhs.dual_feasibility;
        self.kkt_error += rhs.kkt_error;
    }
}

impl Sum for PerformanceIndex {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl<'a> Sum<&'a PerformanceIndex> for PerformanceIndex {
    fn sum<I: Iterator<Item = &'a PerformanceIndex>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
