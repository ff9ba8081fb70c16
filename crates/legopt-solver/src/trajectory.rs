//! Planned trajectory representation and interpolation
//!
//! Snapshot of the solver output used by a tracking loop running faster
//! than the optimizer: linear state interpolation between grid points and
//! zero-order-hold control with LQR feedback.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use legopt_core::{GridInfo, GridType, RobotModel};

use crate::riccati::LqrPolicy;
use crate::solution::SplitSolution;

/// A planned trajectory from the OCP solver
///
/// Knot `i` is grid point `i`. An impulse knot shares its time with the
/// following knot and carries no control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedTrajectory {
    /// Time stamps for each knot [s]
    pub times: Vec<f64>,
    pub configurations: Vec<DVector<f64>>,
    pub velocities: Vec<DVector<f64>>,
    /// Control of every non-terminal knot (empty at impulse knots)
    pub controls: Vec<DVector<f64>>,
    /// Feedback policy of every non-terminal knot
    pub policies: Vec<LqrPolicy>,
    /// Impulse flag of every non-terminal knot
    pub is_impulse: Vec<bool>,
    /// Generation timestamp (for staleness detection)
    pub generated_at: f64,
    /// Whether the trajectory is valid/feasible
    pub is_valid: bool,
}

impl PlannedTrajectory {
    /// Create an empty trajectory
    pub fn empty() -> Self {
        Self {
            times: Vec::new(),
            configurations: Vec::new(),
            velocities: Vec::new(),
            controls: Vec::new(),
            policies: Vec::new(),
            is_impulse: Vec::new(),
            generated_at: 0.0,
            is_valid: false,
        }
    }

    /// Copy the solver output over `grid`.
    pub fn from_solution(
        grid: &[GridInfo],
        solutions: &[SplitSolution],
        policies: &[LqrPolicy],
        generated_at: f64,
        is_valid: bool,
    ) -> Self {
        let n = policies.len();
        Self {
            times: grid.iter().map(|g| g.t).collect(),
            configurations: solutions.iter().map(|s| s.q.clone()).collect(),
            velocities: solutions.iter().map(|s| s.v.clone()).collect(),
            controls: grid
                .iter()
                .zip(solutions)
                .take(n)
                .map(|(g, s)| match g.grid_type {
                    GridType::Impulse => DVector::zeros(0),
                    _ => s.u.clone(),
                })
                .collect(),
            policies: policies.to_vec(),
            is_impulse: grid
                .iter()
                .take(n)
                .map(|g| g.grid_type == GridType::Impulse)
                .collect(),
            generated_at,
            is_valid,
        }
    }

    pub fn start_time(&self) -> Option<f64> {
        self.times.first().copied()
    }

    pub fn end_time(&self) -> Option<f64> {
        self.times.last().copied()
    }

    /// Older than `max_age` at time `now`.
    pub fn is_stale(&self, now: f64, max_age: f64) -> bool {
        now - self.generated_at > max_age
    }

    /// Time left until the end of the horizon.
    pub fn remaining_duration(&self, now: f64) -> f64 {
        self.end_time().map_or(0.0, |end| (end - now).max(0.0))
    }

    /// Interpolate `(q, v)` at time `t`, clamped to the horizon.
    ///
    /// The configuration is interpolated on the robot's manifold. At an
    /// impulse time the post-impulse state is returned.
    pub fn interpolate_state(
        &self,
        robot: &dyn RobotModel,
        t: f64,
    ) -> Option<(DVector<f64>, DVector<f64>)> {
        if self.times.is_empty() || !self.is_valid {
            return None;
        }
        let last = self.times.len() - 1;
        if t <= self.times[0] {
            return Some((self.configurations[0].clone(), self.velocities[0].clone()));
        }
        if t >= self.times[last] {
            return Some((self.configurations[last].clone(), self.velocities[last].clone()));
        }

        // Bracketing knots with a positive duration
        let idx = self.times.partition_point(|&time| time <= t).saturating_sub(1);
        let (t0, t1) = (self.times[idx], self.times[idx + 1]);
        let alpha = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };

        let (q0, q1) = (&self.configurations[idx], &self.configurations[idx + 1]);
        let dq = robot.subtract_configuration(q1, q0);
        let q = robot.integrate_configuration(q0, &dq, alpha);
        let v = self.velocities[idx].lerp(&self.velocities[idx + 1], alpha);
        Some((q, v))
    }

    /// Index of the regular knot whose interval contains `t`
    /// (zero-order hold; clamped to the first and last regular knot).
    pub fn control_index(&self, t: f64) -> Option<usize> {
        let n = self.controls.len();
        if n == 0 || !self.is_valid {
            return None;
        }
        let idx = self
            .times
            .partition_point(|&time| time <= t)
            .saturating_sub(1)
            .min(n - 1);
        (0..=idx)
            .rev()
            .chain(idx + 1..n)
            .find(|&k| !self.is_impulse[k])
    }

    /// Feedforward control at time `t`.
    pub fn interpolate_control(&self, t: f64) -> Option<DVector<f64>> {
        self.control_index(t).map(|k| self.controls[k].clone())
    }

    /// `u = u_k + K_k (x ⊖ x_k)` for the measured state `(q, v)` at time `t`.
    pub fn control_at(
        &self,
        robot: &dyn RobotModel,
        t: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
    ) -> Option<DVector<f64>> {
        let k = self.control_index(t)?;
        let nv = robot.dimv();
        let mut dx = DVector::zeros(2 * nv);
        dx.rows_mut(0, nv)
            .copy_from(&robot.subtract_configuration(q, &self.configurations[k]));
        dx.rows_mut(nv, nv).copy_from(&(v - &self.velocities[k]));
        Some(&self.controls[k] + &self.policies[k].gain * dx)
    }
}
