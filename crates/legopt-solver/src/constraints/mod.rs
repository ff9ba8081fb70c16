//! Inequality constraints
//!
//! Each component contributes rows `g(z) ≥ 0` at regular or impulse stages.
//! The [`Constraints`] container owns the component list together with the
//! interior-point parameters and runs the primal-dual lifecycle on the
//! per-stage [`ConstraintsData`].

pub mod component_data;
pub mod friction_cone;
pub mod joint_limit;
pub mod pdipm;

pub use component_data::ConstraintComponentData;
pub use friction_cone::{FrictionCone, ImpulseFrictionCone};
pub use joint_limit::{JointLimit, JointLimitSide, JointLimitTarget};

use std::fmt;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use legopt_core::robot::ContactStatus;
use legopt_core::RobotModel;

use crate::error::SolverError;
use crate::kkt::{SplitKktMatrix, SplitKktResidual, StageLayout};
use crate::solution::SplitSolution;

/// Stage kind a component applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Regular stages (contact forces are the stage contact forces)
    Stage,
    /// Impulse stages (contact forces are the impulses)
    Impulse,
}

/// One family of inequality constraints `g(z) ≥ 0`
pub trait ConstraintComponent: Send + Sync + fmt::Debug {
    fn kind(&self) -> ConstraintKind;

    /// Number of rows for the given contact status.
    fn dim(&self, robot: &dyn RobotModel, status: &ContactStatus) -> usize;

    /// Check the component against the robot dimensions.
    fn validate(&self, _robot: &dyn RobotModel) -> Result<(), SolverError> {
        Ok(())
    }

    /// Write `g(z)` into `value` and, when requested, its Jacobian over the
    /// stage layout into `jacobian`.
    fn evaluate(
        &self,
        robot: &dyn RobotModel,
        status: &ContactStatus,
        layout: &StageLayout,
        s: &SplitSolution,
        value: &mut DVector<f64>,
        jacobian: Option<&mut DMatrix<f64>>,
    );
}

/// Slack and dual data of every component at one stage
#[derive(Debug, Clone, Default)]
pub struct ConstraintsData {
    pub components: Vec<ConstraintComponentData>,
    /// Index into [`Constraints`] of each data entry
    component_indices: Vec<usize>,
}

impl ConstraintsData {
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn num_constraints(&self) -> usize {
        self.components.iter().map(|c| c.dim()).sum()
    }

    pub fn log_barrier(&self, barrier: f64) -> f64 {
        self.components
            .iter()
            .map(|c| pdipm::log_barrier(barrier, &c.slack))
            .sum()
    }

    pub fn primal_feasibility(&self) -> f64 {
        self.components.iter().map(|c| c.primal_feasibility()).sum()
    }

    pub fn kkt_error(&self) -> f64 {
        self.components.iter().map(|c| c.kkt_error()).sum()
    }

    pub fn is_positive(&self) -> bool {
        self.components.iter().all(|c| c.is_positive())
    }

    /// Directional derivative of the log barrier along the slack direction.
    pub fn barrier_directional_derivative(&self, barrier: f64) -> f64 {
        -barrier
            * self
                .components
                .iter()
                .flat_map(|c| c.dslack.iter().zip(c.slack.iter()))
                .map(|(ds, s)| ds / s)
                .sum::<f64>()
    }
}

/// Constraint components shared by all stages, with the barrier parameter
/// and fraction-to-boundary rule
#[derive(Debug, Clone)]
pub struct Constraints {
    components: Vec<Arc<dyn ConstraintComponent>>,
    barrier: f64,
    fraction_to_boundary_rule: f64,
}

impl Constraints {
    /// `barrier > 0` and `fraction_to_boundary_rule ∈ (0, 1)`.
    pub fn new(barrier: f64, fraction_to_boundary_rule: f64) -> Result<Self, SolverError> {
        let mut constraints = Self {
            components: Vec::new(),
            barrier: 1e-3,
            fraction_to_boundary_rule: 0.995,
        };
        constraints.set_barrier(barrier)?;
        constraints.set_fraction_to_boundary_rule(fraction_to_boundary_rule)?;
        Ok(constraints)
    }

    pub fn push(&mut self, component: impl ConstraintComponent + 'static) {
        self.components.push(Arc::new(component));
    }

    pub fn push_shared(&mut self, component: Arc<dyn ConstraintComponent>) {
        self.components.push(component);
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn barrier(&self) -> f64 {
        self.barrier
    }

    pub fn set_barrier(&mut self, barrier: f64) -> Result<(), SolverError> {
        if !(barrier > 0.0) || !barrier.is_finite() {
            return Err(SolverError::InvalidConfig(format!(
                "barrier parameter must be positive, got {barrier}"
            )));
        }
        self.barrier = barrier;
        Ok(())
    }

    pub fn fraction_to_boundary_rule(&self) -> f64 {
        self.fraction_to_boundary_rule
    }

    pub fn set_fraction_to_boundary_rule(&mut self, rule: f64) -> Result<(), SolverError> {
        if !(rule > 0.0 && rule < 1.0) {
            return Err(SolverError::InvalidConfig(format!(
                "fraction-to-boundary rule must lie in (0, 1), got {rule}"
            )));
        }
        self.fraction_to_boundary_rule = rule;
        Ok(())
    }

    pub fn validate(&self, robot: &dyn RobotModel) -> Result<(), SolverError> {
        self.components.iter().try_for_each(|c| c.validate(robot))
    }

    /// Allocate data for the components of `kind`.
    pub fn create_data(
        &self,
        robot: &dyn RobotModel,
        status: &ContactStatus,
        layout: &StageLayout,
        kind: ConstraintKind,
    ) -> ConstraintsData {
        let mut data = ConstraintsData::default();
        for (i, component) in self.components.iter().enumerate() {
            if component.kind() != kind {
                continue;
            }
            let dim = component.dim(robot, status);
            if dim == 0 {
                continue;
            }
            data.components
                .push(ConstraintComponentData::new(dim, layout.dim()));
            data.component_indices.push(i);
        }
        data
    }

    pub fn is_feasible(
        &self,
        robot: &dyn RobotModel,
        status: &ContactStatus,
        layout: &StageLayout,
        data: &ConstraintsData,
        s: &SplitSolution,
    ) -> bool {
        data.component_indices
            .iter()
            .zip(&data.components)
            .all(|(&i, d)| {
                let mut value = DVector::zeros(d.dim());
                self.components[i].evaluate(robot, status, layout, s, &mut value, None);
                value.iter().all(|&g| g >= 0.0)
            })
    }

    /// Initialize slack and dual from the current constraint values.
    pub fn set_slack_and_dual(
        &self,
        robot: &dyn RobotModel,
        status: &ContactStatus,
        layout: &StageLayout,
        data: &mut ConstraintsData,
        s: &SplitSolution,
    ) {
        for (&i, d) in data.component_indices.iter().zip(data.components.iter_mut()) {
            self.components[i].evaluate(robot, status, layout, s, &mut d.value, None);
            pdipm::set_slack_and_dual_positive(self.barrier, d);
        }
    }

    /// Evaluate values, Jacobians and residuals, and add `−Gᵀψ` to the
    /// Lagrangian gradient.
    pub fn linearize(
        &self,
        robot: &dyn RobotModel,
        status: &ContactStatus,
        layout: &StageLayout,
        data: &mut ConstraintsData,
        s: &SplitSolution,
        kkt_residual: &mut SplitKktResidual,
    ) {
        for (&i, d) in data.component_indices.iter().zip(data.components.iter_mut()) {
            d.jacobian.fill(0.0);
            self.components[i].evaluate(
                robot,
                status,
                layout,
                s,
                &mut d.value,
                Some(&mut d.jacobian),
            );
            d.residual = &d.slack - &d.value;
            pdipm::compute_complementary_slackness(self.barrier, d);
            kkt_residual.lz.gemv_tr(-1.0, &d.jacobian, &d.dual, 1.0);
        }
    }

    /// Eliminate slack and dual from the stage KKT system.
    pub fn condense(
        &self,
        data: &mut ConstraintsData,
        kkt_matrix: &mut SplitKktMatrix,
        kkt_residual: &mut SplitKktResidual,
    ) {
        for d in data.components.iter_mut() {
            pdipm::compute_condensing_coefficient(d);
            let weights = d.dual.component_div(&d.slack);
            let mut scaled = d.jacobian.clone();
            for (mut row, w) in scaled.row_iter_mut().zip(weights.iter()) {
                row *= *w;
            }
            kkt_matrix.hessian.gemm_tr(1.0, &d.jacobian, &scaled, 1.0);
            kkt_residual.lz.gemv_tr(-1.0, &d.jacobian, &d.cond, 1.0);
        }
    }

    /// Recover slack and dual directions from the stage direction `dz`.
    pub fn expand(&self, data: &mut ConstraintsData, dz: &DVector<f64>) {
        for d in data.components.iter_mut() {
            d.dslack = &d.jacobian * dz - &d.residual;
            pdipm::compute_dual_direction(d);
        }
    }

    pub fn max_slack_step_size(&self, data: &ConstraintsData) -> f64 {
        data.components
            .iter()
            .map(|d| pdipm::fraction_to_boundary(self.fraction_to_boundary_rule, &d.slack, &d.dslack))
            .fold(1.0, f64::min)
    }

    pub fn max_dual_step_size(&self, data: &ConstraintsData) -> f64 {
        data.components
            .iter()
            .map(|d| pdipm::fraction_to_boundary(self.fraction_to_boundary_rule, &d.dual, &d.ddual))
            .fold(1.0, f64::min)
    }

    /// # Panics
    /// If a slack becomes non-positive, which means the step exceeded the
    /// fraction-to-boundary bound.
    pub fn update_slack(&self, data: &mut ConstraintsData, step: f64) {
        for d in data.components.iter_mut() {
            d.slack.axpy(step, &d.dslack, 1.0);
            assert!(
                d.slack.iter().all(|&x| x > 0.0),
                "slack lost strict positivity after a step of {step}"
            );
        }
    }

    /// # Panics
    /// If a dual becomes non-positive.
    pub fn update_dual(&self, data: &mut ConstraintsData, step: f64) {
        for d in data.components.iter_mut() {
            d.dual.axpy(step, &d.ddual, 1.0);
            assert!(
                d.dual.iter().all(|&x| x > 0.0),
                "dual lost strict positivity after a step of {step}"
            );
        }
    }

    /// Barrier cost and l1 violation of a trial point reached with slack step
    /// `step`, without touching the stage data.
    pub fn eval_trial(
        &self,
        robot: &dyn RobotModel,
        status: &ContactStatus,
        layout: &StageLayout,
        data: &ConstraintsData,
        s_trial: &SplitSolution,
        step: f64,
    ) -> (f64, f64) {
        let mut barrier_cost = 0.0;
        let mut violation = 0.0;
        for (&i, d) in data.component_indices.iter().zip(&data.components) {
            let mut value = DVector::zeros(d.dim());
            self.components[i].evaluate(robot, status, layout, s_trial, &mut value, None);
            let slack = &d.slack + &d.dslack * step;
            barrier_cost += pdipm::log_barrier(self.barrier, &slack);
            violation += (&slack - &value).iter().map(|r| r.abs()).sum::<f64>();
        }
        (barrier_cost, violation)
    }
}
