//! Regular and impulse stages

use nalgebra::DVector;

use legopt_core::robot::ContactStatus;
use legopt_core::{GridInfo, RobotModel};

use super::contact_dynamics::{self, ContactDynamics};
use super::state_equation;
use crate::constraints::{ConstraintKind, Constraints, ConstraintsData};
use crate::cost::CostFunction;
use crate::error::SolverError;
use crate::kkt::{SplitKktMatrix, SplitKktResidual, StageLayout};
use crate::performance_index::PerformanceIndex;
use crate::solution::{SplitDirection, SplitSolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Regular,
    Impulse,
}

/// Subproblem of one regular or impulse stage
///
/// Owns the contact status snapshot, the interior-point data and the
/// condensation data of its stage.
#[derive(Debug, Clone)]
pub struct SplitOcp {
    kind: StageKind,
    layout: StageLayout,
    status: ContactStatus,
    constraints_data: ConstraintsData,
    contact_dynamics: ContactDynamics,
    /// Gradient of the cost alone, for the merit directional derivative
    cost_gradient: DVector<f64>,
    performance: PerformanceIndex,
}

impl SplitOcp {
    /// `status` is the phase status for a regular stage and the status of
    /// the contacts made at the impulse for an impulse stage.
    pub fn new(
        robot: &dyn RobotModel,
        constraints: &Constraints,
        status: &ContactStatus,
        kind: StageKind,
    ) -> Self {
        let layout = match kind {
            StageKind::Regular => StageLayout::regular(robot.dimv(), robot.dimu(), status.dimf()),
            StageKind::Impulse => StageLayout::impulse(robot.dimv(), status.dimf()),
        };
        let constraint_kind = match kind {
            StageKind::Regular => ConstraintKind::Stage,
            StageKind::Impulse => ConstraintKind::Impulse,
        };
        Self {
            kind,
            layout,
            status: status.clone(),
            constraints_data: constraints.create_data(robot, status, &layout, constraint_kind),
            contact_dynamics: ContactDynamics::default(),
            cost_gradient: DVector::zeros(layout.dim()),
            performance: PerformanceIndex::default(),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn is_impulse(&self) -> bool {
        self.kind == StageKind::Impulse
    }

    pub fn layout(&self) -> &StageLayout {
        &self.layout
    }

    pub fn contact_status(&self) -> &ContactStatus {
        &self.status
    }

    pub fn constraints_data(&self) -> &ConstraintsData {
        &self.constraints_data
    }

    pub fn performance_index(&self) -> &PerformanceIndex {
        &self.performance
    }

    /// Initialize slack and dual from the current solution.
    pub fn init_constraints(
        &mut self,
        robot: &dyn RobotModel,
        constraints: &Constraints,
        s: &SplitSolution,
    ) {
        constraints.set_slack_and_dual(robot, &self.status, &self.layout, &mut self.constraints_data, s);
    }

    pub fn is_feasible(&self, robot: &dyn RobotModel, constraints: &Constraints, s: &SplitSolution) -> bool {
        constraints.is_feasible(robot, &self.status, &self.layout, &self.constraints_data, s)
    }

    /// Linearize the stage at `s`, record its performance index, then
    /// condense slack, dual and auxiliary variables. Errors name
    /// `grid_point`.
    #[allow(clippy::too_many_arguments)]
    pub fn eval_kkt(
        &mut self,
        robot: &dyn RobotModel,
        cost: &CostFunction,
        constraints: &Constraints,
        grid_point: usize,
        grid: &GridInfo,
        baumgarte_time_constant: f64,
        s: &SplitSolution,
        s_next: &SplitSolution,
        matrix: &mut SplitKktMatrix,
        residual: &mut SplitKktResidual,
    ) -> Result<(), SolverError> {
        s.check_contact_dimension(grid_point, &self.status)?;
        matrix.set_layout(self.layout);
        residual.set_layout(self.layout);

        let stage_cost = match self.kind {
            StageKind::Regular => cost.quadratize_stage_cost(robot, &self.status, grid, s, residual, matrix),
            StageKind::Impulse => cost.quadratize_impulse_cost(robot, &self.status, grid, s, residual, matrix),
        };
        self.cost_gradient.copy_from(&residual.lz);

        match self.kind {
            StageKind::Regular => {
                state_equation::linearize_state_equation(robot, grid.dt, s, s_next, matrix, residual);
                contact_dynamics::linearize_contact_dynamics(
                    robot,
                    &self.status,
                    baumgarte_time_constant,
                    s,
                    matrix,
                    residual,
                );
            }
            StageKind::Impulse => {
                state_equation::linearize_impulse_state_equation(robot, s, s_next, matrix, residual);
                contact_dynamics::linearize_impulse_dynamics(robot, &self.status, s, matrix, residual);
            }
        }
        constraints.linearize(robot, &self.status, &self.layout, &mut self.constraints_data, s, residual);

        self.performance = PerformanceIndex {
            cost: stage_cost,
            cost_barrier: self.constraints_data.log_barrier(constraints.barrier()),
            primal_feasibility: residual.primal_feasibility() + self.constraints_data.primal_feasibility(),
            dual_feasibility: residual.dual_feasibility(),
            kkt_error: residual.kkt_error() + self.constraints_data.kkt_error(),
        };

        constraints.condense(&mut self.constraints_data, matrix, residual);
        self.contact_dynamics.condense(grid_point, matrix, residual)
    }

    /// Recover `dw` and the slack and dual directions once `dx` and `du` are
    /// known.
    pub fn expand_primal(&mut self, constraints: &Constraints, d: &mut SplitDirection) {
        self.contact_dynamics.expand_primal(d);
        constraints.expand(&mut self.constraints_data, &d.stacked());
    }

    /// Recover `dβ` from the next stage's costate direction.
    pub fn expand_dual(&self, dlambda_next: &DVector<f64>, d: &mut SplitDirection) {
        self.contact_dynamics.expand_dual(dlambda_next, d);
    }

    pub fn max_primal_step_size(&self, constraints: &Constraints) -> f64 {
        constraints.max_slack_step_size(&self.constraints_data)
    }

    pub fn max_dual_step_size(&self, constraints: &Constraints) -> f64 {
        constraints.max_dual_step_size(&self.constraints_data)
    }

    pub fn update_primal(
        &mut self,
        robot: &dyn RobotModel,
        constraints: &Constraints,
        step: f64,
        d: &SplitDirection,
        s: &mut SplitSolution,
    ) {
        s.integrate(robot, step, d, self.is_impulse());
        constraints.update_slack(&mut self.constraints_data, step);
    }

    pub fn update_dual(&mut self, constraints: &Constraints, step: f64) {
        constraints.update_dual(&mut self.constraints_data, step);
    }

    /// Cost including barrier and l1 constraint violation at a trial point
    /// reached with primal step `step`.
    #[allow(clippy::too_many_arguments)]
    pub fn eval_trial(
        &self,
        robot: &dyn RobotModel,
        cost: &CostFunction,
        constraints: &Constraints,
        grid: &GridInfo,
        baumgarte_time_constant: f64,
        s_trial: &SplitSolution,
        s_trial_next: &SplitSolution,
        step: f64,
    ) -> (f64, f64) {
        let (stage_cost, defect) = match self.kind {
            StageKind::Regular => (
                cost.eval_stage_cost(robot, &self.status, grid, s_trial),
                state_equation::eval_state_equation(robot, grid.dt, s_trial, s_trial_next).abs().sum()
                    + contact_dynamics::eval_contact_dynamics(
                        robot,
                        &self.status,
                        baumgarte_time_constant,
                        s_trial,
                    )
                    .abs()
                    .sum(),
            ),
            StageKind::Impulse => (
                cost.eval_impulse_cost(robot, &self.status, grid, s_trial),
                state_equation::eval_impulse_state_equation(robot, s_trial, s_trial_next).abs().sum()
                    + contact_dynamics::eval_impulse_dynamics(robot, &self.status, s_trial).abs().sum(),
            ),
        };
        let (barrier_cost, violation) = constraints.eval_trial(
            robot,
            &self.status,
            &self.layout,
            &self.constraints_data,
            s_trial,
            step,
        );
        (stage_cost + barrier_cost, defect + violation)
    }

    /// Directional derivative of cost plus barrier along `d`.
    pub fn directional_derivative(&self, constraints: &Constraints, d: &SplitDirection) -> f64 {
        self.cost_gradient.dot(&d.stacked())
            + self.constraints_data.barrier_directional_derivative(constraints.barrier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{JointLimit, JointLimitSide, JointLimitTarget};
    use crate::cost::ConfigurationSpaceCost;
    use approx::assert_relative_eq;
    use legopt_core::robot::{Manipulator, PointMass};
    use legopt_core::GridType;

    fn grid() -> GridInfo {
        GridInfo {
            t0: 0.0,
            t: 0.0,
            dt: 0.1,
            grid_type: GridType::Intermediate,
            phase: 0,
            stage: 0,
            impulse_index: None,
            lift_index: None,
        }
    }

    fn problem() -> (Manipulator, CostFunction, Constraints) {
        let robot = Manipulator::uniform(2).unwrap();
        let mut config_cost = ConfigurationSpaceCost::new(&robot);
        config_cost.set_q_weight(DVector::from_element(2, 1.0)).unwrap();
        config_cost.set_u_weight(DVector::from_element(2, 0.1)).unwrap();
        let mut cost = CostFunction::new();
        cost.push(config_cost);
        let mut constraints = Constraints::new(1e-3, 0.995).unwrap();
        constraints.push(JointLimit::new(
            JointLimitTarget::Torque,
            JointLimitSide::Upper,
            DVector::from_element(2, 5.0),
        ));
        (robot, cost, constraints)
    }

    #[test]
    fn test_condensed_stage_has_reduced_dimensions() {
        let (robot, cost, constraints) = problem();
        let status = ContactStatus::new(0);
        let mut ocp = SplitOcp::new(&robot, &constraints, &status, StageKind::Regular);
        let mut s = SplitSolution::new(&robot);
        s.q = DVector::from_vec(vec![0.3, -0.2]);
        let next = SplitSolution::new(&robot);
        ocp.init_constraints(&robot, &constraints, &s);
        assert!(ocp.is_feasible(&robot, &constraints, &s));

        let mut matrix = SplitKktMatrix::new(*ocp.layout());
        let mut residual = SplitKktResidual::new(*ocp.layout());
        ocp.eval_kkt(&robot, &cost, &constraints, 0, &grid(), 0.05, &s, &next, &mut matrix, &mut residual)
            .unwrap();

        assert!(ocp.performance_index().kkt_error > 0.0);
        // ID residual with a = 0, u = 0 is the gravity torque
        assert!(ocp.performance_index().primal_feasibility > 0.0);
        // reduced control Hessian: Ψᵀ Hww Ψ is absent without an acceleration weight
        assert!(matrix.quu()[(0, 0)] > 0.0);
        assert_eq!(matrix.fxu.ncols(), 2);
    }

    #[test]
    fn test_trial_at_zero_step_has_no_defect_at_a_consistent_point() {
        let (robot, cost, constraints) = problem();
        let status = ContactStatus::new(0);
        let mut ocp = SplitOcp::new(&robot, &constraints, &status, StageKind::Regular);
        let mut s = SplitSolution::new(&robot);
        // u balances gravity at q = 0, a = 0
        s.u = robot.inverse_dynamics(&s.q, &s.v, &s.a);
        let next = s.clone();
        ocp.init_constraints(&robot, &constraints, &s);
        let (_, violation) = ocp.eval_trial(&robot, &cost, &constraints, &grid(), 0.05, &s, &next, 0.0);
        assert_relative_eq!(violation, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_contact_mismatch_names_grid_point() {
        let robot = PointMass::new(1.0).unwrap();
        let constraints = Constraints::new(1e-3, 0.995).unwrap();
        let cost = CostFunction::new();
        let status = ContactStatus::all_active(1);
        let mut ocp = SplitOcp::new(&robot, &constraints, &status, StageKind::Regular);
        let mut matrix = SplitKktMatrix::new(*ocp.layout());
        let mut residual = SplitKktResidual::new(*ocp.layout());

        // no contact stack although the contact is active; the interval
        // index of the grid info is 0 while the stage sits at grid point 7
        let s = SplitSolution::new(&robot);
        let result = ocp.eval_kkt(&robot, &cost, &constraints, 7, &grid(), 0.05, &s, &s, &mut matrix, &mut residual);
        assert!(matches!(
            result,
            Err(SolverError::ContactDimensionMismatch { stage: 7, expected: 3, got: 0 })
        ));
    }
}
