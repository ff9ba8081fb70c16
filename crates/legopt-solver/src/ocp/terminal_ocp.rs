//! Terminal stage

use nalgebra::DVector;

use legopt_core::{GridInfo, RobotModel};

use super::state_equation;
use crate::cost::CostFunction;
use crate::kkt::{SplitKktMatrix, SplitKktResidual, StageLayout};
use crate::performance_index::PerformanceIndex;
use crate::solution::{SplitDirection, SplitSolution};

/// Terminal cost `φ(x_N)`; no dynamics or constraints
#[derive(Debug, Clone)]
pub struct TerminalOcp {
    performance: PerformanceIndex,
    cost_gradient: DVector<f64>,
}

impl Default for TerminalOcp {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalOcp {
    pub fn new() -> Self {
        Self {
            performance: PerformanceIndex::default(),
            cost_gradient: DVector::zeros(0),
        }
    }

    pub fn layout(robot: &dyn RobotModel) -> StageLayout {
        StageLayout::terminal(robot.dimv())
    }

    pub fn performance_index(&self) -> &PerformanceIndex {
        &self.performance
    }

    pub fn eval_kkt(
        &mut self,
        robot: &dyn RobotModel,
        cost: &CostFunction,
        grid: &GridInfo,
        s: &SplitSolution,
        matrix: &mut SplitKktMatrix,
        residual: &mut SplitKktResidual,
    ) {
        let layout = Self::layout(robot);
        matrix.set_layout(layout);
        residual.set_layout(layout);
        let terminal_cost = cost.quadratize_terminal_cost(robot, grid, s, residual, matrix);
        self.cost_gradient = residual.lz.clone();
        state_equation::add_costate(s, residual);
        self.performance = PerformanceIndex {
            cost: terminal_cost,
            cost_barrier: 0.0,
            primal_feasibility: 0.0,
            dual_feasibility: residual.dual_feasibility(),
            kkt_error: residual.kkt_error(),
        };
    }

    pub fn eval_trial(
        &self,
        robot: &dyn RobotModel,
        cost: &CostFunction,
        grid: &GridInfo,
        s_trial: &SplitSolution,
    ) -> (f64, f64) {
        (cost.eval_terminal_cost(robot, grid, s_trial), 0.0)
    }

    pub fn directional_derivative(&self, d: &SplitDirection) -> f64 {
        if self.cost_gradient.len() != d.dx.len() {
            return 0.0;
        }
        self.cost_gradient.dot(&d.dx)
    }
}
