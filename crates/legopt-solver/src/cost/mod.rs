//! Cost function
//!
//! The cost is a sum of [`CostComponent`] trait objects shared by every
//! stage. Stage costs are integrated over the stage time step; terminal and
//! impulse costs are not.

pub mod configuration_space;
pub mod contact_force;

pub use configuration_space::ConfigurationSpaceCost;
pub use contact_force::ContactForceCost;

use std::fmt;
use std::sync::Arc;

use legopt_core::robot::ContactStatus;
use legopt_core::{GridInfo, RobotModel};

use crate::error::SolverError;
use crate::kkt::{SplitKktMatrix, SplitKktResidual};
use crate::solution::SplitSolution;

/// One additive term of the cost
///
/// `quadratize_*` methods add their gradient to `residual.lz` and their
/// Hessian to `matrix.hessian` on the stage layout and return the cost
/// value.
pub trait CostComponent: Send + Sync + fmt::Debug {
    /// Check the component against the robot dimensions.
    fn validate(&self, _robot: &dyn RobotModel) -> Result<(), SolverError> {
        Ok(())
    }

    fn eval_stage_cost(
        &self,
        robot: &dyn RobotModel,
        status: &ContactStatus,
        grid: &GridInfo,
        s: &SplitSolution,
    ) -> f64;

    fn quadratize_stage_cost(
        &self,
        robot: &dyn RobotModel,
        status: &ContactStatus,
        grid: &GridInfo,
        s: &SplitSolution,
        residual: &mut SplitKktResidual,
        matrix: &mut SplitKktMatrix,
    ) -> f64;

    fn eval_terminal_cost(&self, _robot: &dyn RobotModel, _grid: &GridInfo, _s: &SplitSolution) -> f64 {
        0.0
    }

    fn quadratize_terminal_cost(
        &self,
        _robot: &dyn RobotModel,
        _grid: &GridInfo,
        _s: &SplitSolution,
        _residual: &mut SplitKktResidual,
        _matrix: &mut SplitKktMatrix,
    ) -> f64 {
        0.0
    }

    /// `status` holds the contacts made at the impulse.
    fn eval_impulse_cost(
        &self,
        _robot: &dyn RobotModel,
        _status: &ContactStatus,
        _grid: &GridInfo,
        _s: &SplitSolution,
    ) -> f64 {
        0.0
    }

    fn quadratize_impulse_cost(
        &self,
        _robot: &dyn RobotModel,
        _status: &ContactStatus,
        _grid: &GridInfo,
        _s: &SplitSolution,
        _residual: &mut SplitKktResidual,
        _matrix: &mut SplitKktMatrix,
    ) -> f64 {
        0.0
    }
}

/// Sum of cost components
#[derive(Debug, Clone, Default)]
pub struct CostFunction {
    components: Vec<Arc<dyn CostComponent>>,
}

impl CostFunction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, component: impl CostComponent + 'static) {
        self.components.push(Arc::new(component));
    }

    pub fn push_shared(&mut self, component: Arc<dyn CostComponent>) {
        self.components.push(component);
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn validate(&self, robot: &dyn RobotModel) -> Result<(), SolverError> {
        self.components.iter().try_for_each(|c| c.validate(robot))
    }

    pub fn eval_stage_cost(
        &self,
        robot: &dyn RobotModel,
        status: &ContactStatus,
        grid: &GridInfo,
        s: &SplitSolution,
    ) -> f64 {
        self.components
            .iter()
            .map(|c| c.eval_stage_cost(robot, status, grid, s))
            .sum()
    }

    pub fn quadratize_stage_cost(
        &self,
        robot: &dyn RobotModel,
        status: &ContactStatus,
        grid: &GridInfo,
        s: &SplitSolution,
        residual: &mut SplitKktResidual,
        matrix: &mut SplitKktMatrix,
    ) -> f64 {
        self.components
            .iter()
            .map(|c| c.quadratize_stage_cost(robot, status, grid, s, residual, matrix))
            .sum()
    }

    pub fn eval_terminal_cost(&self, robot: &dyn RobotModel, grid: &GridInfo, s: &SplitSolution) -> f64 {
        self.components
            .iter()
            .map(|c| c.eval_terminal_cost(robot, grid, s))
            .sum()
    }

    pub fn quadratize_terminal_cost(
        &self,
        robot: &dyn RobotModel,
        grid: &GridInfo,
        s: &SplitSolution,
        residual: &mut SplitKktResidual,
        matrix: &mut SplitKktMatrix,
    ) -> f64 {
        self.components
            .iter()
            .map(|c| c.quadratize_terminal_cost(robot, grid, s, residual, matrix))
            .sum()
    }

    pub fn eval_impulse_cost(
        &self,
        robot: &dyn RobotModel,
        status: &ContactStatus,
        grid: &GridInfo,
        s: &SplitSolution,
    ) -> f64 {
        self.components
            .iter()
            .map(|c| c.eval_impulse_cost(robot, status, grid, s))
            .sum()
    }

    pub fn quadratize_impulse_cost(
        &self,
        robot: &dyn RobotModel,
        status: &ContactStatus,
        grid: &GridInfo,
        s: &SplitSolution,
        residual: &mut SplitKktResidual,
        matrix: &mut SplitKktMatrix,
    ) -> f64 {
        self.components
            .iter()
            .map(|c| c.quadratize_impulse_cost(robot, status, grid, s, residual, matrix))
            .sum()
    }
}
