//! Box limits on joint positions, velocities and torques
//!
//! Limits act on the actuated joints, i.e. the last `dimu` velocity
//! coordinates, and on the control input for torques.

use nalgebra::{DMatrix, DVector};

use legopt_core::robot::ContactStatus;
use legopt_core::RobotModel;

use super::{ConstraintComponent, ConstraintKind};
use crate::error::SolverError;
use crate::kkt::StageLayout;
use crate::solution::SplitSolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointLimitTarget {
    Position,
    Velocity,
    Torque,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointLimitSide {
    /// `x ≥ bound`
    Lower,
    /// `x ≤ bound`
    Upper,
}

#[derive(Debug, Clone)]
pub struct JointLimit {
    target: JointLimitTarget,
    side: JointLimitSide,
    bound: DVector<f64>,
}

impl JointLimit {
    pub fn new(target: JointLimitTarget, side: JointLimitSide, bound: DVector<f64>) -> Self {
        Self { target, side, bound }
    }

    pub fn target(&self) -> JointLimitTarget {
        self.target
    }

    pub fn side(&self) -> JointLimitSide {
        self.side
    }

    pub fn bound(&self) -> &DVector<f64> {
        &self.bound
    }

    fn sign(&self) -> f64 {
        match self.side {
            JointLimitSide::Lower => 1.0,
            JointLimitSide::Upper => -1.0,
        }
    }
}

impl ConstraintComponent for JointLimit {
    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Stage
    }

    fn dim(&self, _robot: &dyn RobotModel, _status: &ContactStatus) -> usize {
        self.bound.len()
    }

    fn validate(&self, robot: &dyn RobotModel) -> Result<(), SolverError> {
        if self.bound.len() != robot.dimu() {
            return Err(SolverError::InvalidConfig(format!(
                "{:?} limit has {} bounds for {} actuated joints",
                self.target,
                self.bound.len(),
                robot.dimu()
            )));
        }
        if self.target == JointLimitTarget::Position && robot.dimq() != robot.dimv() {
            return Err(SolverError::InvalidConfig(
                "position limits need a configuration with tangent coordinates".to_string(),
            ));
        }
        Ok(())
    }

    fn evaluate(
        &self,
        robot: &dyn RobotModel,
        _status: &ContactStatus,
        layout: &StageLayout,
        s: &SplitSolution,
        value: &mut DVector<f64>,
        jacobian: Option<&mut DMatrix<f64>>,
    ) {
        let n = self.bound.len();
        let offset = robot.dimv() - n;
        let (x, column) = match self.target {
            JointLimitTarget::Position => (s.q.rows(offset, n), layout.q().start + offset),
            JointLimitTarget::Velocity => (s.v.rows(offset, n), layout.v().start + offset),
            JointLimitTarget::Torque => (s.u.rows(0, n), layout.u().start),
        };
        let sign = self.sign();
        for i in 0..n {
            value[i] = sign * (x[i] - self.bound[i]);
        }
        if let Some(jac) = jacobian {
            for i in 0..n {
                jac[(i, column + i)] = sign;
            }
        }
    }
}
