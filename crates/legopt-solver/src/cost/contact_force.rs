//! Quadratic penalty on contact forces and impulses

use nalgebra::Vector3;

use legopt_core::robot::ContactStatus;
use legopt_core::{GridInfo, RobotModel};

use super::CostComponent;
use crate::error::SolverError;
use crate::kkt::{SplitKktMatrix, SplitKktResidual};
use crate::solution::SplitSolution;

/// `½ dt Σ ‖fᵢ − fᵢ_ref‖²_W` over the active contacts, and the undiscounted
/// counterpart on impulses
#[derive(Debug, Clone)]
pub struct ContactForceCost {
    f_weight: Vec<Vector3<f64>>,
    f_ref: Vec<Vector3<f64>>,
    fi_weight: Vec<Vector3<f64>>,
    fi_ref: Vec<Vector3<f64>>,
}

impl ContactForceCost {
    pub fn new(robot: &dyn RobotModel) -> Self {
        let n = robot.max_num_contacts();
        Self {
            f_weight: vec![Vector3::zeros(); n],
            f_ref: vec![Vector3::zeros(); n],
            fi_weight: vec![Vector3::zeros(); n],
            fi_ref: vec![Vector3::zeros(); n],
        }
    }

    fn check(&self, name: &str, values: &[Vector3<f64>], weights: bool) -> Result<(), SolverError> {
        if values.len() != self.f_weight.len() {
            return Err(SolverError::InvalidConfig(format!(
                "{name} needs {} entries, got {}",
                self.f_weight.len(),
                values.len()
            )));
        }
        if weights && values.iter().flat_map(|w| w.iter()).any(|&x| !(x >= 0.0)) {
            return Err(SolverError::InvalidConfig(format!("{name} must be non-negative")));
        }
        Ok(())
    }

    pub fn set_f_weight(&mut self, weights: Vec<Vector3<f64>>) -> Result<(), SolverError> {
        self.check("f_weight", &weights, true)?;
        self.f_weight = weights;
        Ok(())
    }

    pub fn set_f_ref(&mut self, refs: Vec<Vector3<f64>>) -> Result<(), SolverError> {
        self.check("f_ref", &refs, false)?;
        self.f_ref = refs;
        Ok(())
    }

    pub fn set_fi_weight(&mut self, weights: Vec<Vector3<f64>>) -> Result<(), SolverError> {
        self.check("fi_weight", &weights, true)?;
        self.fi_weight = weights;
        Ok(())
    }

    pub fn set_fi_ref(&mut self, refs: Vec<Vector3<f64>>) -> Result<(), SolverError> {
        self.check("fi_ref", &refs, false)?;
        self.fi_ref = refs;
        Ok(())
    }
}

fn eval(weights: &[Vector3<f64>], refs: &[Vector3<f64>], status: &ContactStatus, s: &SplitSolution) -> f64 {
    status
        .active_contacts()
        .enumerate()
        .map(|(k, i)| {
            let e = s.contact_force(k) - refs[i];
            0.5 * weights[i].dot(&e.component_mul(&e))
        })
        .sum()
}

fn quadratize(
    weights: &[Vector3<f64>],
    refs: &[Vector3<f64>],
    status: &ContactStatus,
    s: &SplitSolution,
    scale: f64,
    residual: &mut SplitKktResidual,
    matrix: &mut SplitKktMatrix,
) {
    let start = residual.layout().f().start;
    for (k, i) in status.active_contacts().enumerate() {
        let e = s.contact_force(k) - refs[i];
        for c in 0..3 {
            let idx = start + 3 * k + c;
            residual.lz[idx] += scale * weights[i][c] * e[c];
            matrix.hessian[(idx, idx)] += scale * weights[i][c];
        }
    }
}

impl CostComponent for ContactForceCost {
    fn validate(&self, robot: &dyn RobotModel) -> Result<(), SolverError> {
        if self.f_weight.len() != robot.max_num_contacts() {
            return Err(SolverError::InvalidConfig(format!(
                "contact force cost built for {} contacts, robot has {}",
                self.f_weight.len(),
                robot.max_num_contacts()
            )));
        }
        Ok(())
    }

    fn eval_stage_cost(
        &self,
        _robot: &dyn RobotModel,
        status: &ContactStatus,
        grid: &GridInfo,
        s: &SplitSolution,
    ) -> f64 {
        grid.dt * eval(&self.f_weight, &self.f_ref, status, s)
    }

    fn quadratize_stage_cost(
        &self,
        robot: &dyn RobotModel,
        status: &ContactStatus,
        grid: &GridInfo,
        s: &SplitSolution,
        residual: &mut SplitKktResidual,
        matrix: &mut SplitKktMatrix,
    ) -> f64 {
        quadratize(&self.f_weight, &self.f_ref, status, s, grid.dt, residual, matrix);
        self.eval_stage_cost(robot, status, grid, s)
    }

    fn eval_impulse_cost(
        &self,
        _robot: &dyn RobotModel,
        status: &ContactStatus,
        _grid: &GridInfo,
        s: &SplitSolution,
    ) -> f64 {
        eval(&self.fi_weight, &self.fi_ref, status, s)
    }

    fn quadratize_impulse_cost(
        &self,
        robot: &dyn RobotModel,
        status: &ContactStatus,
        grid: &GridInfo,
        s: &SplitSolution,
        residual: &mut SplitKktResidual,
        matrix: &mut SplitKktMatrix,
    ) -> f64 {
        quadratize(&self.fi_weight, &self.fi_ref, status, s, 1.0, residual, matrix);
        self.eval_impulse_cost(robot, status, grid, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kkt::StageLayout;
    use approx::assert_relative_eq;
    use legopt_core::robot::PointMass;
    use legopt_core::GridType;
    use nalgebra::DVector;

    #[test]
    fn test_force_tracking_on_active_contact() {
        let robot = PointMass::new(2.0).unwrap();
        let mut cost = ContactForceCost::new(&robot);
        cost.set_f_weight(vec![Vector3::new(0.0, 0.0, 1e-2)]).unwrap();
        cost.set_f_ref(vec![Vector3::new(0.0, 0.0, 19.62)]).unwrap();

        let status = ContactStatus::all_active(1);
        let mut s = SplitSolution::new(&robot);
        s.set_contact_status(&status);
        s.f = DVector::from_vec(vec![1.0, 0.0, 9.62]);

        let layout = StageLayout::regular(3, 3, 3);
        let mut residual = SplitKktResidual::new(layout);
        let mut matrix = SplitKktMatrix::new(layout);
        let grid = GridInfo {
            t0: 0.0,
            t: 0.0,
            dt: 0.5,
            grid_type: GridType::Intermediate,
            phase: 0,
            stage: 0,
            impulse_index: None,
            lift_index: None,
        };
        let value = cost.quadratize_stage_cost(&robot, &status, &grid, &s, &mut residual, &mut matrix);
        assert_relative_eq!(value, 0.5 * 0.5 * 1e-2 * 100.0, epsilon = 1e-12);
        assert_relative_eq!(residual.lz[14], 0.5 * 1e-2 * -10.0, epsilon = 1e-12);
        assert_relative_eq!(matrix.hessian[(14, 14)], 0.5e-2, epsilon = 1e-12);
        assert_eq!(residual.lz[12], 0.0);
    }

    #[test]
    fn test_inactive_contacts_cost_nothing() {
        let robot = PointMass::new(1.0).unwrap();
        let mut cost = ContactForceCost::new(&robot);
        cost.set_f_weight(vec![Vector3::from_element(1.0)]).unwrap();
        let s = SplitSolution::new(&robot);
        let status = ContactStatus::new(1);
        assert_eq!(eval(&cost.f_weight, &cost.f_ref, &status, &s), 0.0);
        assert!(cost.set_f_weight(vec![]).is_err());
    }
}
