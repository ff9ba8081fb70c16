//! Quadratic tracking of configuration, velocity, acceleration and torque
//!
//! ```text
//! ℓ  = ½ dt (‖q ⊖ q_ref‖²_Wq + ‖v − v_ref‖²_Wv + ‖a − a_ref‖²_Wa + ‖u − u_ref‖²_Wu)
//! φ  = ½ (‖q ⊖ q_ref‖²_Wqf + ‖v − v_ref‖²_Wvf)
//! ℓi = ½ (‖q ⊖ q_ref‖²_Wqi + ‖v − v_ref‖²_Wvi + ‖dv‖²_Wdvi)
//! ```

use std::ops::Range;

use nalgebra::DVector;

use legopt_core::robot::ContactStatus;
use legopt_core::{GridInfo, RobotModel};

use super::CostComponent;
use crate::error::SolverError;
use crate::kkt::{SplitKktMatrix, SplitKktResidual};
use crate::solution::SplitSolution;

#[derive(Debug, Clone)]
pub struct ConfigurationSpaceCost {
    q_ref: DVector<f64>,
    v_ref: DVector<f64>,
    a_ref: DVector<f64>,
    u_ref: DVector<f64>,
    q_weight: DVector<f64>,
    v_weight: DVector<f64>,
    a_weight: DVector<f64>,
    u_weight: DVector<f64>,
    qf_weight: DVector<f64>,
    vf_weight: DVector<f64>,
    qi_weight: DVector<f64>,
    vi_weight: DVector<f64>,
    dvi_weight: DVector<f64>,
}

fn check_length(name: &str, v: &DVector<f64>, expected: usize) -> Result<(), SolverError> {
    if v.len() != expected {
        return Err(SolverError::InvalidConfig(format!(
            "{name} has length {}, expected {expected}",
            v.len()
        )));
    }
    Ok(())
}

fn check_weight(name: &str, w: &DVector<f64>, expected: usize) -> Result<(), SolverError> {
    check_length(name, w, expected)?;
    if w.iter().any(|&x| !(x >= 0.0) || !x.is_finite()) {
        return Err(SolverError::InvalidConfig(format!(
            "{name} must be non-negative and finite"
        )));
    }
    Ok(())
}

/// `½ Σ wᵢ eᵢ²`
fn weighted_norm(w: &DVector<f64>, e: &DVector<f64>) -> f64 {
    0.5 * w.iter().zip(e.iter()).map(|(w, e)| w * e * e).sum::<f64>()
}

/// Add `scale · W e` to the gradient and `scale · W` to the Hessian diagonal.
fn add_quadratic(
    range: Range<usize>,
    w: &DVector<f64>,
    e: &DVector<f64>,
    scale: f64,
    residual: &mut SplitKktResidual,
    matrix: &mut SplitKktMatrix,
) {
    for (i, idx) in range.enumerate() {
        residual.lz[idx] += scale * w[i] * e[i];
        matrix.hessian[(idx, idx)] += scale * w[i];
    }
}

impl ConfigurationSpaceCost {
    /// Zero references and weights, with the neutral configuration as
    /// `q_ref`.
    pub fn new(robot: &dyn RobotModel) -> Self {
        let (nv, nu) = (robot.dimv(), robot.dimu());
        Self {
            q_ref: robot.neutral_configuration(),
            v_ref: DVector::zeros(nv),
            a_ref: DVector::zeros(nv),
            u_ref: DVector::zeros(nu),
            q_weight: DVector::zeros(nv),
            v_weight: DVector::zeros(nv),
            a_weight: DVector::zeros(nv),
            u_weight: DVector::zeros(nu),
            qf_weight: DVector::zeros(nv),
            vf_weight: DVector::zeros(nv),
            qi_weight: DVector::zeros(nv),
            vi_weight: DVector::zeros(nv),
            dvi_weight: DVector::zeros(nv),
        }
    }

    pub fn set_q_ref(&mut self, q_ref: DVector<f64>) -> Result<(), SolverError> {
        check_length("q_ref", &q_ref, self.q_ref.len())?;
        self.q_ref = q_ref;
        Ok(())
    }

    pub fn set_v_ref(&mut self, v_ref: DVector<f64>) -> Result<(), SolverError> {
        check_length("v_ref", &v_ref, self.v_ref.len())?;
        self.v_ref = v_ref;
        Ok(())
    }

    pub fn set_a_ref(&mut self, a_ref: DVector<f64>) -> Result<(), SolverError> {
        check_length("a_ref", &a_ref, self.a_ref.len())?;
        self.a_ref = a_ref;
        Ok(())
    }

    pub fn set_u_ref(&mut self, u_ref: DVector<f64>) -> Result<(), SolverError> {
        check_length("u_ref", &u_ref, self.u_ref.len())?;
        self.u_ref = u_ref;
        Ok(())
    }

    pub fn set_q_weight(&mut self, w: DVector<f64>) -> Result<(), SolverError> {
        check_weight("q_weight", &w, self.q_weight.len())?;
        self.q_weight = w;
        Ok(())
    }

    pub fn set_v_weight(&mut self, w: DVector<f64>) -> Result<(), SolverError> {
        check_weight("v_weight", &w, self.v_weight.len())?;
        self.v_weight = w;
        Ok(())
    }

    pub fn set_a_weight(&mut self, w: DVector<f64>) -> Result<(), SolverError> {
        check_weight("a_weight", &w, self.a_weight.len())?;
        self.a_weight = w;
        Ok(())
    }

    pub fn set_u_weight(&mut self, w: DVector<f64>) -> Result<(), SolverError> {
        check_weight("u_weight", &w, self.u_weight.len())?;
        self.u_weight = w;
        Ok(())
    }

    pub fn set_qf_weight(&mut self, w: DVector<f64>) -> Result<(), SolverError> {
        check_weight("qf_weight", &w, self.qf_weight.len())?;
        self.qf_weight = w;
        Ok(())
    }

    pub fn set_vf_weight(&mut self, w: DVector<f64>) -> Result<(), SolverError> {
        check_weight("vf_weight", &w, self.vf_weight.len())?;
        self.vf_weight = w;
        Ok(())
    }

    pub fn set_qi_weight(&mut self, w: DVector<f64>) -> Result<(), SolverError> {
        check_weight("qi_weight", &w, self.qi_weight.len())?;
        self.qi_weight = w;
        Ok(())
    }

    pub fn set_vi_weight(&mut self, w: DVector<f64>) -> Result<(), SolverError> {
        check_weight("vi_weight", &w, self.vi_weight.len())?;
        self.vi_weight = w;
        Ok(())
    }

    pub fn set_dvi_weight(&mut self, w: DVector<f64>) -> Result<(), SolverError> {
        check_weight("dvi_weight", &w, self.dvi_weight.len())?;
        self.dvi_weight = w;
        Ok(())
    }

    pub fn q_ref(&self) -> &DVector<f64> {
        &self.q_ref
    }

    fn q_error(&self, robot: &dyn RobotModel, s: &SplitSolution) -> DVector<f64> {
        robot.subtract_configuration(&s.q, &self.q_ref)
    }
}

impl CostComponent for ConfigurationSpaceCost {
    fn validate(&self, robot: &dyn RobotModel) -> Result<(), SolverError> {
        check_length("q_ref", &self.q_ref, robot.dimq())?;
        check_length("v_ref", &self.v_ref, robot.dimv())?;
        check_length("u_ref", &self.u_ref, robot.dimu())
    }

    fn eval_stage_cost(
        &self,
        robot: &dyn RobotModel,
        _status: &ContactStatus,
        grid: &GridInfo,
        s: &SplitSolution,
    ) -> f64 {
        let cost = weighted_norm(&self.q_weight, &self.q_error(robot, s))
            + weighted_norm(&self.v_weight, &(&s.v - &self.v_ref))
            + weighted_norm(&self.a_weight, &(&s.a - &self.a_ref))
            + weighted_norm(&self.u_weight, &(&s.u - &self.u_ref));
        grid.dt * cost
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
        let layout = *residual.layout();
        let dt = grid.dt;
        add_quadratic(layout.q(), &self.q_weight, &self.q_error(robot, s), dt, residual, matrix);
        add_quadratic(layout.v(), &self.v_weight, &(&s.v - &self.v_ref), dt, residual, matrix);
        add_quadratic(layout.u(), &self.u_weight, &(&s.u - &self.u_ref), dt, residual, matrix);
        add_quadratic(layout.a(), &self.a_weight, &(&s.a - &self.a_ref), dt, residual, matrix);
        self.eval_stage_cost(robot, status, grid, s)
    }

    fn eval_terminal_cost(&self, robot: &dyn RobotModel, _grid: &GridInfo, s: &SplitSolution) -> f64 {
        weighted_norm(&self.qf_weight, &self.q_error(robot, s))
            + weighted_norm(&self.vf_weight, &(&s.v - &self.v_ref))
    }

    fn quadratize_terminal_cost(
        &self,
        robot: &dyn RobotModel,
        grid: &GridInfo,
        s: &SplitSolution,
        residual: &mut SplitKktResidual,
        matrix: &mut SplitKktMatrix,
    ) -> f64 {
        let layout = *residual.layout();
        add_quadratic(layout.q(), &self.qf_weight, &self.q_error(robot, s), 1.0, residual, matrix);
        add_quadratic(layout.v(), &self.vf_weight, &(&s.v - &self.v_ref), 1.0, residual, matrix);
        self.eval_terminal_cost(robot, grid, s)
    }

    fn eval_impulse_cost(
        &self,
        robot: &dyn RobotModel,
        _status: &ContactStatus,
        _grid: &GridInfo,
        s: &SplitSolution,
    ) -> f64 {
        weighted_norm(&self.qi_weight, &self.q_error(robot, s))
            + weighted_norm(&self.vi_weight, &(&s.v - &self.v_ref))
            + weighted_norm(&self.dvi_weight, &s.dv)
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
        let layout = *residual.layout();
        add_quadratic(layout.q(), &self.qi_weight, &self.q_error(robot, s), 1.0, residual, matrix);
        add_quadratic(layout.v(), &self.vi_weight, &(&s.v - &self.v_ref), 1.0, residual, matrix);
        add_quadratic(layout.a(), &self.dvi_weight, &s.dv, 1.0, residual, matrix);
        self.eval_impulse_cost(robot, status, grid, s)
    }
}
