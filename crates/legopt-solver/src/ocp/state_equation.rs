//! Discrete state equations
//!
//! Regular stages use the forward-Euler step
//!
//! ```text
//! F = [ (q ⊕ v·dt) ⊖ q'  ]
//!     [  v + a·dt − v'   ]
//! ```
//!
//! and impulse stages the velocity jump `F = [q ⊖ q'; v + dv − v']`.
//! Linearization also adds the costate terms of the Lagrangian,
//! `Fxᵀ λ' − λ` and `Fwᵀ λ'`, to the stage gradient.

use nalgebra::{DMatrix, DVector};

use legopt_core::RobotModel;

use crate::kkt::{SplitKktMatrix, SplitKktResidual};
use crate::solution::SplitSolution;

fn stacked_costate(s: &SplitSolution) -> DVector<f64> {
    let nv = s.lmd.len();
    let mut lambda = DVector::zeros(2 * nv);
    lambda.rows_mut(0, nv).copy_from(&s.lmd);
    lambda.rows_mut(nv, nv).copy_from(&s.gmm);
    lambda
}

/// Subtract the stage's own costate from `lx`.
pub fn add_costate(s: &SplitSolution, residual: &mut SplitKktResidual) {
    let lambda = stacked_costate(s);
    let mut lx = residual.lz.rows_mut(0, lambda.len());
    lx -= &lambda;
}

pub fn eval_state_equation(
    robot: &dyn RobotModel,
    dt: f64,
    s: &SplitSolution,
    s_next: &SplitSolution,
) -> DVector<f64> {
    let nv = robot.dimv();
    let q_end = robot.integrate_configuration(&s.q, &s.v, dt);
    let mut fx = DVector::zeros(2 * nv);
    fx.rows_mut(0, nv)
        .copy_from(&robot.subtract_configuration(&q_end, &s_next.q));
    fx.rows_mut(nv, nv)
        .copy_from(&(&s.v + &s.a * dt - &s_next.v));
    fx
}

pub fn linearize_state_equation(
    robot: &dyn RobotModel,
    dt: f64,
    s: &SplitSolution,
    s_next: &SplitSolution,
    matrix: &mut SplitKktMatrix,
    residual: &mut SplitKktResidual,
) {
    let nv = robot.dimv();
    residual.fx = eval_state_equation(robot, dt, s, s_next);

    let (dq, dv) = robot.d_integrate_configuration(&s.q, &s.v, dt);
    matrix.fxx.fill(0.0);
    matrix.fxx.view_mut((0, 0), (nv, nv)).copy_from(&dq);
    matrix.fxx.view_mut((0, nv), (nv, nv)).copy_from(&(dv * dt));
    matrix.fxx.view_mut((nv, nv), (nv, nv)).fill_with_identity();
    matrix.fxu.fill(0.0);
    matrix.fxw.fill(0.0);
    matrix
        .fxw
        .view_mut((nv, 0), (nv, nv))
        .copy_from(&(DMatrix::<f64>::identity(nv, nv) * dt));

    add_costate_terms(s, s_next, matrix, residual);
}

pub fn eval_impulse_state_equation(
    robot: &dyn RobotModel,
    s: &SplitSolution,
    s_next: &SplitSolution,
) -> DVector<f64> {
    let nv = robot.dimv();
    let mut fx = DVector::zeros(2 * nv);
    fx.rows_mut(0, nv)
        .copy_from(&robot.subtract_configuration(&s.q, &s_next.q));
    fx.rows_mut(nv, nv)
        .copy_from(&(&s.v + &s.dv - &s_next.v));
    fx
}

pub fn linearize_impulse_state_equation(
    robot: &dyn RobotModel,
    s: &SplitSolution,
    s_next: &SplitSolution,
    matrix: &mut SplitKktMatrix,
    residual: &mut SplitKktResidual,
) {
    let nv = robot.dimv();
    residual.fx = eval_impulse_state_equation(robot, s, s_next);

    matrix.fxx.fill_with_identity();
    matrix.fxu.fill(0.0);
    matrix.fxw.fill(0.0);
    matrix.fxw.view_mut((nv, 0), (nv, nv)).fill_with_identity();

    add_costate_terms(s, s_next, matrix, residual);
}

fn add_costate_terms(
    s: &SplitSolution,
    s_next: &SplitSolution,
    matrix: &SplitKktMatrix,
    residual: &mut SplitKktResidual,
) {
    let layout = *matrix.layout();
    let lambda_next = stacked_costate(s_next);
    let lx = matrix.fxx.tr_mul(&lambda_next);
    residual.add_to_segment(layout.x(), &lx);
    let lw = matrix.fxw.tr_mul(&lambda_next);
    residual.add_to_segment(layout.w(), &lw);
    add_costate(s, residual);
}

/// `Δx₀ = [q₀ ⊖ q; v₀ − v]` for the measured state `(q₀, v₀)`.
pub fn initial_state_direction(
    robot: &dyn RobotModel,
    q0: &DVector<f64>,
    v0: &DVector<f64>,
    s: &SplitSolution,
) -> DVector<f64> {
    let nv = robot.dimv();
    let mut dx = DVector::zeros(2 * nv);
    dx.rows_mut(0, nv)
        .copy_from(&robot.subtract_configuration(q0, &s.q));
    dx.rows_mut(nv, nv).copy_from(&(v0 - &s.v));
    dx
}
