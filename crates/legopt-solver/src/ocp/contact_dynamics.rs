//! Contact dynamics and their condensation
//!
//! With auxiliary variables `w = [a, f]` (or `[dv, Λ]` at an impulse) and
//! dynamics `C(z, w) = 0` with multiplier `β`, the stage system is
//!
//! ```text
//! [ Hzz  Hzw  Czᵀ ] [dz]     [ lz + Fzᵀ dλ' ]
//! [ Hwz  Hww  Cwᵀ ] [dw] = − [ lw + Fwᵀ dλ' ]
//! [ Cz   Cw   0   ] [dβ]     [ C           ]
//! ```
//!
//! Condensation substitutes `dw = Ψ dz + ψ₀` with `Ψ = −Cw⁻¹ Cz` and
//! `ψ₀ = −Cw⁻¹ C`, leaving a system in `dz = (dx, du)` only.

use nalgebra::{DMatrix, DVector};

use legopt_core::robot::ContactStatus;
use legopt_core::RobotModel;

use crate::error::SolverError;
use crate::kkt::{SplitKktMatrix, SplitKktResidual};
use crate::solution::{SplitDirection, SplitSolution};

/// Residual of the regular contact dynamics
///
/// ```text
/// ID(q, v, a) − Σ Jᵢᵀ fᵢ − Sᵀ u
/// J a + J̇ v + (2/τ) J v + (1/τ²)(p − p_ref)      per active contact
/// ```
pub fn eval_contact_dynamics(
    robot: &dyn RobotModel,
    status: &ContactStatus,
    baumgarte_time_constant: f64,
    s: &SplitSolution,
) -> DVector<f64> {
    let nv = robot.dimv();
    let tau = baumgarte_time_constant;
    let mut c = DVector::zeros(nv + status.dimf());
    let mut c_dyn = robot.inverse_dynamics(&s.q, &s.v, &s.a) - robot.selection_matrix().tr_mul(&s.u);
    for (k, i) in status.active_contacts().enumerate() {
        let f = s.contact_force(k);
        let jacobian = robot.contact_jacobian(&s.q, i);
        c_dyn -= jacobian.tr_mul(&DVector::from_column_slice(f.as_slice()));

        let velocity = &jacobian * &s.v;
        let position_error = robot.contact_position(&s.q, i) - status.contact_position(i);
        let acc = robot.contact_acceleration(&s.q, &s.v, &s.a, i);
        for r in 0..3 {
            c[nv + 3 * k + r] =
                acc[r] + 2.0 / tau * velocity[r] + position_error[r] / (tau * tau);
        }
    }
    c.rows_mut(0, nv).copy_from(&c_dyn);
    c
}

/// Residual of the impulse dynamics `M dv − Σ Jᵢᵀ Λᵢ`, `J (v + dv)`.
pub fn eval_impulse_dynamics(
    robot: &dyn RobotModel,
    status: &ContactStatus,
    s: &SplitSolution,
) -> DVector<f64> {
    let nv = robot.dimv();
    let mut c = DVector::zeros(nv + status.dimf());
    let mut c_dyn = robot.impulse_dynamics(&s.q, &s.dv);
    let v_plus = &s.v + &s.dv;
    for (k, i) in status.active_contacts().enumerate() {
        let jacobian = robot.contact_jacobian(&s.q, i);
        let impulse = DVector::from_column_slice(s.contact_force(k).as_slice());
        c_dyn -= jacobian.tr_mul(&impulse);
        c.rows_mut(nv + 3 * k, 3).copy_from(&(&jacobian * &v_plus));
    }
    c.rows_mut(0, nv).copy_from(&c_dyn);
    c
}

fn add_multiplier_terms(s: &SplitSolution, matrix: &SplitKktMatrix, residual: &mut SplitKktResidual) {
    let layout = *matrix.layout();
    let nv = s.beta.len();
    let mut beta = DVector::zeros(layout.dimw());
    beta.rows_mut(0, nv).copy_from(&s.beta);
    beta.rows_mut(nv, s.mu.len()).copy_from(&s.mu);
    residual.add_to_segment(0..layout.dimz(), &matrix.cz.tr_mul(&beta));
    residual.add_to_segment(layout.w(), &matrix.cw.tr_mul(&beta));
}

/// Fill `C`, `Cz`, `Cw` of a regular stage and add `Czᵀβ`, `Cwᵀβ` to the
/// gradient.
pub fn linearize_contact_dynamics(
    robot: &dyn RobotModel,
    status: &ContactStatus,
    baumgarte_time_constant: f64,
    s: &SplitSolution,
    matrix: &mut SplitKktMatrix,
    residual: &mut SplitKktResidual,
) {
    let layout = *matrix.layout();
    let nv = robot.dimv();
    let tau = baumgarte_time_constant;
    residual.c = eval_contact_dynamics(robot, status, tau, s);

    let id = robot.inverse_dynamics_derivatives(&s.q, &s.v, &s.a);
    matrix.cz.fill(0.0);
    matrix.cw.fill(0.0);
    matrix.cz.view_mut((0, 0), (nv, nv)).copy_from(&id.dq);
    matrix.cz.view_mut((0, nv), (nv, nv)).copy_from(&id.dv);
    matrix
        .cz
        .view_mut((0, layout.dimx()), (nv, layout.dimu))
        .copy_from(&(-robot.selection_matrix().transpose()));
    matrix.cw.view_mut((0, 0), (nv, nv)).copy_from(&id.da);

    for (k, i) in status.active_contacts().enumerate() {
        let f = s.contact_force(k);
        let jacobian = robot.contact_jacobian(&s.q, i);
        let row = nv + 3 * k;

        let mut dyn_dq = matrix.cz.view_mut((0, 0), (nv, nv));
        dyn_dq -= robot.contact_jacobian_transpose_derivative(&s.q, i, &f);
        matrix
            .cw
            .view_mut((0, nv + 3 * k), (nv, 3))
            .copy_from(&(-jacobian.transpose()));

        let acc = robot.contact_acceleration_derivatives(&s.q, &s.v, &s.a, i);
        let vel_dq = robot.contact_velocity_derivative(&s.q, &s.v, i);
        matrix
            .cz
            .view_mut((row, 0), (3, nv))
            .copy_from(&(acc.dq + vel_dq * (2.0 / tau) + &jacobian / (tau * tau)));
        matrix
            .cz
            .view_mut((row, nv), (3, nv))
            .copy_from(&(acc.dv + &jacobian * (2.0 / tau)));
        matrix.cw.view_mut((row, 0), (3, nv)).copy_from(&acc.da);
    }

    add_multiplier_terms(s, matrix, residual);
}

/// Impulse counterpart of [`linearize_contact_dynamics`].
pub fn linearize_impulse_dynamics(
    robot: &dyn RobotModel,
    status: &ContactStatus,
    s: &SplitSolution,
    matrix: &mut SplitKktMatrix,
    residual: &mut SplitKktResidual,
) {
    let nv = robot.dimv();
    residual.c = eval_impulse_dynamics(robot, status, s);

    let (dq, ddv) = robot.impulse_dynamics_derivatives(&s.q, &s.dv);
    matrix.cz.fill(0.0);
    matrix.cw.fill(0.0);
    matrix.cz.view_mut((0, 0), (nv, nv)).copy_from(&dq);
    matrix.cw.view_mut((0, 0), (nv, nv)).copy_from(&ddv);

    let v_plus = &s.v + &s.dv;
    for (k, i) in status.active_contacts().enumerate() {
        let impulse = s.contact_force(k);
        let jacobian = robot.contact_jacobian(&s.q, i);
        let row = nv + 3 * k;

        let mut dyn_dq = matrix.cz.view_mut((0, 0), (nv, nv));
        dyn_dq -= robot.contact_jacobian_transpose_derivative(&s.q, i, &impulse);
        matrix
            .cw
            .view_mut((0, nv + 3 * k), (nv, 3))
            .copy_from(&(-jacobian.transpose()));

        matrix
            .cz
            .view_mut((row, 0), (3, nv))
            .copy_from(&robot.contact_velocity_derivative(&s.q, &v_plus, i));
        matrix.cz.view_mut((row, nv), (3, nv)).copy_from(&jacobian);
        matrix.cw.view_mut((row, 0), (3, nv)).copy_from(&jacobian);
    }

    add_multiplier_terms(s, matrix, residual);
}

/// Condensation data kept for the expansion
#[derive(Debug, Clone)]
pub struct ContactDynamics {
    cw_inv: DMatrix<f64>,
    psi_z: DMatrix<f64>,
    psi_0: DVector<f64>,
    h_wz: DMatrix<f64>,
    h_ww: DMatrix<f64>,
    l_w: DVector<f64>,
    f_w: DMatrix<f64>,
}

impl Default for ContactDynamics {
    fn default() -> Self {
        Self {
            cw_inv: DMatrix::zeros(0, 0),
            psi_z: DMatrix::zeros(0, 0),
            psi_0: DVector::zeros(0),
            h_wz: DMatrix::zeros(0, 0),
            h_ww: DMatrix::zeros(0, 0),
            l_w: DVector::zeros(0),
            f_w: DMatrix::zeros(0, 0),
        }
    }
}

impl ContactDynamics {
    /// Eliminate `w` and `β`, overwriting the leading block of the stage
    /// model with the condensed one.
    pub fn condense(
        &mut self,
        stage: usize,
        matrix: &mut SplitKktMatrix,
        residual: &mut SplitKktResidual,
    ) -> Result<(), SolverError> {
        let layout = *matrix.layout();
        let (dimx, dimu, dimz, dimw) = (layout.dimx(), layout.dimu, layout.dimz(), layout.dimw());

        self.cw_inv = matrix
            .cw
            .clone()
            .lu()
            .try_inverse()
            .ok_or(SolverError::SingularContactDynamics { stage })?;
        self.psi_z = -(&self.cw_inv * &matrix.cz);
        self.psi_0 = -(&self.cw_inv * &residual.c);

        let h_zz = matrix.hessian.view((0, 0), (dimz, dimz));
        let h_zw = matrix.hessian.view((0, dimz), (dimz, dimw));
        self.h_wz = matrix.hessian.view((dimz, 0), (dimw, dimz)).into_owned();
        self.h_ww = matrix.hessian.view((dimz, dimz), (dimw, dimw)).into_owned();
        self.l_w = residual.lz.rows(dimz, dimw).into_owned();
        self.f_w = matrix.fxw.clone();

        let psi_t = self.psi_z.transpose();
        // Hzw + Ψᵀ Hww
        let coupling = h_zw + &psi_t * &self.h_ww;
        let h_hat = h_zz + &psi_t * &self.h_wz + &coupling * &self.psi_z;
        let l_hat = residual.lz.rows(0, dimz) + &psi_t * &self.l_w + &coupling * &self.psi_0;

        let mut f_z = DMatrix::zeros(dimx, dimz);
        f_z.columns_mut(0, dimx).copy_from(&matrix.fxx);
        f_z.columns_mut(dimx, dimu).copy_from(&matrix.fxu);
        let a_hat = f_z + &self.f_w * &self.psi_z;
        let b_hat = &residual.fx + &self.f_w * &self.psi_0;

        matrix.hessian.view_mut((0, 0), (dimz, dimz)).copy_from(&h_hat);
        residual.lz.rows_mut(0, dimz).copy_from(&l_hat);
        matrix.fxx.copy_from(&a_hat.columns(0, dimx));
        matrix.fxu.copy_from(&a_hat.columns(dimx, dimu));
        residual.fx = b_hat;
        Ok(())
    }

    /// `dw = Ψ dz + ψ₀`
    pub fn expand_primal(&self, d: &mut SplitDirection) {
        d.dw = &self.psi_z * &self.reduced_direction(d) + &self.psi_0;
    }

    /// `dβ = −Cw⁻ᵀ (Hwz dz + Hww dw + Fwᵀ dλ' + lw)`
    pub fn expand_dual(&self, dlambda_next: &DVector<f64>, d: &mut SplitDirection) {
        let rhs = &self.h_wz * &self.reduced_direction(d)
            + &self.h_ww * &d.dw
            + self.f_w.tr_mul(dlambda_next)
            + &self.l_w;
        d.dbeta = -self.cw_inv.tr_mul(&rhs);
    }

    fn reduced_direction(&self, d: &SplitDirection) -> DVector<f64> {
        let (dimx, dimu) = (d.dx.len(), d.du.len());
        let mut dz = DVector::zeros(dimx + dimu);
        dz.rows_mut(0, dimx).copy_from(&d.dx);
        dz.rows_mut(dimx, dimu).copy_from(&d.du);
        dz
    }
}
