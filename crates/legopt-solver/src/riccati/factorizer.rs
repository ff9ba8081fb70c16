//! Backward Riccati step of one stage
//!
//! With the condensed stage model `(Ĥ, ĥ, Â, b̂)` and the next value
//! function `(P', s')`:
//!
//! ```text
//! Q  = Ĥ + Âᵀ P' Â
//! q  = ĥ + Âᵀ (P' b̂ − s')
//! K  = −Quu⁻¹ Qux,   k = −Quu⁻¹ qu
//! P  = Qxx + Qxu K,  s = −(qx + Qxu k)
//! ```
//!
//! Impulse stages have no control, so `P = Qxx` and `s = −qx`.

use nalgebra::DVector;
use tracing::warn;

use legopt_core::math::{regularized_cholesky, symmetrize};

use super::{LqrPolicy, SplitRiccatiFactorization};
use crate::config::RegularizationConfig;
use crate::error::FactorizationError;
use crate::kkt::{SplitKktMatrix, SplitKktResidual};
use crate::solution::SplitDirection;

#[derive(Debug, Clone)]
pub struct RiccatiFactorizer {
    regularization: RegularizationConfig,
}

impl RiccatiFactorizer {
    pub fn new(regularization: RegularizationConfig) -> Self {
        Self { regularization }
    }

    /// `Qxx += ÂxᵀPÂx`, `Qxu += ÂxᵀPÂu`, `Quu += ÂuᵀPÂu`
    pub fn factorize_matrix(next: &SplitRiccatiFactorization, matrix: &mut SplitKktMatrix) {
        let layout = *matrix.layout();
        let (dimx, dimu) = (layout.dimx(), layout.dimu);

        let p_ax = &next.p * &matrix.fxx;
        let qxx = matrix.fxx.tr_mul(&p_ax);
        matrix.add_to_block(layout.x(), layout.x(), &qxx);
        if dimu == 0 {
            return;
        }
        let p_au = &next.p * &matrix.fxu;
        let qxu = matrix.fxx.tr_mul(&p_au);
        let quu = matrix.fxu.tr_mul(&p_au);
        matrix.add_to_block(layout.x(), layout.u(), &qxu);
        matrix.add_to_block(layout.u(), layout.x(), &qxu.transpose());
        matrix.add_to_block(layout.u(), layout.u(), &quu);
        debug_assert_eq!(matrix.qxu().shape(), (dimx, dimu));
    }

    /// `lx += Âxᵀ(P b̂ − s)`, `lu += Âuᵀ(P b̂ − s)`
    pub fn factorize_vector(
        next: &SplitRiccatiFactorization,
        matrix: &SplitKktMatrix,
        residual: &mut SplitKktResidual,
    ) {
        let layout = *matrix.layout();
        let v = &next.p * &residual.fx - &next.s;
        let lx = matrix.fxx.tr_mul(&v);
        residual.add_to_segment(layout.x(), &lx);
        if layout.dimu > 0 {
            let lu = matrix.fxu.tr_mul(&v);
            residual.add_to_segment(layout.u(), &lu);
        }
    }

    /// Solve for the policy through a regularized Cholesky factorization of
    /// `Quu`.
    pub fn compute_policy(
        &self,
        stage: usize,
        matrix: &SplitKktMatrix,
        residual: &SplitKktResidual,
        policy: &mut LqrPolicy,
    ) -> Result<(), FactorizationError> {
        let layout = *matrix.layout();
        policy.resize(layout.dimv, layout.dimu);
        if layout.dimu == 0 {
            return Ok(());
        }

        let mut quu = matrix.quu().into_owned();
        symmetrize(&mut quu);
        let config = &self.regularization;
        let (chol, delta) =
            regularized_cholesky(&quu, config.initial, config.growth_factor, config.max_attempts)
                .ok_or_else(|| FactorizationError {
                    stage,
                    regularization: config.initial
                        * config.growth_factor.powi(config.max_attempts as i32 - 1),
                })?;
        if delta > 0.0 {
            warn!(stage, delta, "regularized control Hessian");
        }

        let qux = matrix.qxu().transpose();
        policy.gain = -chol.solve(&qux);
        policy.feedforward = -chol.solve(&residual.lu().into_owned());
        Ok(())
    }

    /// Backward step of a regular stage. `matrix` and `residual` are left
    /// holding `Q` and `q`.
    pub fn backward_regular(
        &self,
        stage: usize,
        next: &SplitRiccatiFactorization,
        matrix: &mut SplitKktMatrix,
        residual: &mut SplitKktResidual,
        policy: &mut LqrPolicy,
        current: &mut SplitRiccatiFactorization,
    ) -> Result<(), FactorizationError> {
        Self::factorize_matrix(next, matrix);
        Self::factorize_vector(next, matrix, residual);
        self.compute_policy(stage, matrix, residual, policy)?;

        current.p = matrix.qxx().into_owned();
        current.s = -residual.lx().into_owned();
        if matrix.layout().dimu > 0 {
            current.p += matrix.qxu() * &policy.gain;
            current.s -= matrix.qxu() * &policy.feedforward;
        }
        symmetrize(&mut current.p);
        Ok(())
    }

    /// Backward step through an impulse.
    pub fn backward_impulse(
        next: &SplitRiccatiFactorization,
        matrix: &mut SplitKktMatrix,
        residual: &mut SplitKktResidual,
        current: &mut SplitRiccatiFactorization,
    ) {
        Self::factorize_matrix(next, matrix);
        Self::factorize_vector(next, matrix, residual);
        current.p = matrix.qxx().into_owned();
        symmetrize(&mut current.p);
        current.s = -residual.lx().into_owned();
    }

    /// Terminal value function `P = φxx`, `s = −lx`.
    pub fn terminal(matrix: &SplitKktMatrix, residual: &SplitKktResidual, current: &mut SplitRiccatiFactorization) {
        current.p = matrix.qxx().into_owned();
        symmetrize(&mut current.p);
        current.s = -residual.lx().into_owned();
    }

    /// `du = K dx + k`, returns `dx' = Âx dx + Âu du + b̂`.
    pub fn forward(
        matrix: &SplitKktMatrix,
        residual: &SplitKktResidual,
        policy: &LqrPolicy,
        d: &mut SplitDirection,
    ) -> DVector<f64> {
        let mut dx_next = &matrix.fxx * &d.dx + &residual.fx;
        if matrix.layout().dimu > 0 {
            d.du = policy.control_direction(&d.dx);
            dx_next += &matrix.fxu * &d.du;
        }
        dx_next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kkt::StageLayout;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_matrix(rng: &mut ChaCha8Rng, rows: usize, cols: usize) -> DMatrix<f64> {
        DMatrix::from_fn(rows, cols, |_, _| rng.gen_range(-1.0..1.0))
    }

    fn random_symmetric(rng: &mut ChaCha8Rng, n: usize) -> DMatrix<f64> {
        let a = random_matrix(rng, n, n);
        &a * a.transpose() + DMatrix::identity(n, n)
    }

    fn forward_euler(nv: usize, dt: f64) -> DMatrix<f64> {
        let mut a = DMatrix::identity(2 * nv, 2 * nv);
        a.view_mut((0, nv), (nv, nv)).fill_diagonal(dt);
        a
    }

    #[test]
    fn test_factorize_matrix_fixed_base() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let nv = 4;
        let dt = rng.gen_range(0.01..0.5);
        let layout = StageLayout::regular(nv, nv, 0);
        let mut matrix = SplitKktMatrix::new(layout);
        let q_in = random_symmetric(&mut rng, 2 * nv);
        matrix.hessian.view_mut((0, 0), (2 * nv, 2 * nv)).copy_from(&q_in);
        matrix.fxx = forward_euler(nv, dt);

        let mut next = SplitRiccatiFactorization::new(nv);
        next.p = random_symmetric(&mut rng, 2 * nv);
        RiccatiFactorizer::factorize_matrix(&next, &mut matrix);

        let (pqq, pqv, pvq, pvv) = (next.pqq(), next.pqv(), next.pvq(), next.pvv());
        let q_qq = q_in.view((0, 0), (nv, nv));
        let q_qv = q_in.view((0, nv), (nv, nv));
        let q_vq = q_in.view((nv, 0), (nv, nv));
        let q_vv = q_in.view((nv, nv), (nv, nv));
        assert_relative_eq!(matrix.qqq().into_owned(), q_qq + pqq, epsilon = 1e-12);
        assert_relative_eq!(matrix.qqv().into_owned(), q_qv + pqq * dt + pqv, epsilon = 1e-12);
        assert_relative_eq!(matrix.qvq().into_owned(), q_vq + pqq * dt + pvq, epsilon = 1e-12);
        assert_relative_eq!(
            matrix.qvv().into_owned(),
            q_vv + pqq * (dt * dt) + (pqv + pvq) * dt + pvv,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_factorize_matrix_with_integration_jacobians() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let nv = 3;
        let dt = 0.05;
        let layout = StageLayout::regular(nv, 2, 0);
        let mut matrix = SplitKktMatrix::new(layout);
        let fqq = random_matrix(&mut rng, nv, nv);
        let fqv = random_matrix(&mut rng, nv, nv) * dt;
        matrix.fxx = forward_euler(nv, dt);
        matrix.fxx.view_mut((0, 0), (nv, nv)).copy_from(&fqq);
        matrix.fxx.view_mut((0, nv), (nv, nv)).copy_from(&fqv);
        matrix.fxu = random_matrix(&mut rng, 2 * nv, 2);

        let mut next = SplitRiccatiFactorization::new(nv);
        next.p = random_symmetric(&mut rng, 2 * nv);
        RiccatiFactorizer::factorize_matrix(&next, &mut matrix);

        let a = &matrix.fxx;
        let b = &matrix.fxu;
        assert_relative_eq!(matrix.qxx().into_owned(), a.transpose() * &next.p * a, epsilon = 1e-12);
        assert_relative_eq!(matrix.qxu().into_owned(), a.transpose() * &next.p * b, epsilon = 1e-12);
        assert_relative_eq!(matrix.quu().into_owned(), b.transpose() * &next.p * b, epsilon = 1e-12);
    }

    #[test]
    fn test_backward_and_forward_solve_stage_kkt() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let (nv, nu) = (2, 2);
        let layout = StageLayout::regular(nv, nu, 0);
        let mut matrix = SplitKktMatrix::new(layout);
        let mut residual = SplitKktResidual::new(layout);
        let dimz = layout.dimz();
        let h = random_symmetric(&mut rng, dimz);
        matrix.hessian.view_mut((0, 0), (dimz, dimz)).copy_from(&h);
        matrix.fxx = forward_euler(nv, 0.1);
        matrix.fxu = random_matrix(&mut rng, 2 * nv, nu);
        residual.lz.rows_mut(0, dimz).copy_from(&DVector::from_fn(dimz, |_, _| rng.gen_range(-1.0..1.0)));
        residual.fx = DVector::from_fn(2 * nv, |_, _| rng.gen_range(-1.0..1.0));
        let (h0, l0, a, b, fb) = (
            h.clone(),
            residual.lz.rows(0, dimz).into_owned(),
            matrix.fxx.clone(),
            matrix.fxu.clone(),
            residual.fx.clone(),
        );

        let mut next = SplitRiccatiFactorization::new(nv);
        next.p = random_symmetric(&mut rng, 2 * nv);
        next.s = DVector::from_fn(2 * nv, |_, _| rng.gen_range(-1.0..1.0));

        let factorizer = RiccatiFactorizer::new(RegularizationConfig::default());
        let mut policy = LqrPolicy::new(nv, nu);
        let mut current = SplitRiccatiFactorization::new(nv);
        factorizer
            .backward_regular(0, &next, &mut matrix, &mut residual, &mut policy, &mut current)
            .unwrap();

        let mut d = SplitDirection::new(layout);
        d.dx = DVector::from_fn(2 * nv, |_, _| rng.gen_range(-1.0..1.0));
        let dx_next = RiccatiFactorizer::forward(&matrix, &residual, &policy, &mut d);
        let dlmd = current.costate_direction(&d.dx);
        let dlmd_next = next.costate_direction(&dx_next);

        // stationarity of the stage Lagrangian in (x, u)
        let mut dz = DVector::zeros(dimz);
        dz.rows_mut(0, 2 * nv).copy_from(&d.dx);
        dz.rows_mut(2 * nv, nu).copy_from(&d.du);
        let mut f_z = DMatrix::zeros(2 * nv, dimz);
        f_z.columns_mut(0, 2 * nv).copy_from(&a);
        f_z.columns_mut(2 * nv, nu).copy_from(&b);
        let mut stationarity = &h0 * &dz + &l0 + f_z.tr_mul(&dlmd_next);
        let mut sx = stationarity.rows_mut(0, 2 * nv);
        sx -= &dlmd;
        assert_relative_eq!(stationarity.norm(), 0.0, epsilon = 1e-10);
        assert_relative_eq!(dx_next, &a * &d.dx + &b * &d.du + fb, epsilon = 1e-12);
    }

    #[test]
    fn test_indefinite_control_hessian_fails() {
        let layout = StageLayout::regular(1, 1, 0);
        let mut matrix = SplitKktMatrix::new(layout);
        matrix.hessian[(2, 2)] = -1e6;
        let residual = SplitKktResidual::new(layout);
        let factorizer = RiccatiFactorizer::new(RegularizationConfig {
            initial: 1e-9,
            growth_factor: 10.0,
            max_attempts: 3,
        });
        let mut policy = LqrPolicy::new(1, 1);
        let err = factorizer
            .compute_policy(5, &matrix, &residual, &mut policy)
            .unwrap_err();
        assert_eq!(err.stage, 5);
    }
}
