//! Fixed-base serial manipulator with decoupled pendulum joints
//!
//! Each joint is a damped pendulum:
//! ```text
//! τᵢ = Iᵢ aᵢ + bᵢ vᵢ + Gᵢ sin qᵢ
//! ```
//! Fully actuated, no contacts.

use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};

use super::{ContactAccelerationDerivatives, InverseDynamicsDerivatives, RobotModel};
use crate::error::{CoreError, CoreResult};

/// Physical parameters of one joint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointParameters {
    /// Reflected link inertia [kg·m²]
    pub inertia: f64,
    /// Viscous damping [N·m·s/rad]
    pub damping: f64,
    /// Peak gravity torque m·g·l [N·m]
    pub gravity_torque: f64,
}

impl Default for JointParameters {
    fn default() -> Self {
        Self {
            inertia: 1.0,
            damping: 0.1,
            gravity_torque: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manipulator {
    joints: Vec<JointParameters>,
}

impl Manipulator {
    pub fn new(joints: Vec<JointParameters>) -> CoreResult<Self> {
        if joints.is_empty() {
            return Err(CoreError::InvalidParameter(
                "manipulator needs at least one joint".to_string(),
            ));
        }
        if let Some(j) = joints.iter().find(|j| !(j.inertia > 0.0)) {
            return Err(CoreError::InvalidParameter(format!(
                "joint inertia must be positive, got {}",
                j.inertia
            )));
        }
        Ok(Self { joints })
    }

    /// `n` identical joints with default parameters.
    pub fn uniform(n: usize) -> CoreResult<Self> {
        Self::new(vec![JointParameters::default(); n])
    }

    pub fn joints(&self) -> &[JointParameters] {
        &self.joints
    }

    fn diagonal(&self, f: impl Fn(usize, &JointParameters) -> f64) -> DMatrix<f64> {
        let n = self.joints.len();
        DMatrix::from_diagonal(&DVector::from_iterator(
            n,
            self.joints.iter().enumerate().map(|(i, j)| f(i, j)),
        ))
    }
}

impl RobotModel for Manipulator {
    fn dimq(&self) -> usize {
        self.joints.len()
    }

    fn dimv(&self) -> usize {
        self.joints.len()
    }

    fn dimu(&self) -> usize {
        self.joints.len()
    }

    fn max_num_contacts(&self) -> usize {
        0
    }

    fn inverse_dynamics(&self, q: &DVector<f64>, v: &DVector<f64>, a: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.joints.len(),
            self.joints
                .iter()
                .enumerate()
                .map(|(i, j)| j.inertia * a[i] + j.damping * v[i] + j.gravity_torque * q[i].sin()),
        )
    }

    fn inverse_dynamics_derivatives(
        &self,
        q: &DVector<f64>,
        _v: &DVector<f64>,
        _a: &DVector<f64>,
    ) -> InverseDynamicsDerivatives {
        InverseDynamicsDerivatives {
            dq: self.diagonal(|i, j| j.gravity_torque * q[i].cos()),
            dv: self.diagonal(|_, j| j.damping),
            da: self.diagonal(|_, j| j.inertia),
        }
    }

    fn contact_position(&self, _q: &DVector<f64>, _contact_index: usize) -> Vector3<f64> {
        Vector3::zeros()
    }

    fn contact_jacobian(&self, _q: &DVector<f64>, _contact_index: usize) -> DMatrix<f64> {
        DMatrix::zeros(3, self.dimv())
    }

    fn contact_acceleration(
        &self,
        _q: &DVector<f64>,
        _v: &DVector<f64>,
        _a: &DVector<f64>,
        _contact_index: usize,
    ) -> Vector3<f64> {
        Vector3::zeros()
    }

    fn contact_acceleration_derivatives(
        &self,
        _q: &DVector<f64>,
        _v: &DVector<f64>,
        _a: &DVector<f64>,
        _contact_index: usize,
    ) -> ContactAccelerationDerivatives {
        let zero = DMatrix::zeros(3, self.dimv());
        ContactAccelerationDerivatives {
            dq: zero.clone(),
            dv: zero.clone(),
            da: zero,
        }
    }

    fn contact_velocity_derivative(
        &self,
        _q: &DVector<f64>,
        _w: &DVector<f64>,
        _contact_index: usize,
    ) -> DMatrix<f64> {
        DMatrix::zeros(3, self.dimv())
    }

    fn contact_jacobian_transpose_derivative(
        &self,
        _q: &DVector<f64>,
        _contact_index: usize,
        _f: &Vector3<f64>,
    ) -> DMatrix<f64> {
        DMatrix::zeros(self.dimv(), self.dimv())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rejects_non_positive_inertia() {
        let bad = JointParameters {
            inertia: 0.0,
            ..Default::default()
        };
        assert!(Manipulator::new(vec![bad]).is_err());
        assert!(Manipulator::new(vec![]).is_err());
    }

    #[test]
    fn test_inverse_dynamics_derivatives_match_finite_differences() {
        let robot = Manipulator::uniform(2).unwrap();
        let q = DVector::from_vec(vec![0.3, -0.7]);
        let v = DVector::from_vec(vec![0.5, 0.1]);
        let a = DVector::from_vec(vec![-1.0, 2.0]);
        let d = robot.inverse_dynamics_derivatives(&q, &v, &a);

        let eps = 1e-7;
        for k in 0..2 {
            let mut q_eps = q.clone();
            q_eps[k] += eps;
            let fd = (robot.inverse_dynamics(&q_eps, &v, &a) - robot.inverse_dynamics(&q, &v, &a)) / eps;
            assert_relative_eq!(fd, d.dq.column(k).into_owned(), epsilon = 1e-5);
        }
        assert_relative_eq!(d.da, DMatrix::identity(2, 2));
    }

    #[test]
    fn test_selection_matrix_is_identity_when_fully_actuated() {
        let robot = Manipulator::uniform(3).unwrap();
        assert_relative_eq!(robot.selection_matrix(), DMatrix::identity(3, 3));
    }

    #[test]
    fn test_impulse_dynamics_is_mass_times_jump() {
        let robot = Manipulator::uniform(2).unwrap();
        let q = DVector::from_vec(vec![0.4, 1.1]);
        let dv = DVector::from_vec(vec![0.2, -0.3]);
        assert_relative_eq!(robot.impulse_dynamics(&q, &dv), dv.clone(), epsilon = 1e-12);
        let (dq, ddv) = robot.impulse_dynamics_derivatives(&q, &dv);
        assert_relative_eq!(dq, DMatrix::zeros(2, 2), epsilon = 1e-12);
        assert_relative_eq!(ddv, DMatrix::identity(2, 2));
    }
}
