//! Actuated point mass with a single point contact
//!
//! Configuration is the world position of the mass, the contact point is the
//! mass itself. The control is a body force, so the model can both stand on
//! a contact and fly between contacts.

use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};

use super::{ContactAccelerationDerivatives, InverseDynamicsDerivatives, RobotModel};
use crate::error::{CoreError, CoreResult};
use crate::GRAVITY;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointMass {
    /// Mass [kg]
    mass: f64,
    /// Gravitational acceleration [m/s²]
    gravity: f64,
}

impl PointMass {
    pub fn new(mass: f64) -> CoreResult<Self> {
        if !(mass > 0.0) {
            return Err(CoreError::InvalidParameter(format!(
                "mass must be positive, got {mass}"
            )));
        }
        Ok(Self {
            mass,
            gravity: GRAVITY,
        })
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn gravity(&self) -> f64 {
        self.gravity
    }
}

impl RobotModel for PointMass {
    fn dimq(&self) -> usize {
        3
    }

    fn dimv(&self) -> usize {
        3
    }

    fn dimu(&self) -> usize {
        3
    }

    fn max_num_contacts(&self) -> usize {
        1
    }

    fn inverse_dynamics(&self, _q: &DVector<f64>, _v: &DVector<f64>, a: &DVector<f64>) -> DVector<f64> {
        let mut tau = a * self.mass;
        tau[2] += self.mass * self.gravity;
        tau
    }

    fn inverse_dynamics_derivatives(
        &self,
        _q: &DVector<f64>,
        _v: &DVector<f64>,
        _a: &DVector<f64>,
    ) -> InverseDynamicsDerivatives {
        InverseDynamicsDerivatives {
            dq: DMatrix::zeros(3, 3),
            dv: DMatrix::zeros(3, 3),
            da: DMatrix::identity(3, 3) * self.mass,
        }
    }

    fn contact_position(&self, q: &DVector<f64>, _contact_index: usize) -> Vector3<f64> {
        Vector3::new(q[0], q[1], q[2])
    }

    fn contact_jacobian(&self, _q: &DVector<f64>, _contact_index: usize) -> DMatrix<f64> {
        DMatrix::identity(3, 3)
    }

    fn contact_acceleration(
        &self,
        _q: &DVector<f64>,
        _v: &DVector<f64>,
        a: &DVector<f64>,
        _contact_index: usize,
    ) -> Vector3<f64> {
        Vector3::new(a[0], a[1], a[2])
    }

    fn contact_acceleration_derivatives(
        &self,
        _q: &DVector<f64>,
        _v: &DVector<f64>,
        _a: &DVector<f64>,
        _contact_index: usize,
    ) -> ContactAccelerationDerivatives {
        ContactAccelerationDerivatives {
            dq: DMatrix::zeros(3, 3),
            dv: DMatrix::zeros(3, 3),
            da: DMatrix::identity(3, 3),
        }
    }

    fn contact_velocity_derivative(
        &self,
        _q: &DVector<f64>,
        _w: &DVector<f64>,
        _contact_index: usize,
    ) -> DMatrix<f64> {
        DMatrix::zeros(3, 3)
    }

    fn contact_jacobian_transpose_derivative(
        &self,
        _q: &DVector<f64>,
        _contact_index: usize,
        _f: &Vector3<f64>,
    ) -> DMatrix<f64> {
        DMatrix::zeros(3, 3)
    }
}
