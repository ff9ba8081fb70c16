//! Robot model interface
//!
//! The optimizer consumes rigid-body dynamics through [`RobotModel`]. A model
//! is fixed for the lifetime of a solver and is queried concurrently from the
//! stage workers, so every query takes `&self` and must be free of interior
//! mutation.

pub mod contact_status;
pub mod impulse_status;
pub mod manipulator;
pub mod point_mass;

pub use contact_status::ContactStatus;
pub use impulse_status::ImpulseStatus;
pub use manipulator::{JointParameters, Manipulator};
pub use point_mass::PointMass;

use nalgebra::{DMatrix, DVector, Vector3};

/// Partial derivatives of the inverse dynamics `ID(q, v, a)`
#[derive(Debug, Clone)]
pub struct InverseDynamicsDerivatives {
    /// ∂ID/∂q (dimv × dimv, tangent space)
    pub dq: DMatrix<f64>,
    /// ∂ID/∂v
    pub dv: DMatrix<f64>,
    /// ∂ID/∂a, the joint-space mass matrix
    pub da: DMatrix<f64>,
}

/// Partial derivatives of a contact-point acceleration (each 3 × dimv)
#[derive(Debug, Clone)]
pub struct ContactAccelerationDerivatives {
    pub dq: DMatrix<f64>,
    pub dv: DMatrix<f64>,
    pub da: DMatrix<f64>,
}

/// Rigid-body model with point contacts
///
/// Configuration lives on a manifold of dimension `dimq`; velocities,
/// accelerations and configuration increments live in its tangent space of
/// dimension `dimv`. The default manifold operations are Euclidean.
pub trait RobotModel: Send + Sync {
    fn dimq(&self) -> usize;
    fn dimv(&self) -> usize;
    fn dimu(&self) -> usize;
    fn max_num_contacts(&self) -> usize;

    /// Largest stacked contact-force dimension.
    fn max_dimf(&self) -> usize {
        3 * self.max_num_contacts()
    }

    fn create_contact_status(&self) -> ContactStatus {
        ContactStatus::new(self.max_num_contacts())
    }

    fn neutral_configuration(&self) -> DVector<f64> {
        DVector::zeros(self.dimq())
    }

    /// `q ⊕ (v · step)`
    fn integrate_configuration(&self, q: &DVector<f64>, v: &DVector<f64>, step: f64) -> DVector<f64> {
        q + v * step
    }

    /// Derivatives of `q ⊕ (v · step)` with respect to `q` and to the tangent
    /// increment `v · step` (the caller applies the `step` factor).
    fn d_integrate_configuration(
        &self,
        _q: &DVector<f64>,
        _v: &DVector<f64>,
        _step: f64,
    ) -> (DMatrix<f64>, DMatrix<f64>) {
        let n = self.dimv();
        (DMatrix::identity(n, n), DMatrix::identity(n, n))
    }

    /// Tangent vector `q_plus ⊖ q_minus`.
    fn subtract_configuration(&self, q_plus: &DVector<f64>, q_minus: &DVector<f64>) -> DVector<f64> {
        q_plus - q_minus
    }

    /// Actuation selection matrix S (dimu × dimv); torques act as `Sᵀ u`.
    fn selection_matrix(&self) -> DMatrix<f64> {
        let (nu, nv) = (self.dimu(), self.dimv());
        let mut s = DMatrix::zeros(nu, nv);
        for i in 0..nu {
            s[(i, nv - nu + i)] = 1.0;
        }
        s
    }

    /// Joint torques `M(q) a + h(q, v)` required for acceleration `a`
    /// without contact forces.
    fn inverse_dynamics(&self, q: &DVector<f64>, v: &DVector<f64>, a: &DVector<f64>) -> DVector<f64>;

    fn inverse_dynamics_derivatives(
        &self,
        q: &DVector<f64>,
        v: &DVector<f64>,
        a: &DVector<f64>,
    ) -> InverseDynamicsDerivatives;

    /// Impulse dynamics `M(q) dv`.
    fn impulse_dynamics(&self, q: &DVector<f64>, dv: &DVector<f64>) -> DVector<f64> {
        let zero = DVector::zeros(self.dimv());
        self.inverse_dynamics(q, &zero, dv) - self.inverse_dynamics(q, &zero, &zero)
    }

    /// Derivatives of `M(q) dv` with respect to `q` and `dv`.
    fn impulse_dynamics_derivatives(
        &self,
        q: &DVector<f64>,
        dv: &DVector<f64>,
    ) -> (DMatrix<f64>, DMatrix<f64>) {
        let zero = DVector::zeros(self.dimv());
        let with_jump = self.inverse_dynamics_derivatives(q, &zero, dv);
        let without = self.inverse_dynamics_derivatives(q, &zero, &zero);
        (with_jump.dq - without.dq, with_jump.da)
    }

    /// World position of a contact point.
    fn contact_position(&self, q: &DVector<f64>, contact_index: usize) -> Vector3<f64>;

    /// Translational contact Jacobian (3 × dimv).
    fn contact_jacobian(&self, q: &DVector<f64>, contact_index: usize) -> DMatrix<f64>;

    /// Contact-point acceleration `J a + J̇ v`.
    fn contact_acceleration(
        &self,
        q: &DVector<f64>,
        v: &DVector<f64>,
        a: &DVector<f64>,
        contact_index: usize,
    ) -> Vector3<f64>;

    fn contact_acceleration_derivatives(
        &self,
        q: &DVector<f64>,
        v: &DVector<f64>,
        a: &DVector<f64>,
        contact_index: usize,
    ) -> ContactAccelerationDerivatives;

    /// ∂(J(q) w)/∂q for a fixed tangent vector `w` (3 × dimv).
    fn contact_velocity_derivative(
        &self,
        q: &DVector<f64>,
        w: &DVector<f64>,
        contact_index: usize,
    ) -> DMatrix<f64>;

    /// ∂(J(q)ᵀ f)/∂q for a fixed contact force `f` (dimv × dimv).
    fn contact_jacobian_transpose_derivative(
        &self,
        q: &DVector<f64>,
        contact_index: usize,
        f: &Vector3<f64>,
    ) -> DMatrix<f64>;
}
