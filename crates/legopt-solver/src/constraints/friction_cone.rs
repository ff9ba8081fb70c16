//! Linearized friction cones on contact forces and impulses
//!
//! Inner pyramid approximation in the contact frame, five rows per active
//! contact:
//!
//! ```text
//! f_n ≥ 0,   μ' f_n ± f_t1 ≥ 0,   μ' f_n ± f_t2 ≥ 0,   μ' = μ / √2
//! ```

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use legopt_core::math::to_contact_frame;
use legopt_core::robot::ContactStatus;
use legopt_core::RobotModel;

use super::{ConstraintComponent, ConstraintKind};
use crate::kkt::StageLayout;
use crate::solution::SplitSolution;

/// Rows per contact
const NUM_FACES: usize = 5;

/// Friction cone on the contact forces of regular stages
#[derive(Debug, Clone, Default)]
pub struct FrictionCone;

/// Friction cone on the impulses of impulse stages
#[derive(Debug, Clone, Default)]
pub struct ImpulseFrictionCone;

impl FrictionCone {
    pub fn new() -> Self {
        Self
    }
}

impl ImpulseFrictionCone {
    pub fn new() -> Self {
        Self
    }
}

/// Face normals in the contact frame.
fn faces(mu: f64) -> [Vector3<f64>; NUM_FACES] {
    let m = mu / std::f64::consts::SQRT_2;
    [
        Vector3::new(0.0, 0.0, 1.0),
        Vector3::new(-1.0, 0.0, m),
        Vector3::new(1.0, 0.0, m),
        Vector3::new(0.0, -1.0, m),
        Vector3::new(0.0, 1.0, m),
    ]
}

fn evaluate_cone(
    status: &ContactStatus,
    layout: &StageLayout,
    s: &SplitSolution,
    value: &mut DVector<f64>,
    mut jacobian: Option<&mut DMatrix<f64>>,
) {
    let f_start = layout.f().start;
    for (k, contact) in status.active_contacts().enumerate() {
        let rotation: &Matrix3<f64> = status.contact_rotation(contact);
        let f_local = to_contact_frame(rotation, &s.contact_force(k));
        for (j, face) in faces(status.friction_coefficient(contact)).iter().enumerate() {
            let r = NUM_FACES * k + j;
            value[r] = face.dot(&f_local);
            if let Some(jac) = jacobian.as_deref_mut() {
                // d(faceᵀ Rᵀ f)/df = (R face)ᵀ
                let row = rotation * face;
                for c in 0..3 {
                    jac[(r, f_start + 3 * k + c)] = row[c];
                }
            }
        }
    }
}

impl ConstraintComponent for FrictionCone {
    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Stage
    }

    fn dim(&self, _robot: &dyn RobotModel, status: &ContactStatus) -> usize {
        NUM_FACES * status.num_active_contacts()
    }

    fn evaluate(
        &self,
        _robot: &dyn RobotModel,
        status: &ContactStatus,
        layout: &StageLayout,
        s: &SplitSolution,
        value: &mut DVector<f64>,
        jacobian: Option<&mut DMatrix<f64>>,
    ) {
        evaluate_cone(status, layout, s, value, jacobian);
    }
}

impl ConstraintComponent for ImpulseFrictionCone {
    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Impulse
    }

    fn dim(&self, _robot: &dyn RobotModel, status: &ContactStatus) -> usize {
        NUM_FACES * status.num_active_contacts()
    }

    fn evaluate(
        &self,
        _robot: &dyn RobotModel,
        status: &ContactStatus,
        layout: &StageLayout,
        s: &SplitSolution,
        value: &mut DVector<f64>,
        jacobian: Option<&mut DMatrix<f64>>,
    ) {
        evaluate_cone(status, layout, s, value, jacobian);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use legopt_core::math::surface_rotation_from_normal;
    use legopt_core::robot::PointMass;

    fn standing(rotation: Matrix3<f64>) -> (PointMass, ContactStatus, SplitSolution) {
        let robot = PointMass::new(1.0).unwrap();
        let mut status = ContactStatus::all_active(1);
        status.set_contact_placement(0, Vector3::zeros(), rotation).unwrap();
        status.set_friction_coefficient(0, 0.5).unwrap();
        let mut s = SplitSolution::new(&robot);
        s.set_contact_status(&status);
        (robot, status, s)
    }

    #[test]
    fn test_vertical_force_is_inside_cone() {
        let (robot, status, mut s) = standing(Matrix3::identity());
        s.f = DVector::from_vec(vec![0.0, 0.0, 10.0]);
        let layout = StageLayout::regular(3, 3, 3);
        let cone = FrictionCone::new();
        assert_eq!(cone.dim(&robot, &status), 5);

        let mut value = DVector::zeros(5);
        cone.evaluate(&robot, &status, &layout, &s, &mut value, None);
        assert!(value.iter().all(|&g| g > 0.0));
        assert_relative_eq!(value[0], 10.0);
    }

    #[test]
    fn test_sliding_force_violates_cone() {
        let (robot, status, mut s) = standing(Matrix3::identity());
        s.f = DVector::from_vec(vec![6.0, 0.0, 10.0]);
        let layout = StageLayout::regular(3, 3, 3);
        let mut value = DVector::zeros(5);
        FrictionCone::new().evaluate(&robot, &status, &layout, &s, &mut value, None);
        // 0.5 / √2 · 10 − 6 < 0
        assert!(value[1] < 0.0);
        assert!(value[2] > 0.0);
    }

    #[test]
    fn test_jacobian_matches_value_on_slope() {
        let rotation = surface_rotation_from_normal(&Vector3::new(0.2, 0.1, 1.0), 0.3);
        let (robot, status, mut s) = standing(rotation);
        s.f = DVector::from_vec(vec![1.0, -2.0, 8.0]);
        let layout = StageLayout::regular(3, 3, 3);

        let mut value = DVector::zeros(5);
        let mut jac = DMatrix::zeros(5, layout.dim());
        FrictionCone::new().evaluate(&robot, &status, &layout, &s, &mut value, Some(&mut jac));

        // the cone is linear in f
        let mut z = DVector::zeros(layout.dim());
        z.rows_mut(layout.f().start, 3).copy_from(&s.f);
        assert_relative_eq!(&jac * z, value, epsilon = 1e-12);
    }

    #[test]
    fn test_impulse_cone_kind() {
        let (robot, status, _) = standing(Matrix3::identity());
        let cone = ImpulseFrictionCone::new();
        assert_eq!(cone.kind(), ConstraintKind::Impulse);
        assert_eq!(cone.dim(&robot, &status), 5);
    }
}
