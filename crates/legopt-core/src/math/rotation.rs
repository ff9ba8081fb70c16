//! Contact-frame rotation utilities
//!
//! Contact placements carry a rotation whose z-axis is the surface normal.
//! Friction cones are expressed in that frame.

use nalgebra::{Matrix3, Vector3};

/// Rotation whose z-axis is aligned with a surface normal
///
/// # Arguments
/// * `normal` - Surface normal (will be normalized)
/// * `yaw` - Heading of the tangential x-axis [rad]
///
/// # Returns
/// Rotation matrix with columns `[x, y, n]`, mapping contact-frame vectors to
/// the world frame.
pub fn surface_rotation_from_normal(normal: &Vector3<f64>, yaw: f64) -> Matrix3<f64> {
    let z = normal.normalize();
    let x_c = Vector3::new(yaw.cos(), yaw.sin(), 0.0);

    let y = z.cross(&x_c);
    let y_norm = y.norm();
    let y = if y_norm > 1e-6 {
        y / y_norm
    } else {
        // normal lies in the horizontal heading direction
        Vector3::new(-yaw.sin(), yaw.cos(), 0.0)
    };
    let x = y.cross(&z);

    Matrix3::from_columns(&[x, y, z])
}

/// Express a world-frame vector in a contact frame.
pub fn to_contact_frame(rotation: &Matrix3<f64>, v: &Vector3<f64>) -> Vector3<f64> {
    rotation.transpose() * v
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_flat_ground_is_identity() {
        let r = surface_rotation_from_normal(&Vector3::z(), 0.0);
        assert_relative_eq!(r, Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_slope_rotation_is_orthonormal() {
        let normal = Vector3::new(0.3, -0.2, 1.0);
        let r = surface_rotation_from_normal(&normal, 0.4);

        assert_relative_eq!(r.transpose() * r, Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(r.column(2).into_owned(), normal.normalize(), epsilon = 1e-12);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-12);

        let local = to_contact_frame(&r, &normal);
        assert_relative_eq!(local.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(local.y, 0.0, epsilon = 1e-12);
    }
}
