//! Primal-dual interior-point primitives
//!
//! Constraints are written `g(z) ≥ 0` with slack `s` and dual `ψ`:
//!
//! ```text
//! residual  r    = s − g(z)
//! cmpl           = s ∘ ψ − μ
//! condensing     = (ψ ∘ r − cmpl) / s
//! dual step  Δψ  = −(ψ ∘ Δs + cmpl) / s
//! ```

use nalgebra::DVector;

use super::component_data::ConstraintComponentData;

/// `s = max(g, √μ)`, `ψ = μ / s`.
pub fn set_slack_and_dual_positive(barrier: f64, data: &mut ConstraintComponentData) {
    let floor = barrier.sqrt();
    for i in 0..data.dim() {
        data.slack[i] = data.value[i].max(floor);
        data.dual[i] = barrier / data.slack[i];
    }
}

pub fn compute_complementary_slackness(barrier: f64, data: &mut ConstraintComponentData) {
    data.cmpl = data.slack.component_mul(&data.dual).add_scalar(-barrier);
}

pub fn compute_condensing_coefficient(data: &mut ConstraintComponentData) {
    data.cond = (data.dual.component_mul(&data.residual) - &data.cmpl).component_div(&data.slack);
}

pub fn compute_dual_direction(data: &mut ConstraintComponentData) {
    data.ddual = -(data.dual.component_mul(&data.dslack) + &data.cmpl).component_div(&data.slack);
}

/// Largest `α ∈ (0, 1]` with `v + α Δv ≥ (1 − τ) v` componentwise.
pub fn fraction_to_boundary(fraction_rule: f64, v: &DVector<f64>, dv: &DVector<f64>) -> f64 {
    v.iter()
        .zip(dv.iter())
        .filter(|(_, &d)| d < 0.0)
        .map(|(&x, &d)| -fraction_rule * x / d)
        .fold(1.0_f64, f64::min)
}

/// `−μ Σ log sᵢ`
pub fn log_barrier(barrier: f64, slack: &DVector<f64>) -> f64 {
    -barrier * slack.iter().map(|s| s.ln()).sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn data(values: &[f64]) -> ConstraintComponentData {
        let mut data = ConstraintComponentData::new(values.len(), 1);
        data.value = DVector::from_column_slice(values);
        data
    }

    #[test]
    fn test_initialization_is_strictly_positive() {
        let barrier = 1e-2;
        let mut d = data(&[-3.0, 0.0, 0.05, 2.0]);
        set_slack_and_dual_positive(barrier, &mut d);

        assert_relative_eq!(d.slack[0], 0.1);
        assert_relative_eq!(d.slack[1], 0.1);
        assert_relative_eq!(d.slack[2], 0.1);
        assert_relative_eq!(d.slack[3], 2.0);
        assert!(d.is_positive());

        compute_complementary_slackness(barrier, &mut d);
        assert_relative_eq!(d.cmpl.amax(), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_fraction_to_boundary_rule() {
        let v = DVector::from_vec(vec![1.0, 2.0, 0.5]);
        let dv = DVector::from_vec(vec![-4.0, 1.0, -0.25]);
        let alpha = fraction_to_boundary(0.995, &v, &dv);
        assert_relative_eq!(alpha, 0.995 / 4.0);
        for i in 0..3 {
            assert!(v[i] + alpha * dv[i] >= (1.0 - 0.995) * v[i] - 1e-15);
        }
        // no blocking component
        assert_eq!(fraction_to_boundary(0.995, &v, &DVector::from_element(3, 1.0)), 1.0);
    }

    #[test]
    fn test_dual_direction_linearizes_complementarity() {
        let barrier = 0.1;
        let mut d = data(&[0.5, 1.5]);
        set_slack_and_dual_positive(barrier, &mut d);
        d.dual[0] = 0.4;
        compute_complementary_slackness(barrier, &mut d);
        d.dslack = DVector::from_vec(vec![0.2, -0.3]);
        compute_dual_direction(&mut d);

        // ψ Δs + s Δψ = −cmpl
        let lhs = d.dual.component_mul(&d.dslack) + d.slack.component_mul(&d.ddual);
        assert_relative_eq!(lhs, -d.cmpl.clone(), epsilon = 1e-12);
    }

    #[test]
    fn test_log_barrier() {
        let slack = DVector::from_vec(vec![1.0, std::f64::consts::E]);
        assert_relative_eq!(log_barrier(0.5, &slack), -0.5);
    }
}
