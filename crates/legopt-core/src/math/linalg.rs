//! Dense linear algebra helpers

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

/// Smallest Cholesky pivot accepted as positive definite.
pub const MIN_PIVOT: f64 = 1e-10;

/// Replace `m` by `(m + mᵀ) / 2`.
pub fn symmetrize(m: &mut DMatrix<f64>) {
    let n = m.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (m[(i, j)] + m[(j, i)]);
            m[(i, j)] = avg;
            m[(j, i)] = avg;
        }
    }
}

/// Cholesky factorization with adaptive diagonal regularization
///
/// Tries the plain factorization first, then adds `δ·I` with
/// `δ = initial · growth^k` for `k = 0..max_attempts`.
///
/// # Returns
/// The factorization and the regularization that was applied, or `None`
/// when every attempt failed.
pub fn regularized_cholesky(
    m: &DMatrix<f64>,
    initial: f64,
    growth: f64,
    max_attempts: usize,
) -> Option<(Cholesky<f64, Dyn>, f64)> {
    if let Some(chol) = m.clone().cholesky().filter(has_positive_pivots) {
        return Some((chol, 0.0));
    }

    let n = m.nrows();
    let mut delta = initial;
    for _ in 0..max_attempts {
        let shifted = m + DMatrix::<f64>::identity(n, n) * delta;
        if let Some(chol) = shifted.cholesky().filter(has_positive_pivots) {
            return Some((chol, delta));
        }
        delta *= growth;
    }
    None
}

fn has_positive_pivots(chol: &Cholesky<f64, Dyn>) -> bool {
    chol.l_dirty().diagonal().iter().all(|d| *d > MIN_PIVOT)
}

/// Sum of absolute values.
pub fn l1_norm(v: &DVector<f64>) -> f64 {
    v.iter().map(|x| x.abs()).sum()
}

/// Largest absolute value, zero for an empty vector.
pub fn linf_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_symmetrize() {
        let mut m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 4.0, 3.0]);
        symmetrize(&mut m);
        assert_relative_eq!(m[(0, 1)], 3.0);
        assert_relative_eq!(m[(1, 0)], 3.0);
        assert_relative_eq!(m[(1, 1)], 3.0);
    }

    #[test]
    fn test_cholesky_without_regularization() {
        let m = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let (chol, delta) = regularized_cholesky(&m, 1e-8, 10.0, 5).unwrap();
        assert_eq!(delta, 0.0);
        let x = chol.solve(&DVector::from_vec(vec![1.0, 2.0]));
        assert_relative_eq!(&m * x, DVector::from_vec(vec![1.0, 2.0]), epsilon = 1e-12);
    }

    #[test]
    fn test_cholesky_regularizes_singular_matrix() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let (_, delta) = regularized_cholesky(&m, 1e-6, 10.0, 10).unwrap();
        assert!(delta > 0.0);
    }

    #[test]
    fn test_cholesky_gives_up_on_indefinite_matrix() {
        let m = DMatrix::from_row_slice(2, 2, &[-10.0, 0.0, 0.0, 1.0]);
        assert!(regularized_cholesky(&m, 1e-6, 10.0, 3).is_none());
    }

    #[test]
    fn test_norms() {
        let v = DVector::from_vec(vec![1.0, -3.0, 2.0]);
        assert_relative_eq!(l1_norm(&v), 6.0);
        assert_relative_eq!(linf_norm(&v), 3.0);
        assert_relative_eq!(linf_norm(&DVector::zeros(0)), 0.0);
    }
}
