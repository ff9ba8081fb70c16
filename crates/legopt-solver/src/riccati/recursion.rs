//! Riccati recursion over the whole grid

use nalgebra::DVector;

use super::{LqrPolicy, RiccatiFactorizer, SplitRiccatiFactorization};
use crate::config::RegularizationConfig;
use crate::error::FactorizationError;
use crate::kkt::{SplitKktMatrix, SplitKktResidual};
use crate::solution::SplitDirection;

/// Sequential backward and forward sweeps
///
/// Slices are indexed by grid point; the last entry of `kkt_matrices`,
/// `kkt_residuals`, `factorizations` and `directions` belongs to the
/// terminal stage, which has no policy.
#[derive(Debug, Clone)]
pub struct RiccatiRecursion {
    factorizer: RiccatiFactorizer,
}

impl RiccatiRecursion {
    pub fn new(regularization: RegularizationConfig) -> Self {
        Self {
            factorizer: RiccatiFactorizer::new(regularization),
        }
    }

    pub fn backward(
        &self,
        is_impulse: &[bool],
        kkt_matrices: &mut [SplitKktMatrix],
        kkt_residuals: &mut [SplitKktResidual],
        policies: &mut [LqrPolicy],
        factorizations: &mut [SplitRiccatiFactorization],
    ) -> Result<(), FactorizationError> {
        let n = policies.len();
        debug_assert_eq!(is_impulse.len(), n);
        debug_assert_eq!(factorizations.len(), n + 1);

        RiccatiFactorizer::terminal(&kkt_matrices[n], &kkt_residuals[n], &mut factorizations[n]);
        for i in (0..n).rev() {
            let (head, tail) = factorizations.split_at_mut(i + 1);
            let (current, next) = (&mut head[i], &tail[0]);
            if is_impulse[i] {
                RiccatiFactorizer::backward_impulse(next, &mut kkt_matrices[i], &mut kkt_residuals[i], current);
                policies[i].resize(kkt_matrices[i].layout().dimv, 0);
            } else {
                self.factorizer.backward_regular(
                    i,
                    next,
                    &mut kkt_matrices[i],
                    &mut kkt_residuals[i],
                    &mut policies[i],
                    current,
                )?;
            }
        }
        Ok(())
    }

    /// Propagate `dx` from the initial-state direction `dx0` and set `du`.
    pub fn forward(
        &self,
        kkt_matrices: &[SplitKktMatrix],
        kkt_residuals: &[SplitKktResidual],
        policies: &[LqrPolicy],
        directions: &mut [SplitDirection],
        dx0: &DVector<f64>,
    ) {
        directions[0].dx.copy_from(dx0);
        for i in 0..policies.len() {
            let (head, tail) = directions.split_at_mut(i + 1);
            let dx_next =
                RiccatiFactorizer::forward(&kkt_matrices[i], &kkt_residuals[i], &policies[i], &mut head[i]);
            tail[0].dx.copy_from(&dx_next);
        }
    }

    /// `dλ = P dx − s` at every grid point.
    pub fn costate_directions(
        factorizations: &[SplitRiccatiFactorization],
        directions: &mut [SplitDirection],
    ) {
        for (factorization, d) in factorizations.iter().zip(directions.iter_mut()) {
            let dlambda = factorization.costate_direction(&d.dx);
            d.set_dlambda(&dlambda);
        }
    }
}
