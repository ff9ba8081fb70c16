//! Quadratic value-function model

use nalgebra::{DMatrix, DMatrixView, DVector};

/// Cost-to-go model with `dλ = P dx − s`
#[derive(Debug, Clone, PartialEq)]
pub struct SplitRiccatiFactorization {
    pub p: DMatrix<f64>,
    pub s: DVector<f64>,
}

impl SplitRiccatiFactorization {
    pub fn new(dimv: usize) -> Self {
        Self {
            p: DMatrix::zeros(2 * dimv, 2 * dimv),
            s: DVector::zeros(2 * dimv),
        }
    }

    fn dimv(&self) -> usize {
        self.s.len() / 2
    }

    pub fn pqq(&self) -> DMatrixView<'_, f64> {
        let nv = self.dimv();
        self.p.view((0, 0), (nv, nv))
    }

    pub fn pqv(&self) -> DMatrixView<'_, f64> {
        let nv = self.dimv();
        self.p.view((0, nv), (nv, nv))
    }

    pub fn pvq(&self) -> DMatrixView<'_, f64> {
        let nv = self.dimv();
        self.p.view((nv, 0), (nv, nv))
    }

    pub fn pvv(&self) -> DMatrixView<'_, f64> {
        let nv = self.dimv();
        self.p.view((nv, nv), (nv, nv))
    }

    /// `P dx − s`
    pub fn costate_direction(&self, dx: &DVector<f64>) -> DVector<f64> {
        &self.p * dx - &self.s
    }
}
