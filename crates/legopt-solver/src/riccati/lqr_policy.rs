//! State-feedback policy of one stage

use nalgebra::{DMatrix, DMatrixView, DVector};
use serde::{Deserialize, Serialize};

/// `du = K dx + k`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LqrPolicy {
    /// Gain K (dimu × 2·dimv)
    pub gain: DMatrix<f64>,
    /// Feedforward k (dimu)
    pub feedforward: DVector<f64>,
}

impl LqrPolicy {
    pub fn new(dimv: usize, dimu: usize) -> Self {
        Self {
            gain: DMatrix::zeros(dimu, 2 * dimv),
            feedforward: DVector::zeros(dimu),
        }
    }

    pub fn dimv(&self) -> usize {
        self.gain.ncols() / 2
    }

    pub fn dimu(&self) -> usize {
        self.feedforward.len()
    }

    /// Resize, zeroing the contents when the shape changes.
    pub fn resize(&mut self, dimv: usize, dimu: usize) {
        if self.dimv() != dimv || self.dimu() != dimu {
            *self = Self::new(dimv, dimu);
        }
    }

    /// `K[:, 0..dimv]`
    pub fn kq(&self) -> DMatrixView<'_, f64> {
        let nv = self.dimv();
        self.gain.view((0, 0), (self.dimu(), nv))
    }

    /// `K[:, dimv..2·dimv]`
    pub fn kv(&self) -> DMatrixView<'_, f64> {
        let nv = self.dimv();
        self.gain.view((0, nv), (self.dimu(), nv))
    }

    pub fn control_direction(&self, dx: &DVector<f64>) -> DVector<f64> {
        &self.gain * dx + &self.feedforward
    }
}
