//! Split KKT matrix and residual of one stage
//!
//! Stage variables are stacked as
//!
//! ```text
//! z = [ dq  dv | du | dw ]      dw = [da  df]   (regular stage)
//!       state    ctrl  aux      dw = [ddv df]   (impulse stage, no control)
//! ```
//!
//! After condensation the leading `dimx + dimu` block of the Hessian and
//! gradient, together with the state-equation Jacobians, describe the
//! reduced stage model seen by the Riccati recursion.

use std::ops::Range;

use nalgebra::{DMatrix, DMatrixView, DVector, DVectorView};

/// Index layout of one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageLayout {
    pub dimv: usize,
    pub dimu: usize,
    pub dimf: usize,
    /// Whether the stage has auxiliary variables (false for the terminal stage)
    pub has_aux: bool,
}

impl StageLayout {
    pub fn regular(dimv: usize, dimu: usize, dimf: usize) -> Self {
        Self {
            dimv,
            dimu,
            dimf,
            has_aux: true,
        }
    }

    pub fn impulse(dimv: usize, dimf: usize) -> Self {
        Self {
            dimv,
            dimu: 0,
            dimf,
            has_aux: true,
        }
    }

    pub fn terminal(dimv: usize) -> Self {
        Self {
            dimv,
            dimu: 0,
            dimf: 0,
            has_aux: false,
        }
    }

    pub fn dimx(&self) -> usize {
        2 * self.dimv
    }

    /// Dimension of the reduced variables (x, u).
    pub fn dimz(&self) -> usize {
        self.dimx() + self.dimu
    }

    /// Dimension of the auxiliary variables (a or dv, f).
    pub fn dimw(&self) -> usize {
        if self.has_aux {
            self.dimv + self.dimf
        } else {
            0
        }
    }

    pub fn dim(&self) -> usize {
        self.dimz() + self.dimw()
    }

    pub fn q(&self) -> Range<usize> {
        0..self.dimv
    }

    pub fn v(&self) -> Range<usize> {
        self.dimv..self.dimx()
    }

    pub fn x(&self) -> Range<usize> {
        0..self.dimx()
    }

    pub fn u(&self) -> Range<usize> {
        self.dimx()..self.dimz()
    }

    pub fn w(&self) -> Range<usize> {
        self.dimz()..self.dim()
    }

    /// Acceleration (regular) or velocity jump (impulse).
    pub fn a(&self) -> Range<usize> {
        self.dimz()..self.dimz() + if self.has_aux { self.dimv } else { 0 }
    }

    pub fn f(&self) -> Range<usize> {
        self.a().end..self.dim()
    }
}

/// Quadratic model of one stage
#[derive(Debug, Clone)]
pub struct SplitKktMatrix {
    layout: StageLayout,
    /// Hessian of the Lagrangian over all stage variables
    pub hessian: DMatrix<f64>,
    /// State-equation Jacobian with respect to x (Âx after condensation)
    pub fxx: DMatrix<f64>,
    /// State-equation Jacobian with respect to u (Âu after condensation)
    pub fxu: DMatrix<f64>,
    /// State-equation Jacobian with respect to w
    pub fxw: DMatrix<f64>,
    /// Dynamics Jacobian with respect to (x, u)
    pub cz: DMatrix<f64>,
    /// Dynamics Jacobian with respect to w
    pub cw: DMatrix<f64>,
}

impl SplitKktMatrix {
    pub fn new(layout: StageLayout) -> Self {
        let (dim, dimx, dimu, dimz, dimw) =
            (layout.dim(), layout.dimx(), layout.dimu, layout.dimz(), layout.dimw());
        Self {
            layout,
            hessian: DMatrix::zeros(dim, dim),
            fxx: DMatrix::zeros(dimx, dimx),
            fxu: DMatrix::zeros(dimx, dimu),
            fxw: DMatrix::zeros(dimx, dimw),
            cz: DMatrix::zeros(dimw, dimz),
            cw: DMatrix::zeros(dimw, dimw),
        }
    }

    pub fn layout(&self) -> &StageLayout {
        &self.layout
    }

    /// Resize for a new layout; contents are zeroed.
    pub fn set_layout(&mut self, layout: StageLayout) {
        if layout != self.layout {
            *self = Self::new(layout);
        } else {
            self.set_zero();
        }
    }

    pub fn set_zero(&mut self) {
        self.hessian.fill(0.0);
        self.fxx.fill(0.0);
        self.fxu.fill(0.0);
        self.fxw.fill(0.0);
        self.cz.fill(0.0);
        self.cw.fill(0.0);
    }

    fn block(&self, rows: Range<usize>, cols: Range<usize>) -> DMatrixView<'_, f64> {
        self.hessian
            .view((rows.start, cols.start), (rows.len(), cols.len()))
    }

    pub fn qxx(&self) -> DMatrixView<'_, f64> {
        self.block(self.layout.x(), self.layout.x())
    }

    pub fn qxu(&self) -> DMatrixView<'_, f64> {
        self.block(self.layout.x(), self.layout.u())
    }

    pub fn quu(&self) -> DMatrixView<'_, f64> {
        self.block(self.layout.u(), self.layout.u())
    }

    pub fn qqq(&self) -> DMatrixView<'_, f64> {
        self.block(self.layout.q(), self.layout.q())
    }

    pub fn qqv(&self) -> DMatrixView<'_, f64> {
        self.block(self.layout.q(), self.layout.v())
    }

    pub fn qvq(&self) -> DMatrixView<'_, f64> {
        self.block(self.layout.v(), self.layout.q())
    }

    pub fn qvv(&self) -> DMatrixView<'_, f64> {
        self.block(self.layout.v(), self.layout.v())
    }

    /// Reduced Hessian over (x, u).
    pub fn hzz(&self) -> DMatrix<f64> {
        let dimz = self.layout.dimz();
        self.hessian.view((0, 0), (dimz, dimz)).into_owned()
    }

    pub fn add_to_block(&mut self, rows: Range<usize>, cols: Range<usize>, m: &DMatrix<f64>) {
        let mut block = self
            .hessian
            .view_mut((rows.start, cols.start), (rows.len(), cols.len()));
        block += m;
    }
}

/// Residuals of one stage
#[derive(Debug, Clone)]
pub struct SplitKktResidual {
    layout: StageLayout,
    /// Gradient of the Lagrangian over all stage variables
    pub lz: DVector<f64>,
    /// State-equation defect (b̂ after condensation)
    pub fx: DVector<f64>,
    /// Dynamics residual
    pub c: DVector<f64>,
}

impl SplitKktResidual {
    pub fn new(layout: StageLayout) -> Self {
        Self {
            layout,
            lz: DVector::zeros(layout.dim()),
            fx: DVector::zeros(layout.dimx()),
            c: DVector::zeros(layout.dimw()),
        }
    }

    pub fn layout(&self) -> &StageLayout {
        &self.layout
    }

    pub fn set_layout(&mut self, layout: StageLayout) {
        if layout != self.layout {
            *self = Self::new(layout);
        } else {
            self.set_zero();
        }
    }

    pub fn set_zero(&mut self) {
        self.lz.fill(0.0);
        self.fx.fill(0.0);
        self.c.fill(0.0);
    }

    pub fn lx(&self) -> DVectorView<'_, f64> {
        self.lz.rows(0, self.layout.dimx())
    }

    pub fn lu(&self) -> DVectorView<'_, f64> {
        self.lz.rows(self.layout.dimx(), self.layout.dimu)
    }

    pub fn lw(&self) -> DVectorView<'_, f64> {
        self.lz.rows(self.layout.dimz(), self.layout.dimw())
    }

    pub fn add_to_segment(&mut self, range: Range<usize>, v: &DVector<f64>) {
        let mut segment = self.lz.rows_mut(range.start, range.len());
        segment += v;
    }

    /// l1 norm of the primal residuals.
    pub fn primal_feasibility(&self) -> f64 {
        self.fx.iter().chain(self.c.iter()).map(|x| x.abs()).sum()
    }

    /// l1 norm of the Lagrangian gradient.
    pub fn dual_feasibility(&self) -> f64 {
        self.lz.iter().map(|x| x.abs()).sum()
    }

    /// Squared norm of all residuals.
    pub fn kkt_error(&self) -> f64 {
        self.lz.norm_squared() + self.fx.norm_squared() + self.c.norm_squared()
    }
}
