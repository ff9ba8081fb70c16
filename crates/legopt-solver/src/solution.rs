//! Split solution and split direction
//!
//! Primal and dual variables of one grid point and their Newton step.

use nalgebra::{DVector, DVectorView, Vector3};

use legopt_core::math::linf_norm;
use legopt_core::robot::ContactStatus;
use legopt_core::RobotModel;

use crate::error::SolverError;
use crate::kkt::StageLayout;

/// Primal and dual variables of one stage
#[derive(Debug, Clone, PartialEq)]
pub struct SplitSolution {
    /// Configuration
    pub q: DVector<f64>,
    /// Generalized velocity
    pub v: DVector<f64>,
    /// Generalized acceleration (regular stages)
    pub a: DVector<f64>,
    /// Velocity jump (impulse stages)
    pub dv: DVector<f64>,
    /// Control input
    pub u: DVector<f64>,
    /// Stacked forces of the active contacts (impulses at impulse stages)
    pub f: DVector<f64>,
    /// Costate of the configuration
    pub lmd: DVector<f64>,
    /// Costate of the velocity
    pub gmm: DVector<f64>,
    /// Multiplier of the inverse dynamics
    pub beta: DVector<f64>,
    /// Multiplier of the contact constraints
    pub mu: DVector<f64>,
    contact_active: Vec<bool>,
}

impl SplitSolution {
    /// Zero solution at the robot's neutral configuration, no active contacts.
    pub fn new(robot: &dyn RobotModel) -> Self {
        let (nv, nu) = (robot.dimv(), robot.dimu());
        Self {
            q: robot.neutral_configuration(),
            v: DVector::zeros(nv),
            a: DVector::zeros(nv),
            dv: DVector::zeros(nv),
            u: DVector::zeros(nu),
            f: DVector::zeros(0),
            lmd: DVector::zeros(nv),
            gmm: DVector::zeros(nv),
            beta: DVector::zeros(nv),
            mu: DVector::zeros(0),
            contact_active: vec![false; robot.max_num_contacts()],
        }
    }

    /// Resize the contact stacks to `status`, keeping the values of contacts
    /// that stay active.
    pub fn set_contact_status(&mut self, status: &ContactStatus) {
        if self.contact_active.as_slice() == status.is_active() {
            return;
        }
        let mut f = DVector::zeros(status.dimf());
        let mut mu = DVector::zeros(status.dimf());
        let mut old = 0;
        let mut new = 0;
        for (i, &was_active) in self.contact_active.iter().enumerate() {
            let is_active = status.is_contact_active(i);
            if was_active && is_active {
                f.fixed_rows_mut::<3>(new).copy_from(&self.f.fixed_rows::<3>(old));
                mu.fixed_rows_mut::<3>(new).copy_from(&self.mu.fixed_rows::<3>(old));
            }
            if was_active {
                old += 3;
            }
            if is_active {
                new += 3;
            }
        }
        self.f = f;
        self.mu = mu;
        self.contact_active = status.is_active().to_vec();
    }

    pub fn contact_active(&self) -> &[bool] {
        &self.contact_active
    }

    pub fn dimf(&self) -> usize {
        self.f.len()
    }

    /// Force of the `k`-th active contact.
    pub fn contact_force(&self, k: usize) -> Vector3<f64> {
        self.f.fixed_rows::<3>(3 * k).into_owned()
    }

    /// Fails if the contact stack does not match `status`.
    pub fn check_contact_dimension(
        &self,
        stage: usize,
        status: &ContactStatus,
    ) -> Result<(), SolverError> {
        if self.f.len() != status.dimf() || self.mu.len() != status.dimf() {
            return Err(SolverError::ContactDimensionMismatch {
                stage,
                expected: status.dimf(),
                got: self.f.len(),
            });
        }
        Ok(())
    }

    /// `self ← self ⊕ step · d`; the configuration is integrated on the
    /// robot's manifold.
    pub fn integrate(
        &mut self,
        robot: &dyn RobotModel,
        step: f64,
        d: &SplitDirection,
        is_impulse: bool,
    ) {
        self.q = robot.integrate_configuration(&self.q, &d.dq().into_owned(), step);
        self.v.axpy(step, &d.dv(), 1.0);
        self.lmd.axpy(step, &d.dlmd, 1.0);
        self.gmm.axpy(step, &d.dgmm, 1.0);
        if !d.layout.has_aux {
            return;
        }
        if is_impulse {
            self.dv.axpy(step, &d.da(), 1.0);
        } else {
            self.a.axpy(step, &d.da(), 1.0);
            self.u.axpy(step, &d.du, 1.0);
        }
        self.f.axpy(step, &d.df(), 1.0);
        let nv = self.beta.len();
        self.beta.axpy(step, &d.dbeta.rows(0, nv), 1.0);
        let nf = self.mu.len();
        self.mu.axpy(step, &d.dbeta.rows(nv, nf), 1.0);
    }

    pub fn copy_primal(&mut self, other: &SplitSolution) {
        self.q.copy_from(&other.q);
        self.v.copy_from(&other.v);
        self.a.copy_from(&other.a);
        self.dv.copy_from(&other.dv);
        self.u.copy_from(&other.u);
        self.f = other.f.clone();
        self.contact_active = other.contact_active.clone();
    }

    pub fn copy_dual(&mut self, other: &SplitSolution) {
        self.lmd.copy_from(&other.lmd);
        self.gmm.copy_from(&other.gmm);
        self.beta.copy_from(&other.beta);
        self.mu = other.mu.clone();
    }

    /// Largest absolute Lagrange multiplier.
    pub fn lagrange_multiplier_linf_norm(&self) -> f64 {
        [&self.lmd, &self.gmm, &self.beta, &self.mu]
            .into_iter()
            .map(linf_norm)
            .fold(0.0_f64, f64::max)
    }

    pub fn is_approx(&self, other: &SplitSolution, epsilon: f64) -> bool {
        let close = |a: &DVector<f64>, b: &DVector<f64>| {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= epsilon)
        };
        self.contact_active == other.contact_active
            && close(&self.q, &other.q)
            && close(&self.v, &other.v)
            && close(&self.a, &other.a)
            && close(&self.dv, &other.dv)
            && close(&self.u, &other.u)
            && close(&self.f, &other.f)
            && close(&self.lmd, &other.lmd)
            && close(&self.gmm, &other.gmm)
            && close(&self.beta, &other.beta)
            && close(&self.mu, &other.mu)
    }
}

/// Newton direction of one stage
#[derive(Debug, Clone, PartialEq)]
pub struct SplitDirection {
    layout: StageLayout,
    /// State direction [dq; dv]
    pub dx: DVector<f64>,
    pub du: DVector<f64>,
    /// Auxiliary direction [da (or ddv); df]
    pub dw: DVector<f64>,
    pub dlmd: DVector<f64>,
    pub dgmm: DVector<f64>,
    /// Dynamics multiplier direction [dbeta; dmu]
    pub dbeta: DVector<f64>,
}

impl SplitDirection {
    pub fn new(layout: StageLayout) -> Self {
        Self {
            layout,
            dx: DVector::zeros(layout.dimx()),
            du: DVector::zeros(layout.dimu),
            dw: DVector::zeros(layout.dimw()),
            dlmd: DVector::zeros(layout.dimv),
            dgmm: DVector::zeros(layout.dimv),
            dbeta: DVector::zeros(layout.dimw()),
        }
    }

    pub fn layout(&self) -> &StageLayout {
        &self.layout
    }

    pub fn set_layout(&mut self, layout: StageLayout) {
        if layout != self.layout {
            *self = Self::new(layout);
        }
    }

    pub fn set_zero(&mut self) {
        self.dx.fill(0.0);
        self.du.fill(0.0);
        self.dw.fill(0.0);
        self.dlmd.fill(0.0);
        self.dgmm.fill(0.0);
        self.dbeta.fill(0.0);
    }

    pub fn dq(&self) -> DVectorView<'_, f64> {
        self.dx.rows(0, self.layout.dimv)
    }

    pub fn dv(&self) -> DVectorView<'_, f64> {
        self.dx.rows(self.layout.dimv, self.layout.dimv)
    }

    /// Acceleration direction (velocity-jump direction at impulse stages).
    pub fn da(&self) -> DVectorView<'_, f64> {
        let len = if self.layout.has_aux { self.layout.dimv } else { 0 };
        self.dw.rows(0, len)
    }

    pub fn df(&self) -> DVectorView<'_, f64> {
        if self.layout.has_aux {
            self.dw.rows(self.layout.dimv, self.layout.dimf)
        } else {
            self.dw.rows(0, 0)
        }
    }

    /// `[dx; du; dw]` over the full stage layout.
    pub fn stacked(&self) -> DVector<f64> {
        let mut z = DVector::zeros(self.layout.dim());
        z.rows_mut(0, self.layout.dimx()).copy_from(&self.dx);
        z.rows_mut(self.layout.dimx(), self.layout.dimu).copy_from(&self.du);
        z.rows_mut(self.layout.dimz(), self.layout.dimw()).copy_from(&self.dw);
        z
    }

    /// Costate direction [dlmd; dgmm].
    pub fn dlambda(&self) -> DVector<f64> {
        let nv = self.layout.dimv;
        let mut d = DVector::zeros(2 * nv);
        d.rows_mut(0, nv).copy_from(&self.dlmd);
        d.rows_mut(nv, nv).copy_from(&self.dgmm);
        d
    }

    pub fn set_dlambda(&mut self, dlambda: &DVector<f64>) {
        let nv = self.layout.dimv;
        self.dlmd.copy_from(&dlambda.rows(0, nv));
        self.dgmm.copy_from(&dlambda.rows(nv, nv));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use legopt_core::robot::{Manipulator, PointMass};

    #[test]
    fn test_contact_stack_follows_status() {
        let robot = PointMass::new(1.0).unwrap();
        let mut s = SplitSolution::new(&robot);
        assert_eq!(s.dimf(), 0);

        let status = ContactStatus::all_active(1);
        s.set_contact_status(&status);
        assert_eq!(s.dimf(), 3);
        s.f[2] = 9.81;
        s.set_contact_status(&status);
        assert_relative_eq!(s.f[2], 9.81);
        assert!(s.check_contact_dimension(0, &status).is_ok());

        let flight = ContactStatus::new(1);
        assert!(matches!(
            s.check_contact_dimension(3, &flight),
            Err(SolverError::ContactDimensionMismatch { stage: 3, expected: 0, got: 3 })
        ));
        s.set_contact_status(&flight);
        assert_eq!(s.dimf(), 0);
    }

    #[test]
    fn test_integrate_regular_stage() {
        let robot = Manipulator::uniform(2).unwrap();
        let mut s = SplitSolution::new(&robot);
        let layout = StageLayout::regular(2, 2, 0);
        let mut d = SplitDirection::new(layout);
        d.dx = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        d.du = DVector::from_vec(vec![-1.0, -2.0]);
        d.dw = DVector::from_vec(vec![0.5, 0.25]);
        d.dlmd = DVector::from_vec(vec![1.0, 1.0]);
        d.dbeta = DVector::from_vec(vec![2.0, -2.0]);

        s.integrate(&robot, 0.5, &d, false);
        assert_relative_eq!(s.q, DVector::from_vec(vec![0.5, 1.0]));
        assert_relative_eq!(s.v, DVector::from_vec(vec![1.5, 2.0]));
        assert_relative_eq!(s.u, DVector::from_vec(vec![-0.5, -1.0]));
        assert_relative_eq!(s.a, DVector::from_vec(vec![0.25, 0.125]));
        assert_relative_eq!(s.beta, DVector::from_vec(vec![1.0, -1.0]));
        assert_relative_eq!(s.lagrange_multiplier_linf_norm(), 1.0);
    }

    #[test]
    fn test_copy_and_compare() {
        let robot = PointMass::new(1.0).unwrap();
        let mut a = SplitSolution::new(&robot);
        a.set_contact_status(&ContactStatus::all_active(1));
        a.f[2] = 3.0;
        a.gmm[1] = -4.0;

        let mut b = SplitSolution::new(&robot);
        assert!(!b.is_approx(&a, 1e-12));
        b.copy_primal(&a);
        b.copy_dual(&a);
        assert!(b.is_approx(&a, 1e-12));
        assert_relative_eq!(b.lagrange_multiplier_linf_norm(), 4.0);
    }

    #[test]
    fn test_stacked_direction() {
        let layout = StageLayout::regular(1, 1, 3);
        let mut d = SplitDirection::new(layout);
        d.dx = DVector::from_vec(vec![1.0, 2.0]);
        d.du = DVector::from_vec(vec![3.0]);
        d.dw = DVector::from_vec(vec![4.0, 5.0, 6.0, 7.0]);
        assert_eq!(d.stacked().as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(d.df().iter().copied().collect::<Vec<_>>(), vec![5.0, 6.0, 7.0]);
        assert_eq!(d.da()[0], 4.0);
    }
}
