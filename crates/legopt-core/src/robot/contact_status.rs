//! Contact status of a single contact phase
//!
//! Records which contact points are active, where they are placed and how
//! much friction they can transmit. A phase's status is built while the
//! contact sequence is assembled and is read-only during optimization.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Default friction coefficient for a fresh contact
pub const DEFAULT_FRICTION_COEFFICIENT: f64 = 0.7;

/// Active flags, placements and friction coefficients of the robot's point contacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactStatus {
    is_active: Vec<bool>,
    /// Contact placement positions in the world frame
    positions: Vec<Vector3<f64>>,
    /// Contact-frame rotations (z-axis = surface normal)
    rotations: Vec<Matrix3<f64>>,
    friction_coefficients: Vec<f64>,
    contact_mode_id: usize,
}

impl ContactStatus {
    /// All contacts inactive, placed at the origin on flat ground.
    pub fn new(max_num_contacts: usize) -> Self {
        Self {
            is_active: vec![false; max_num_contacts],
            positions: vec![Vector3::zeros(); max_num_contacts],
            rotations: vec![Matrix3::identity(); max_num_contacts],
            friction_coefficients: vec![DEFAULT_FRICTION_COEFFICIENT; max_num_contacts],
            contact_mode_id: 0,
        }
    }

    /// All contacts active.
    pub fn all_active(max_num_contacts: usize) -> Self {
        let mut status = Self::new(max_num_contacts);
        status.activate_all();
        status
    }

    pub fn max_num_contacts(&self) -> usize {
        self.is_active.len()
    }

    pub fn is_contact_active(&self, contact_index: usize) -> bool {
        self.is_active.get(contact_index).copied().unwrap_or(false)
    }

    pub fn is_active(&self) -> &[bool] {
        &self.is_active
    }

    pub fn has_active_contacts(&self) -> bool {
        self.is_active.iter().any(|&a| a)
    }

    pub fn num_active_contacts(&self) -> usize {
        self.is_active.iter().filter(|&&a| a).count()
    }

    /// Dimension of the stacked contact-force vector (3 per active point contact).
    pub fn dimf(&self) -> usize {
        3 * self.num_active_contacts()
    }

    /// Indices of the active contacts, in stacking order.
    pub fn active_contacts(&self) -> impl Iterator<Item = usize> + '_ {
        self.is_active
            .iter()
            .enumerate()
            .filter_map(|(i, &a)| a.then_some(i))
    }

    pub fn activate(&mut self, contact_index: usize) -> CoreResult<()> {
        self.check_index(contact_index)?;
        self.is_active[contact_index] = true;
        Ok(())
    }

    pub fn deactivate(&mut self, contact_index: usize) -> CoreResult<()> {
        self.check_index(contact_index)?;
        self.is_active[contact_index] = false;
        Ok(())
    }

    pub fn activate_all(&mut self) {
        self.is_active.iter_mut().for_each(|a| *a = true);
    }

    pub fn deactivate_all(&mut self) {
        self.is_active.iter_mut().for_each(|a| *a = false);
    }

    /// Set all active flags at once.
    pub fn set_activity(&mut self, is_active: &[bool]) -> CoreResult<()> {
        if is_active.len() != self.max_num_contacts() {
            return Err(CoreError::ContactCountMismatch {
                expected: self.max_num_contacts(),
                got: is_active.len(),
            });
        }
        self.is_active.copy_from_slice(is_active);
        Ok(())
    }

    pub fn set_contact_placement(
        &mut self,
        contact_index: usize,
        position: Vector3<f64>,
        rotation: Matrix3<f64>,
    ) -> CoreResult<()> {
        self.check_index(contact_index)?;
        self.positions[contact_index] = position;
        self.rotations[contact_index] = rotation;
        Ok(())
    }

    /// Set placements of every contact.
    pub fn set_contact_placements(
        &mut self,
        positions: &[Vector3<f64>],
        rotations: &[Matrix3<f64>],
    ) -> CoreResult<()> {
        let n = self.max_num_contacts();
        if positions.len() != n || rotations.len() != n {
            return Err(CoreError::ContactCountMismatch {
                expected: n,
                got: positions.len().min(rotations.len()),
            });
        }
        self.positions.copy_from_slice(positions);
        self.rotations.copy_from_slice(rotations);
        Ok(())
    }

    pub fn contact_position(&self, contact_index: usize) -> &Vector3<f64> {
        &self.positions[contact_index]
    }

    pub fn contact_rotation(&self, contact_index: usize) -> &Matrix3<f64> {
        &self.rotations[contact_index]
    }

    pub fn contact_positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    pub fn contact_rotations(&self) -> &[Matrix3<f64>] {
        &self.rotations
    }

    /// Friction coefficients must be strictly positive.
    pub fn set_friction_coefficient(&mut self, contact_index: usize, mu: f64) -> CoreResult<()> {
        self.check_index(contact_index)?;
        if !(mu > 0.0) {
            return Err(CoreError::InvalidParameter(format!(
                "friction coefficient must be positive, got {mu}"
            )));
        }
        self.friction_coefficients[contact_index] = mu;
        Ok(())
    }

    pub fn friction_coefficient(&self, contact_index: usize) -> f64 {
        self.friction_coefficients[contact_index]
    }

    pub fn friction_coefficients(&self) -> &[f64] {
        &self.friction_coefficients
    }

    pub fn contact_mode_id(&self) -> usize {
        self.contact_mode_id
    }

    pub fn set_contact_mode_id(&mut self, id: usize) {
        self.contact_mode_id = id;
    }

    /// Same active flags as `other`, ignoring placements.
    pub fn has_same_activity(&self, other: &ContactStatus) -> bool {
        self.is_active == other.is_active
    }

    fn check_index(&self, contact_index: usize) -> CoreResult<()> {
        if contact_index >= self.max_num_contacts() {
            return Err(CoreError::IndexOutOfRange {
                kind: "contact",
                index: contact_index,
                len: self.max_num_contacts(),
            });
        }
        Ok(())
    }
}
