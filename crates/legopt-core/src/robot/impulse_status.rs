//! Impulse status of a discrete impulse event
//!
//! The contacts that become active exactly at the impulse instant. Their
//! impulse forces are the auxiliary variables of the impulse stage.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use super::contact_status::ContactStatus;
use crate::error::{CoreError, CoreResult};

/// Contacts that are inactive before and active after an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpulseStatus {
    status: ContactStatus,
}

impl ImpulseStatus {
    /// No active impulse.
    pub fn new(max_num_contacts: usize) -> Self {
        Self {
            status: ContactStatus::new(max_num_contacts),
        }
    }

    /// Impulse status of the transition `pre → post`; placements and friction
    /// coefficients are taken from `post`.
    pub fn from_transition(pre: &ContactStatus, post: &ContactStatus) -> CoreResult<Self> {
        if pre.max_num_contacts() != post.max_num_contacts() {
            return Err(CoreError::ContactCountMismatch {
                expected: pre.max_num_contacts(),
                got: post.max_num_contacts(),
            });
        }
        let mut status = post.clone();
        let impulse: Vec<bool> = pre
            .is_active()
            .iter()
            .zip(post.is_active())
            .map(|(&before, &after)| !before && after)
            .collect();
        status.set_activity(&impulse)?;
        Ok(Self { status })
    }

    pub fn max_num_contacts(&self) -> usize {
        self.status.max_num_contacts()
    }

    pub fn is_impulse_active(&self, contact_index: usize) -> bool {
        self.status.is_contact_active(contact_index)
    }

    pub fn has_active_impulse(&self) -> bool {
        self.status.has_active_contacts()
    }

    pub fn num_active_impulses(&self) -> usize {
        self.status.num_active_contacts()
    }

    /// Dimension of the stacked impulse-force vector.
    pub fn dimi(&self) -> usize {
        self.status.dimf()
    }

    pub fn contact_position(&self, contact_index: usize) -> &Vector3<f64> {
        self.status.contact_position(contact_index)
    }

    pub fn contact_rotation(&self, contact_index: usize) -> &Matrix3<f64> {
        self.status.contact_rotation(contact_index)
    }

    pub fn set_contact_placements(
        &mut self,
        positions: &[Vector3<f64>],
        rotations: &[Matrix3<f64>],
    ) -> CoreResult<()> {
        self.status.set_contact_placements(positions, rotations)
    }

    /// View as a contact status whose active contacts are the impulse contacts.
    pub fn as_contact_status(&self) -> &ContactStatus {
        &self.status
    }
}
