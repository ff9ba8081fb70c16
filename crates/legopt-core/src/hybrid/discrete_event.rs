//! Discrete contact-switching events

use std::fmt;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::robot::{ContactStatus, ImpulseStatus};

/// Kind of a contact transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscreteEventType {
    /// No contact changes
    None,
    /// At least one contact is made (a touchdown produces an impulse)
    Impulse,
    /// Contacts are only broken
    Lift,
}

impl fmt::Display for DiscreteEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscreteEventType::None => write!(f, "none"),
            DiscreteEventType::Impulse => write!(f, "impulse"),
            DiscreteEventType::Lift => write!(f, "lift"),
        }
    }
}

/// Transition between two consecutive contact phases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteEvent {
    pre: ContactStatus,
    post: ContactStatus,
    impulse_status: ImpulseStatus,
    exists_impulse: bool,
    exists_lift: bool,
    event_type: DiscreteEventType,
}

impl DiscreteEvent {
    /// Classify the transition `pre → post`.
    ///
    /// A transition that makes any contact is an impulse, even if it also
    /// breaks other contacts.
    pub fn new(pre: ContactStatus, post: ContactStatus) -> CoreResult<Self> {
        let impulse_status = ImpulseStatus::from_transition(&pre, &post)?;
        let exists_impulse = impulse_status.has_active_impulse();
        let exists_lift = pre
            .is_active()
            .iter()
            .zip(post.is_active())
            .any(|(&before, &after)| before && !after);

        let event_type = if exists_impulse {
            DiscreteEventType::Impulse
        } else if exists_lift {
            DiscreteEventType::Lift
        } else {
            DiscreteEventType::None
        };

        Ok(Self {
            pre,
            post,
            impulse_status,
            exists_impulse,
            exists_lift,
            event_type,
        })
    }

    pub fn event_type(&self) -> DiscreteEventType {
        self.event_type
    }

    pub fn exists_impulse(&self) -> bool {
        self.exists_impulse
    }

    pub fn exists_lift(&self) -> bool {
        self.exists_lift
    }

    pub fn pre_contact_status(&self) -> &ContactStatus {
        &self.pre
    }

    pub fn post_contact_status(&self) -> &ContactStatus {
        &self.post
    }

    pub fn impulse_status(&self) -> &ImpulseStatus {
        &self.impulse_status
    }

    /// Move the post-event contacts (and the impulse contacts with them).
    pub fn set_post_contact_placements(
        &mut self,
        positions: &[Vector3<f64>],
        rotations: &[Matrix3<f64>],
    ) -> CoreResult<()> {
        self.post.set_contact_placements(positions, rotations)?;
        self.impulse_status.set_contact_placements(positions, rotations)
    }

    /// Fails with [`CoreError::NoDiscreteEvent`] when nothing switches.
    pub fn ensure_switching(&self) -> CoreResult<()> {
        if self.event_type == DiscreteEventType::None {
            return Err(CoreError::NoDiscreteEvent);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(active: &[bool]) -> ContactStatus {
        let mut s = ContactStatus::new(active.len());
        s.set_activity(active).unwrap();
        s
    }

    #[test]
    fn test_classification() {
        let lift = DiscreteEvent::new(status(&[true, true]), status(&[true, false])).unwrap();
        assert_eq!(lift.event_type(), DiscreteEventType::Lift);
        assert!(lift.exists_lift() && !lift.exists_impulse());

        let touchdown = DiscreteEvent::new(status(&[true, false]), status(&[true, true])).unwrap();
        assert_eq!(touchdown.event_type(), DiscreteEventType::Impulse);
        assert_eq!(touchdown.impulse_status().dimi(), 3);

        let swap = DiscreteEvent::new(status(&[true, false]), status(&[false, true])).unwrap();
        assert_eq!(swap.event_type(), DiscreteEventType::Impulse);
        assert!(swap.exists_lift());

        let none = DiscreteEvent::new(status(&[true, false]), status(&[true, false])).unwrap();
        assert_eq!(none.event_type(), DiscreteEventType::None);
        assert_eq!(none.ensure_switching(), Err(CoreError::NoDiscreteEvent));
    }

    #[test]
    fn test_mismatched_contact_counts() {
        assert!(DiscreteEvent::new(status(&[true]), status(&[true, false])).is_err());
    }
}
