//! Contact sequence
//!
//! Contact phases interleaved with the discrete events that separate them:
//!
//! ```text
//! phase 0 | event 0 | phase 1 | event 1 | ... | event K-1 | phase K
//! ```
//!
//! Event times are strictly increasing. Impulse and lift events are
//! addressed either by their flat event index or by their index among
//! events of the same kind; both lookups are O(1).
//!
//! Mutators validate their indices and return
//! [`CoreError::IndexOutOfRange`]. Getters take indices that must be in
//! range and panic otherwise; use the `num_*` queries to bound them.

use std::collections::VecDeque;
use std::fmt;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::discrete_event::{DiscreteEvent, DiscreteEventType};
use crate::error::{CoreError, CoreResult};
use crate::robot::{ContactStatus, ImpulseStatus};

/// Ordered contact phases and discrete events over a planning horizon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactSequence {
    max_num_contacts: usize,
    /// Reserved number of events of each kind
    reserved_num_events: usize,
    contact_statuses: VecDeque<ContactStatus>,
    events: VecDeque<DiscreteEvent>,
    event_times: VecDeque<f64>,
    sto_enabled: VecDeque<bool>,
    /// Flat event index of each impulse event
    impulse_event_index: VecDeque<usize>,
    /// Flat event index of each lift event
    lift_event_index: VecDeque<usize>,
}

impl ContactSequence {
    /// Empty sequence with a single phase of inactive contacts and storage
    /// reserved for `reserved_num_events` impulse and lift events.
    pub fn new(max_num_contacts: usize, reserved_num_events: usize) -> Self {
        let mut sequence = Self {
            max_num_contacts,
            reserved_num_events: 0,
            contact_statuses: VecDeque::new(),
            events: VecDeque::new(),
            event_times: VecDeque::new(),
            sto_enabled: VecDeque::new(),
            impulse_event_index: VecDeque::new(),
            lift_event_index: VecDeque::new(),
        };
        sequence.contact_statuses.push_back(ContactStatus::new(max_num_contacts));
        sequence.reserve(reserved_num_events);
        sequence
    }

    /// Reset to a single phase with no events.
    pub fn init(&mut self, contact_status: ContactStatus) -> CoreResult<()> {
        self.check_contact_count(&contact_status)?;
        self.clear_events();
        self.contact_statuses.clear();
        self.contact_statuses.push_back(contact_status);
        Ok(())
    }

    /// Reserve storage for `num_events` events of each kind.
    pub fn reserve(&mut self, num_events: usize) {
        if num_events <= self.reserved_num_events {
            return;
        }
        let total = 2 * num_events;
        self.contact_statuses
            .reserve((total + 1).saturating_sub(self.contact_statuses.len()));
        self.events.reserve(total.saturating_sub(self.events.len()));
        self.event_times.reserve(total.saturating_sub(self.event_times.len()));
        self.sto_enabled.reserve(total.saturating_sub(self.sto_enabled.len()));
        self.impulse_event_index
            .reserve(num_events.saturating_sub(self.impulse_event_index.len()));
        self.lift_event_index
            .reserve(num_events.saturating_sub(self.lift_event_index.len()));
        self.reserved_num_events = num_events;
    }

    pub fn reserved_num_events(&self) -> usize {
        self.reserved_num_events
    }

    /// Append `event` at `event_time`, followed by its post-event phase.
    ///
    /// Rejected when the event switches nothing, when its pre-event status
    /// differs from the last phase, or when `event_time` does not exceed the
    /// last event time.
    pub fn push_back(
        &mut self,
        event: DiscreteEvent,
        event_time: f64,
        sto: bool,
    ) -> CoreResult<()> {
        event.ensure_switching()?;
        if !event_time.is_finite() {
            return Err(CoreError::InvalidParameter(format!(
                "event time must be finite, got {event_time}"
            )));
        }
        if !self.last_contact_status().has_same_activity(event.pre_contact_status()) {
            return Err(CoreError::EventStatusMismatch);
        }
        if let Some(&last) = self.event_times.back() {
            if event_time <= last {
                return Err(CoreError::EventTimeNotIncreasing {
                    time: event_time,
                    lower: last,
                    upper: f64::INFINITY,
                });
            }
        }

        let flat_index = self.events.len();
        match event.event_type() {
            DiscreteEventType::Impulse => {
                if self.impulse_event_index.len() >= self.reserved_num_events {
                    self.grow_reservation();
                }
                self.impulse_event_index.push_back(flat_index);
            }
            DiscreteEventType::Lift => {
                if self.lift_event_index.len() >= self.reserved_num_events {
                    self.grow_reservation();
                }
                self.lift_event_index.push_back(flat_index);
            }
            DiscreteEventType::None => return Err(CoreError::NoDiscreteEvent),
        }

        self.contact_statuses.push_back(event.post_contact_status().clone());
        self.events.push_back(event);
        self.event_times.push_back(event_time);
        self.sto_enabled.push_back(sto);
        Ok(())
    }

    /// Append a new phase, deriving the event from the last phase.
    pub fn push_back_status(
        &mut self,
        contact_status: ContactStatus,
        event_time: f64,
        sto: bool,
    ) -> CoreResult<()> {
        self.check_contact_count(&contact_status)?;
        let event = DiscreteEvent::new(self.last_contact_status().clone(), contact_status)?;
        self.push_back(event, event_time, sto)
    }

    /// Remove the newest event and the phase after it.
    pub fn pop_back(&mut self) -> CoreResult<()> {
        let event = self.events.pop_back().ok_or(CoreError::EmptySequence)?;
        match event.event_type() {
            DiscreteEventType::Impulse => {
                self.impulse_event_index.pop_back();
            }
            DiscreteEventType::Lift => {
                self.lift_event_index.pop_back();
            }
            DiscreteEventType::None => {}
        }
        self.event_times.pop_back();
        self.sto_enabled.pop_back();
        self.contact_statuses.pop_back();
        Ok(())
    }

    /// Remove the oldest event and the phase before it.
    pub fn pop_front(&mut self) -> CoreResult<()> {
        let event = self.events.pop_front().ok_or(CoreError::EmptySequence)?;
        match event.event_type() {
            DiscreteEventType::Impulse => {
                self.impulse_event_index.pop_front();
            }
            DiscreteEventType::Lift => {
                self.lift_event_index.pop_front();
            }
            DiscreteEventType::None => {}
        }
        self.impulse_event_index.iter_mut().for_each(|i| *i -= 1);
        self.lift_event_index.iter_mut().for_each(|i| *i -= 1);
        self.event_times.pop_front();
        self.sto_enabled.pop_front();
        self.contact_statuses.pop_front();
        Ok(())
    }

    /// Move impulse event `impulse_index` to `time`, keeping event times
    /// strictly increasing.
    pub fn set_impulse_time(&mut self, impulse_index: usize, time: f64) -> CoreResult<()> {
        let flat = self.impulse_flat_index(impulse_index)?;
        self.set_event_time(flat, time)
    }

    /// Move lift event `lift_index` to `time`, keeping event times strictly
    /// increasing.
    pub fn set_lift_time(&mut self, lift_index: usize, time: f64) -> CoreResult<()> {
        let flat = self.lift_flat_index(lift_index)?;
        self.set_event_time(flat, time)
    }

    fn set_event_time(&mut self, event_index: usize, time: f64) -> CoreResult<()> {
        let lower = if event_index > 0 {
            self.event_times[event_index - 1]
        } else {
            f64::NEG_INFINITY
        };
        let upper = self
            .event_times
            .get(event_index + 1)
            .copied()
            .unwrap_or(f64::INFINITY);
        if !(lower < time && time < upper) {
            return Err(CoreError::EventTimeNotIncreasing { time, lower, upper });
        }
        self.event_times[event_index] = time;
        Ok(())
    }

    /// Set contact placements of `phase`; the event entering that phase is
    /// updated as well.
    pub fn set_contact_placements(
        &mut self,
        phase: usize,
        positions: &[Vector3<f64>],
        rotations: &[Matrix3<f64>],
    ) -> CoreResult<()> {
        let len = self.contact_statuses.len();
        let status = self
            .contact_statuses
            .get_mut(phase)
            .ok_or(CoreError::IndexOutOfRange { kind: "contact phase", index: phase, len })?;
        status.set_contact_placements(positions, rotations)?;
        if phase > 0 {
            self.events[phase - 1].set_post_contact_placements(positions, rotations)?;
        }
        Ok(())
    }

    pub fn max_num_contacts(&self) -> usize {
        self.max_num_contacts
    }

    pub fn num_contact_phases(&self) -> usize {
        self.contact_statuses.len()
    }

    pub fn num_discrete_events(&self) -> usize {
        self.events.len()
    }

    pub fn num_impulse_events(&self) -> usize {
        self.impulse_event_index.len()
    }

    pub fn num_lift_events(&self) -> usize {
        self.lift_event_index.len()
    }

    /// # Panics
    /// If `phase >= num_contact_phases()`.
    pub fn contact_status(&self, phase: usize) -> &ContactStatus {
        debug_assert!(
            phase < self.contact_statuses.len(),
            "contact phase {phase} out of range ({} phases)",
            self.contact_statuses.len()
        );
        &self.contact_statuses[phase]
    }

    pub fn last_contact_status(&self) -> &ContactStatus {
        // at least one phase always exists
        &self.contact_statuses[self.contact_statuses.len() - 1]
    }

    /// # Panics
    /// If `event_index >= num_discrete_events()`.
    pub fn event_type(&self, event_index: usize) -> DiscreteEventType {
        self.event(event_index).event_type()
    }

    /// # Panics
    /// If `event_index >= num_discrete_events()`.
    pub fn event(&self, event_index: usize) -> &DiscreteEvent {
        self.debug_check_event(event_index);
        &self.events[event_index]
    }

    /// # Panics
    /// If `event_index >= num_discrete_events()`.
    pub fn event_time(&self, event_index: usize) -> f64 {
        self.debug_check_event(event_index);
        self.event_times[event_index]
    }

    pub fn event_times(&self) -> Vec<f64> {
        self.event_times.iter().copied().collect()
    }

    /// # Panics
    /// If `impulse_index >= num_impulse_events()`.
    pub fn impulse_status(&self, impulse_index: usize) -> &ImpulseStatus {
        self.events[self.impulse_flat(impulse_index)].impulse_status()
    }

    /// # Panics
    /// If `impulse_index >= num_impulse_events()`.
    pub fn impulse_time(&self, impulse_index: usize) -> f64 {
        self.event_times[self.impulse_flat(impulse_index)]
    }

    /// # Panics
    /// If `lift_index >= num_lift_events()`.
    pub fn lift_time(&self, lift_index: usize) -> f64 {
        self.event_times[self.lift_flat(lift_index)]
    }

    /// # Panics
    /// If `impulse_index >= num_impulse_events()`.
    pub fn is_sto_enabled_impulse(&self, impulse_index: usize) -> bool {
        self.sto_enabled[self.impulse_flat(impulse_index)]
    }

    /// # Panics
    /// If `lift_index >= num_lift_events()`.
    pub fn is_sto_enabled_lift(&self, lift_index: usize) -> bool {
        self.sto_enabled[self.lift_flat(lift_index)]
    }

    /// Contact phase active at time `t` (events at exactly `t` have happened).
    pub fn phase_at(&self, t: f64) -> usize {
        self.event_times.iter().take_while(|&&te| te <= t).count()
    }

    /// Whether all event times are strictly increasing.
    pub fn is_event_time_consistent(&self) -> bool {
        self.event_times
            .iter()
            .zip(self.event_times.iter().skip(1))
            .all(|(a, b)| a < b)
    }

    fn debug_check_event(&self, event_index: usize) {
        debug_assert!(
            event_index < self.events.len(),
            "discrete event {event_index} out of range ({} events)",
            self.events.len()
        );
    }

    fn impulse_flat(&self, impulse_index: usize) -> usize {
        debug_assert!(
            impulse_index < self.impulse_event_index.len(),
            "impulse event {impulse_index} out of range ({} impulses)",
            self.impulse_event_index.len()
        );
        self.impulse_event_index[impulse_index]
    }

    fn lift_flat(&self, lift_index: usize) -> usize {
        debug_assert!(
            lift_index < self.lift_event_index.len(),
            "lift event {lift_index} out of range ({} lifts)",
            self.lift_event_index.len()
        );
        self.lift_event_index[lift_index]
    }

    fn impulse_flat_index(&self, impulse_index: usize) -> CoreResult<usize> {
        self.impulse_event_index
            .get(impulse_index)
            .copied()
            .ok_or(CoreError::IndexOutOfRange {
                kind: "impulse event",
                index: impulse_index,
                len: self.impulse_event_index.len(),
            })
    }

    fn lift_flat_index(&self, lift_index: usize) -> CoreResult<usize> {
        self.lift_event_index
            .get(lift_index)
            .copied()
            .ok_or(CoreError::IndexOutOfRange {
                kind: "lift event",
                index: lift_index,
                len: self.lift_event_index.len(),
            })
    }

    fn grow_reservation(&mut self) {
        let grown = (2 * self.reserved_num_events).max(1);
        debug!(
            reserved = self.reserved_num_events,
            grown, "contact sequence capacity exhausted, growing"
        );
        self.reserve(grown);
    }

    fn clear_events(&mut self) {
        self.events.clear();
        self.event_times.clear();
        self.sto_enabled.clear();
        self.impulse_event_index.clear();
        self.lift_event_index.clear();
    }

    fn check_contact_count(&self, status: &ContactStatus) -> CoreResult<()> {
        if status.max_num_contacts() != self.max_num_contacts {
            return Err(CoreError::ContactCountMismatch {
                expected: self.max_num_contacts,
                got: status.max_num_contacts(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for ContactSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "contact sequence:")?;
        for (phase, status) in self.contact_statuses.iter().enumerate() {
            writeln!(f, "  phase {phase}: active = {:?}", status.is_active())?;
            if let Some(event) = self.events.get(phase) {
                writeln!(
                    f,
                    "  event {phase}: {} at t = {} (sto: {})",
                    event.event_type(),
                    self.event_times[phase],
                    self.sto_enabled[phase]
                )?;
            }
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

    fn trot() -> ContactSequence {
        let mut seq = ContactSequence::new(2, 4);
        seq.init(status(&[true, true])).unwrap();
        seq.push_back_status(status(&[true, false]), 0.2, false).unwrap();
        seq.push_back_status(status(&[true, true]), 0.4, true).unwrap();
        seq.push_back_status(status(&[false, true]), 0.6, false).unwrap();
        seq.push_back_status(status(&[true, true]), 0.8, false).unwrap();
        seq
    }

    #[test]
    fn test_index_arrays() {
        let seq = trot();
        assert_eq!(seq.num_contact_phases(), 5);
        assert_eq!(seq.num_impulse_events(), 2);
        assert_eq!(seq.num_lift_events(), 2);
        assert_eq!(seq.impulse_time(0), 0.4);
        assert_eq!(seq.impulse_time(1), 0.8);
        assert_eq!(seq.lift_time(1), 0.6);
        assert!(seq.is_sto_enabled_impulse(0));
        assert!(!seq.is_sto_enabled_lift(0));
        assert!(seq.impulse_status(1).is_impulse_active(0));
    }

    #[test]
    fn test_pop_front_shifts_indices() {
        let mut seq = trot();
        seq.pop_front().unwrap();
        assert_eq!(seq.num_contact_phases(), 4);
        assert_eq!(seq.num_lift_events(), 1);
        assert_eq!(seq.event_type(0), DiscreteEventType::Impulse);
        assert_eq!(seq.lift_time(0), 0.6);
        assert_eq!(seq.impulse_time(0), 0.4);
        assert!(seq.contact_status(0).is_contact_active(0));
        assert!(!seq.contact_status(0).is_contact_active(1));
    }

    #[test]
    fn test_pop_back() {
        let mut seq = trot();
        seq.pop_back().unwrap();
        assert_eq!(seq.num_impulse_events(), 1);
        assert_eq!(seq.event_times(), vec![0.2, 0.4, 0.6]);
        while seq.num_discrete_events() > 0 {
            seq.pop_back().unwrap();
        }
        assert_eq!(seq.pop_back(), Err(CoreError::EmptySequence));
        assert_eq!(seq.pop_front(), Err(CoreError::EmptySequence));
        assert_eq!(seq.num_contact_phases(), 1);
    }

    #[test]
    fn test_set_event_time_revalidates_order() {
        let mut seq = trot();
        seq.set_impulse_time(0, 0.45).unwrap();
        assert_eq!(seq.impulse_time(0), 0.45);
        assert!(matches!(
            seq.set_impulse_time(0, 0.65),
            Err(CoreError::EventTimeNotIncreasing { .. })
        ));
        assert!(seq.set_lift_time(0, 0.45).is_err());
        assert!(seq.set_lift_time(5, 0.1).is_err());
        assert!(seq.is_event_time_consistent());
    }

    #[test]
    fn test_rejects_mismatched_pre_status() {
        let mut seq = ContactSequence::new(2, 1);
        seq.init(status(&[true, true])).unwrap();
        let event = DiscreteEvent::new(status(&[false, true]), status(&[true, true])).unwrap();
        assert_eq!(seq.push_back(event, 0.3, false), Err(CoreError::EventStatusMismatch));
        assert!(seq.push_back_status(status(&[true, true]), 0.3, false).is_err());
    }

    #[test]
    fn test_grows_beyond_reservation() {
        let mut seq = ContactSequence::new(1, 0);
        seq.init(status(&[true])).unwrap();
        for k in 0..5 {
            let t = 0.1 * (2 * k + 1) as f64;
            seq.push_back_status(status(&[false]), t, false).unwrap();
            seq.push_back_status(status(&[true]), t + 0.1, false).unwrap();
        }
        assert_eq!(seq.num_lift_events(), 5);
        assert!(seq.reserved_num_events() >= 5);
    }

    #[test]
    fn test_phase_at() {
        let seq = trot();
        assert_eq!(seq.phase_at(0.0), 0);
        assert_eq!(seq.phase_at(0.2), 1);
        assert_eq!(seq.phase_at(0.5), 2);
        assert_eq!(seq.phase_at(1.0), 4);
    }

    #[test]
    fn test_out_of_range_setter_is_an_error() {
        let mut seq = trot();
        assert_eq!(seq.num_impulse_events(), 2);
        assert!(matches!(
            seq.set_impulse_time(2, 1.0),
            Err(CoreError::IndexOutOfRange { kind: "impulse event", index: 2, len: 2 })
        ));
        assert!(seq.set_contact_placements(5, &[], &[]).is_err());
    }

    #[test]
    #[should_panic]
    fn test_out_of_range_impulse_getter_panics() {
        trot().impulse_time(2);
    }

    #[test]
    #[should_panic]
    fn test_out_of_range_phase_getter_panics() {
        trot().contact_status(5);
    }
}
