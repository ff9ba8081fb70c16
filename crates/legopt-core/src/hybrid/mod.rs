//! Hybrid-system bookkeeping
//!
//! Contact phases, the discrete events between them, and the time grid the
//! optimizer is built on.

pub mod contact_sequence;
pub mod discrete_event;
pub mod time_discretization;

pub use contact_sequence::ContactSequence;
pub use discrete_event::{DiscreteEvent, DiscreteEventType};
pub use time_discretization::{GridInfo, GridType, TimeDiscretization};
