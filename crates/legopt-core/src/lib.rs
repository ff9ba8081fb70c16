//! # legopt Core
//!
//! Robot-model interface and hybrid contact bookkeeping for the legopt
//! trajectory optimizer.
//!
//! ## Modules
//!
//! - [`robot`]: Robot model trait, contact/impulse status, reference robots
//! - [`hybrid`]: Discrete events, contact sequence and time discretization
//! - [`math`]: Contact-frame rotations and dense linear algebra helpers
//! - [`error`]: Error type shared by the core modules

pub mod error;
pub mod hybrid;
pub mod math;
pub mod robot;

pub use error::{CoreError, CoreResult};
pub use hybrid::{
    ContactSequence, DiscreteEvent, DiscreteEventType, GridInfo, GridType, TimeDiscretization,
};
pub use robot::{ContactStatus, ImpulseStatus, RobotModel};

/// Gravity constant [m/s²]
pub const GRAVITY: f64 = 9.81;
