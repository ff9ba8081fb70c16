//! Mathematical utilities
//!
//! Contact-frame rotations and small dense linear algebra helpers shared by
//! the stage subproblems and the Riccati recursion.

pub mod linalg;
pub mod rotation;

pub use linalg::*;
pub use rotation::*;
