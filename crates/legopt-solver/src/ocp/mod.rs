//! Stage subproblems of the multiple-shooting discretization

pub mod contact_dynamics;
pub mod split_ocp;
pub mod state_equation;
pub mod terminal_ocp;

pub use contact_dynamics::ContactDynamics;
pub use split_ocp::{SplitOcp, StageKind};
pub use terminal_ocp::TerminalOcp;
