//! legopt Solver
//!
//! Riccati-recursion direct multiple shooting solver for trajectory
//! optimization of robots with switching contacts.
//!
//! # Architecture
//!
//! The horizon `[t, t + T]` is split into `N` uniform intervals, with extra
//! grid points wherever a contact is made or broken:
//!
//! ```text
//! minimize    Σ ℓ(x_i, u_i, a_i, f_i) + Σ ℓ_imp(x_j, dv_j, Λ_j) + φ(x_N)
//! subject to  x_0 = x̄
//!             x_{i+1} = x_i ⊕ f(x_i, a_i) dt_i     (regular stages)
//!             x_{j+1} = x_j + [0; dv_j]             (impulse stages)
//!             ID(q, v, a) = Sᵀu + Jᵀf,  contact acceleration = 0
//!             g(x, u, a, f) ≥ 0                     (interior point)
//! ```
//!
//! Each Newton step condenses every stage to an LQR stage, runs a backward
//! Riccati sweep, propagates the state direction forward and expands the
//! condensed variables stage by stage.
//!
//! # Components
//!
//! - [`config`]: Solver, horizon, barrier, line search and controller settings
//! - [`ocp`]: Regular, impulse and terminal stage subproblems
//! - [`cost`]: Cost components and the shared cost function
//! - [`constraints`]: Inequality constraint components and interior-point data
//! - [`riccati`]: Backward factorization and forward expansion
//! - [`line_search`]: Filter and merit step-size selection
//! - [`solver`]: The Newton iteration over the whole horizon
//! - [`trajectory`]: Solver output with interpolation and feedback lookup
//! - [`controller`]: Receding-horizon controller

pub mod config;
pub mod constraints;
pub mod controller;
pub mod cost;
pub mod error;
pub mod kkt;
pub mod line_search;
pub mod ocp;
pub mod performance_index;
pub mod riccati;
pub mod solution;
pub mod solver;
pub mod trajectory;

// Re-exports
pub use config::{MpcConfig, SolverConfig};
pub use controller::{MpcController, PlannerError, PlannerState};
pub use cost::CostFunction;
pub use constraints::Constraints;
pub use error::{FactorizationError, SolverError, SolverResult};
pub use performance_index::PerformanceIndex;
pub use riccati::LqrPolicy;
pub use solution::{SplitDirection, SplitSolution};
pub use solver::{OcpDefinition, OcpSolver, SolveStatistics, SolverBuilder, SolverStatus};
pub use trajectory::PlannedTrajectory;
