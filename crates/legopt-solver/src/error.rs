//! Solver error types

use legopt_core::CoreError;
use thiserror::Error;

/// Solver errors
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid state dimension: expected {expected}, got {got}")]
    InvalidStateDimension { expected: usize, got: usize },
    #[error("Contact force dimension mismatch at stage {stage}: contact status needs {expected}, solution has {got}")]
    ContactDimensionMismatch {
        stage: usize,
        expected: usize,
        got: usize,
    },
    #[error("Contact dynamics matrix is singular at stage {stage}")]
    SingularContactDynamics { stage: usize },
    #[error("Riccati factorization failed: {0}")]
    Factorization(#[from] FactorizationError),
    #[error("Worker pool could not be built: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Contact bookkeeping error: {0}")]
    Core(#[from] CoreError),
}

/// The control-block Hessian stayed indefinite after regularization
#[derive(Debug, Clone, PartialEq, Error)]
#[error("control Hessian at grid point {stage} is not positive definite (last regularization {regularization:e})")]
pub struct FactorizationError {
    pub stage: usize,
    pub regularization: f64,
}

/// Result alias for the solver crate.
pub type SolverResult<T> = Result<T, SolverError>;
