//! Solver configuration
//!
//! Configuration parameters for the Riccati-recursion OCP solver.

use serde::{Deserialize, Serialize};

use crate::error::SolverError;

/// Main solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Horizon configuration
    pub horizon: HorizonConfig,
    /// Interior-point barrier parameters
    pub barrier: BarrierConfig,
    /// Step-size selection
    pub line_search: LineSearchConfig,
    /// Control-Hessian regularization
    pub regularization: RegularizationConfig,
    /// Maximum number of Newton iterations per solve
    pub max_iterations: usize,
    /// KKT error below which a solve is converged
    pub kkt_tolerance: f64,
    /// Worker threads for per-stage evaluation
    pub num_threads: usize,
    /// Baumgarte stabilization time constant of contact constraints [s]
    pub baumgarte_time_constant: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            horizon: HorizonConfig::default(),
            barrier: BarrierConfig::default(),
            line_search: LineSearchConfig::default(),
            regularization: RegularizationConfig::default(),
            max_iterations: 100,
            kkt_tolerance: 1e-7,
            num_threads: 1,
            baumgarte_time_constant: 0.05,
        }
    }
}

impl SolverConfig {
    /// Reject out-of-range parameters instead of clamping them.
    pub fn validate(&self) -> Result<(), SolverError> {
        self.horizon.validate()?;
        self.barrier.validate()?;
        self.line_search.validate()?;
        self.regularization.validate()?;
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations must be positive"));
        }
        if !(self.kkt_tolerance > 0.0) {
            return Err(invalid(format!(
                "kkt_tolerance must be positive, got {}",
                self.kkt_tolerance
            )));
        }
        if self.num_threads == 0 {
            return Err(invalid("num_threads must be positive"));
        }
        if !(self.baumgarte_time_constant > 0.0) {
            return Err(invalid(format!(
                "baumgarte_time_constant must be positive, got {}",
                self.baumgarte_time_constant
            )));
        }
        Ok(())
    }
}

/// Horizon configuration for the OCP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonConfig {
    /// Total horizon time T [s]
    pub horizon_time: f64,
    /// Number of uniform stages N
    pub num_stages: usize,
    /// Tolerance for matching event times to grid points [s]
    pub event_tolerance: f64,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            horizon_time: 1.0,
            num_stages: 20,
            event_tolerance: 1e-8,
        }
    }
}

impl HorizonConfig {
    /// Uniform time step T / N
    pub fn time_step(&self) -> f64 {
        self.horizon_time / self.num_stages as f64
    }

    pub fn validate(&self) -> Result<(), SolverError> {
        if !(self.horizon_time > 0.0) {
            return Err(invalid(format!(
                "horizon_time must be positive, got {}",
                self.horizon_time
            )));
        }
        if self.num_stages == 0 {
            return Err(invalid("num_stages must be positive"));
        }
        if !(self.event_tolerance >= 0.0) {
            return Err(invalid("event_tolerance must be non-negative"));
        }
        Ok(())
    }
}

/// Barrier parameter μ and its annealing schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarrierConfig {
    /// Initial barrier parameter
    pub initial: f64,
    /// Barrier floor
    pub min: f64,
    /// KKT error below which μ is decreased
    pub kkt_tolerance: f64,
    /// Linear decrease factor κ in μ ← min(κ·μ, μ^θ)
    pub linear_decrease_factor: f64,
    /// Superlinear decrease power θ
    pub superlinear_decrease_power: f64,
    /// Fraction-to-boundary rule τ ∈ (0, 1)
    pub fraction_to_boundary_rule: f64,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            initial: 1e-3,
            min: 1e-6,
            kkt_tolerance: 1e-3,
            linear_decrease_factor: 0.2,
            superlinear_decrease_power: 1.5,
            fraction_to_boundary_rule: 0.995,
        }
    }
}

impl BarrierConfig {
    pub fn validate(&self) -> Result<(), SolverError> {
        if !(self.initial > 0.0) {
            return Err(invalid(format!(
                "barrier parameter must be positive, got {}",
                self.initial
            )));
        }
        if !(self.min > 0.0) || self.min > self.initial {
            return Err(invalid(format!(
                "barrier floor must lie in (0, {}], got {}",
                self.initial, self.min
            )));
        }
        if !(self.fraction_to_boundary_rule > 0.0 && self.fraction_to_boundary_rule < 1.0) {
            return Err(invalid(format!(
                "fraction-to-boundary rule must lie in (0, 1), got {}",
                self.fraction_to_boundary_rule
            )));
        }
        if !(self.linear_decrease_factor > 0.0 && self.linear_decrease_factor < 1.0) {
            return Err(invalid("linear_decrease_factor must lie in (0, 1)"));
        }
        if !(self.superlinear_decrease_power > 1.0) {
            return Err(invalid("superlinear_decrease_power must exceed 1"));
        }
        Ok(())
    }

    /// Next barrier parameter once the current one is solved accurately enough.
    pub fn decreased(&self, barrier: f64) -> f64 {
        (self.linear_decrease_factor * barrier)
            .min(barrier.powf(self.superlinear_decrease_power))
            .max(self.min)
    }
}

/// Step-size selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineSearchMethod {
    /// Filter on (cost, constraint violation) pairs
    Filter,
    /// Armijo backtracking on an exact-penalty merit function
    MeritBacktracking,
}

/// Line search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSearchConfig {
    /// Disabled: take the fraction-to-boundary step
    pub enabled: bool,
    pub method: LineSearchMethod,
    /// Backtracking factor
    pub step_size_reduction_rate: f64,
    /// Step accepted without further backtracking
    pub min_step_size: f64,
    /// Armijo sufficient-decrease rate
    pub armijo_control_rate: f64,
    /// Margin of the merit penalty over the multiplier norm
    pub margin_rate: f64,
    /// Sufficient-decrease margin of the filter
    pub filter_margin: f64,
}

impl Default for LineSearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            method: LineSearchMethod::Filter,
            step_size_reduction_rate: 0.75,
            min_step_size: 0.05,
            armijo_control_rate: 1e-3,
            margin_rate: 0.05,
            filter_margin: 1e-5,
        }
    }
}

impl LineSearchConfig {
    pub fn validate(&self) -> Result<(), SolverError> {
        if !(self.step_size_reduction_rate > 0.0 && self.step_size_reduction_rate < 1.0) {
            return Err(invalid("step_size_reduction_rate must lie in (0, 1)"));
        }
        if !(self.min_step_size > 0.0 && self.min_step_size <= 1.0) {
            return Err(invalid("min_step_size must lie in (0, 1]"));
        }
        if !(self.armijo_control_rate > 0.0 && self.armijo_control_rate < 1.0) {
            return Err(invalid("armijo_control_rate must lie in (0, 1)"));
        }
        if !(self.margin_rate >= 0.0) || !(self.filter_margin >= 0.0) {
            return Err(invalid("line search margins must be non-negative"));
        }
        Ok(())
    }
}

/// Adaptive δI regularization of the control Hessian
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegularizationConfig {
    /// First regularization tried after a failed factorization
    pub initial: f64,
    /// Growth factor between attempts
    pub growth_factor: f64,
    /// Attempts before the factorization is reported as failed
    pub max_attempts: usize,
}

impl Default for RegularizationConfig {
    fn default() -> Self {
        Self {
            initial: 1e-9,
            growth_factor: 10.0,
            max_attempts: 12,
        }
    }
}

impl RegularizationConfig {
    pub fn validate(&self) -> Result<(), SolverError> {
        if !(self.initial > 0.0) || !(self.growth_factor > 1.0) {
            return Err(invalid(
                "regularization must start positive and grow by a factor above 1",
            ));
        }
        Ok(())
    }
}

/// Receding-horizon controller parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpcConfig {
    /// Newton iterations run per control cycle after the first solve
    pub iterations_per_cycle: usize,
    /// A trajectory older than this is no longer used for feedback [s]
    pub max_trajectory_age: f64,
}

impl Default for MpcConfig {
    fn default() -> Self {
        Self {
            iterations_per_cycle: 1,
            max_trajectory_age: 0.1,
        }
    }
}

impl MpcConfig {
    pub fn validate(&self) -> Result<(), SolverError> {
        if self.iterations_per_cycle == 0 {
            return Err(invalid("iterations_per_cycle must be positive"));
        }
        if !(self.max_trajectory_age > 0.0) {
            return Err(invalid(format!(
                "max_trajectory_age must be positive, got {}",
                self.max_trajectory_age
            )));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> SolverError {
    SolverError::InvalidConfig(message.into())
}
