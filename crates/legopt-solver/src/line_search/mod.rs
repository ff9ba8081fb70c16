//! Step-size selection
//!
//! Trial points are produced by the caller through a closure returning the
//! (cost, violation) pair at a given step size, so the search itself is
//! independent of the stage data.

pub mod filter;

pub use filter::LineSearchFilter;

use tracing::debug;

use crate::config::{LineSearchConfig, LineSearchMethod};

#[derive(Debug, Clone)]
pub struct LineSearch {
    config: LineSearchConfig,
    filter: LineSearchFilter,
    penalty: f64,
}

impl LineSearch {
    pub fn new(config: LineSearchConfig) -> Self {
        Self {
            filter: LineSearchFilter::new(config.filter_margin),
            config,
            penalty: 0.0,
        }
    }

    pub fn config(&self) -> &LineSearchConfig {
        &self.config
    }

    pub fn filter(&self) -> &LineSearchFilter {
        &self.filter
    }

    /// Current merit penalty ρ.
    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    /// Forget the filter, e.g. after the barrier parameter changed.
    pub fn clear_filter(&mut self) {
        self.filter.clear();
    }

    /// Step size in `(0, max_step]`.
    ///
    /// `current` is the (cost, violation) pair of the current iterate,
    /// `directional_derivative` that of the cost along the step and
    /// `multiplier_linf` the largest Lagrange multiplier magnitude.
    pub fn compute_step_size<F>(
        &mut self,
        current: (f64, f64),
        directional_derivative: f64,
        multiplier_linf: f64,
        max_step: f64,
        eval_trial: F,
    ) -> f64
    where
        F: FnMut(f64) -> (f64, f64),
    {
        match self.config.method {
            LineSearchMethod::Filter => self.filter_search(current, max_step, eval_trial),
            LineSearchMethod::MeritBacktracking => self.merit_search(
                current,
                directional_derivative,
                multiplier_linf,
                max_step,
                eval_trial,
            ),
        }
    }

    fn min_step(&self, max_step: f64) -> f64 {
        self.config.min_step_size.min(max_step)
    }

    fn filter_search<F>(&mut self, current: (f64, f64), max_step: f64, mut eval_trial: F) -> f64
    where
        F: FnMut(f64) -> (f64, f64),
    {
        if self.filter.is_empty() {
            self.filter.augment(current.0, current.1);
        }
        let mut step = max_step;
        while step > self.config.min_step_size {
            let (cost, violation) = eval_trial(step);
            if self.filter.is_accepted(cost, violation) {
                self.filter.augment(cost, violation);
                return step;
            }
            step *= self.config.step_size_reduction_rate;
        }
        let step = self.min_step(max_step);
        let (cost, violation) = eval_trial(step);
        debug!(step, cost, violation, "filter line search fell back to the minimum step");
        if cost.is_finite() && violation.is_finite() {
            self.filter.augment(cost, violation);
        }
        step
    }

    fn merit_search<F>(
        &mut self,
        current: (f64, f64),
        directional_derivative: f64,
        multiplier_linf: f64,
        max_step: f64,
        mut eval_trial: F,
    ) -> f64
    where
        F: FnMut(f64) -> (f64, f64),
    {
        self.penalty = self
            .penalty
            .max((1.0 + self.config.margin_rate) * multiplier_linf);
        let (cost, violation) = current;
        let merit = cost + self.penalty * violation;
        let slope = directional_derivative - self.penalty * violation;

        let mut step = max_step;
        while step > self.config.min_step_size {
            let (trial_cost, trial_violation) = eval_trial(step);
            let trial_merit = trial_cost + self.penalty * trial_violation;
            if trial_merit <= merit + self.config.armijo_control_rate * step * slope {
                return step;
            }
            step *= self.config.step_size_reduction_rate;
        }
        debug!(penalty = self.penalty, "merit line search fell back to the minimum step");
        self.min_step(max_step)
    }
}
