//! Time discretization of a hybrid horizon
//!
//! The horizon `[t, t + T]` is split into `N` uniform intervals. Discrete
//! events inside the horizon split the interval they fall into:
//!
//! ```text
//! impulse at te:  [t_k, te) Intermediate | te Impulse (dt = 0) | [te, t_k+1) Aux
//! lift at te:     [t_k, te) Lift                               | [te, t_k+1) Aux
//! ```
//!
//! An event within tolerance of a grid point tags that grid point instead of
//! creating a zero-length stage. The same holds for an event within
//! tolerance of the preceding event: an impulse adds only its impulse grid
//! point and a lift re-tags the regular stage that ends there.

use serde::{Deserialize, Serialize};

use super::contact_sequence::ContactSequence;
use super::discrete_event::DiscreteEventType;
use crate::error::{CoreError, CoreResult};

/// Default tolerance for matching event times to grid points [s]
pub const DEFAULT_EVENT_TOLERANCE: f64 = 1e-8;

/// Role of a grid point in the recursion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridType {
    /// Regular stage on the uniform grid
    Intermediate,
    /// Zero-duration velocity jump at a touchdown
    Impulse,
    /// Regular stage ending at a lift-off
    Lift,
    /// Regular stage starting at an event inside an interval
    Aux,
    /// Terminal stage
    Terminal,
}

/// One grid point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridInfo {
    /// Start of the horizon [s]
    pub t0: f64,
    /// Time of this grid point [s]
    pub t: f64,
    /// Duration of the stage starting here (zero for impulse and terminal)
    pub dt: f64,
    pub grid_type: GridType,
    /// Contact phase the stage belongs to
    pub phase: usize,
    /// Index of the uniform interval containing the grid point
    pub stage: usize,
    /// Impulse event index for impulse grid points
    pub impulse_index: Option<usize>,
    /// Lift event index for lift grid points
    pub lift_index: Option<usize>,
}

impl GridInfo {
    fn new(t0: f64, t: f64, dt: f64, grid_type: GridType, phase: usize, stage: usize) -> Self {
        Self {
            t0,
            t,
            dt,
            grid_type,
            phase,
            stage,
            impulse_index: None,
            lift_index: None,
        }
    }

    /// Stages with a time step, dynamics and control.
    pub fn is_regular(&self) -> bool {
        matches!(
            self.grid_type,
            GridType::Intermediate | GridType::Lift | GridType::Aux
        )
    }
}

/// Hybrid time grid over a receding horizon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeDiscretization {
    horizon: f64,
    num_stages: usize,
    tolerance: f64,
    grid: Vec<GridInfo>,
}

impl TimeDiscretization {
    /// Horizon length `T > 0` split into `N > 0` uniform intervals.
    pub fn new(horizon: f64, num_stages: usize) -> CoreResult<Self> {
        Self::with_tolerance(horizon, num_stages, DEFAULT_EVENT_TOLERANCE)
    }

    pub fn with_tolerance(horizon: f64, num_stages: usize, tolerance: f64) -> CoreResult<Self> {
        if !(horizon > 0.0) || !horizon.is_finite() {
            return Err(CoreError::InvalidParameter(format!(
                "horizon must be positive, got {horizon}"
            )));
        }
        if num_stages == 0 {
            return Err(CoreError::InvalidParameter(
                "number of stages must be positive".to_string(),
            ));
        }
        if !(tolerance >= 0.0) || tolerance >= horizon / num_stages as f64 {
            return Err(CoreError::InvalidParameter(format!(
                "event tolerance {tolerance} must be non-negative and below the stage length"
            )));
        }
        Ok(Self {
            horizon,
            num_stages,
            tolerance,
            grid: Vec::new(),
        })
    }

    /// Build the grid for the horizon starting at `t`.
    ///
    /// Events at or before `t` have already happened and only advance the
    /// initial phase; events at or after `t + T` are ignored.
    pub fn discretize(&mut self, contact_sequence: &ContactSequence, t: f64) {
        let tol = self.tolerance;
        let dt = self.horizon / self.num_stages as f64;
        let t_end = t + self.horizon;

        let mut phase = 0;
        let mut impulse_count = 0;
        let mut lift_count = 0;
        let mut events = Vec::new();
        for e in 0..contact_sequence.num_discrete_events() {
            let event_type = contact_sequence.event_type(e);
            let sub_index = match event_type {
                DiscreteEventType::Impulse => {
                    impulse_count += 1;
                    impulse_count - 1
                }
                DiscreteEventType::Lift => {
                    lift_count += 1;
                    lift_count - 1
                }
                DiscreteEventType::None => continue,
            };
            let te = contact_sequence.event_time(e);
            if te <= t + tol {
                phase = e + 1;
            } else if te < t_end - tol {
                events.push((te, event_type, sub_index));
            } else {
                break;
            }
        }

        self.grid.clear();
        let mut pending = events.into_iter().peekable();
        for k in 0..self.num_stages {
            let t_k = t + k as f64 * dt;
            let t_k1 = t + (k + 1) as f64 * dt;
            let mut cursor = t_k;
            let mut after_event = false;
            let mut closed = false;

            while let Some(&(te, event_type, sub_index)) = pending.peek() {
                if te >= t_k1 + tol {
                    break;
                }
                pending.next();
                let at_grid_point = te > t_k1 - tol;
                let event_end = if at_grid_point { t_k1 } else { te };

                if event_end - cursor <= tol {
                    self.merge_event(t, cursor, event_type, sub_index, phase, k);
                    phase += 1;
                    continue;
                }

                let mut stage = match event_type {
                    DiscreteEventType::Lift => {
                        let mut info =
                            GridInfo::new(t, cursor, event_end - cursor, GridType::Lift, phase, k);
                        info.lift_index = Some(sub_index);
                        info
                    }
                    _ if after_event => {
                        GridInfo::new(t, cursor, event_end - cursor, GridType::Aux, phase, k)
                    }
                    _ => GridInfo::new(t, cursor, event_end - cursor, GridType::Intermediate, phase, k),
                };
                stage.dt = stage.dt.max(0.0);
                self.grid.push(stage);

                if event_type == DiscreteEventType::Impulse {
                    let mut impulse =
                        GridInfo::new(t, event_end, 0.0, GridType::Impulse, phase, k);
                    impulse.impulse_index = Some(sub_index);
                    self.grid.push(impulse);
                }

                phase += 1;
                cursor = event_end;
                after_event = true;
                if at_grid_point {
                    closed = true;
                    break;
                }
            }

            if !closed {
                let grid_type = if after_event {
                    GridType::Aux
                } else {
                    GridType::Intermediate
                };
                self.grid
                    .push(GridInfo::new(t, cursor, t_k1 - cursor, grid_type, phase, k));
            }
        }

        self.grid.push(GridInfo::new(
            t,
            t_end,
            0.0,
            GridType::Terminal,
            phase,
            self.num_stages,
        ));
    }

    /// Apply an event at `cursor`, the end of the last pushed stage.
    fn merge_event(
        &mut self,
        t0: f64,
        cursor: f64,
        event_type: DiscreteEventType,
        sub_index: usize,
        phase: usize,
        k: usize,
    ) {
        match event_type {
            DiscreteEventType::Impulse => {
                let mut impulse = GridInfo::new(t0, cursor, 0.0, GridType::Impulse, phase, k);
                impulse.impulse_index = Some(sub_index);
                self.grid.push(impulse);
            }
            DiscreteEventType::Lift => {
                if let Some(last) = self.grid.last_mut().filter(|g| g.is_regular()) {
                    last.grid_type = GridType::Lift;
                    last.lift_index = Some(sub_index);
                }
            }
            DiscreteEventType::None => {}
        }
    }

    pub fn grid(&self) -> &[GridInfo] {
        &self.grid
    }

    pub fn grid_info(&self, i: usize) -> &GridInfo {
        &self.grid[i]
    }

    /// Number of grid points including the terminal one.
    pub fn len(&self) -> usize {
        self.grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    pub fn horizon(&self) -> f64 {
        self.horizon
    }

    pub fn num_stages(&self) -> usize {
        self.num_stages
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn num_impulse_stages(&self) -> usize {
        self.count(GridType::Impulse)
    }

    pub fn num_lift_stages(&self) -> usize {
        self.count(GridType::Lift)
    }

    fn count(&self, grid_type: GridType) -> usize {
        self.grid.iter().filter(|g| g.grid_type == grid_type).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::ContactStatus;
    use approx::assert_relative_eq;

    fn standing() -> ContactSequence {
        let mut seq = ContactSequence::new(1, 2);
        seq.init(ContactStatus::all_active(1)).unwrap();
        seq
    }

    #[test]
    fn test_invalid_horizon() {
        assert!(TimeDiscretization::new(0.0, 10).is_err());
        assert!(TimeDiscretization::new(1.0, 0).is_err());
        assert!(TimeDiscretization::with_tolerance(1.0, 10, 0.5).is_err());
    }

    #[test]
    fn test_uniform_grid_without_events() {
        let mut discretization = TimeDiscretization::new(1.0, 10).unwrap();
        discretization.discretize(&standing(), 2.0);
        assert_eq!(discretization.len(), 11);
        let grid = discretization.grid();
        assert_relative_eq!(grid[3].t, 2.3, epsilon = 1e-12);
        assert!(grid[..10].iter().all(|g| g.grid_type == GridType::Intermediate));
        assert_eq!(grid[10].grid_type, GridType::Terminal);
        let total: f64 = grid.iter().map(|g| g.dt).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_lift_inside_interval() {
        let mut seq = standing();
        seq.push_back_status(ContactStatus::new(1), 0.35, false).unwrap();
        let mut discretization = TimeDiscretization::new(1.0, 10).unwrap();
        discretization.discretize(&seq, 0.0);

        assert_eq!(discretization.len(), 12);
        assert_eq!(discretization.num_lift_stages(), 1);
        let lift = discretization.grid_info(3);
        assert_eq!(lift.grid_type, GridType::Lift);
        assert_relative_eq!(lift.dt, 0.05, epsilon = 1e-12);
        assert_eq!(lift.lift_index, Some(0));
        assert_eq!(lift.phase, 0);
        let aux = discretization.grid_info(4);
        assert_eq!(aux.grid_type, GridType::Aux);
        assert_eq!(aux.phase, 1);
        assert_relative_eq!(aux.t, 0.35, epsilon = 1e-12);
        assert_eq!(discretization.grid_info(11).phase, 1);
    }

    #[test]
    fn test_impulse_inside_interval() {
        let mut seq = ContactSequence::new(1, 2);
        seq.init(ContactStatus::new(1)).unwrap();
        seq.push_back_status(ContactStatus::all_active(1), 0.62, false).unwrap();
        let mut discretization = TimeDiscretization::new(1.0, 10).unwrap();
        discretization.discretize(&seq, 0.0);

        assert_eq!(discretization.len(), 13);
        let types: Vec<GridType> = discretization.grid()[6..9].iter().map(|g| g.grid_type).collect();
        assert_eq!(types, vec![GridType::Intermediate, GridType::Impulse, GridType::Aux]);
        let impulse = discretization.grid_info(7);
        assert_eq!(impulse.dt, 0.0);
        assert_eq!(impulse.impulse_index, Some(0));
        assert_eq!(impulse.phase, 0);
        assert_eq!(discretization.grid_info(8).phase, 1);
        let total: f64 = discretization.grid().iter().map(|g| g.dt).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_event_on_grid_point_is_not_duplicated() {
        let mut seq = standing();
        seq.push_back_status(ContactStatus::new(1), 0.3, false).unwrap();
        seq.push_back_status(ContactStatus::all_active(1), 0.6, false).unwrap();
        let mut discretization = TimeDiscretization::new(1.0, 10).unwrap();
        discretization.discretize(&seq, 0.0);

        // one extra grid point for the impulse, none for the lift
        assert_eq!(discretization.len(), 12);
        assert_eq!(discretization.grid_info(2).grid_type, GridType::Lift);
        assert_relative_eq!(discretization.grid_info(2).dt, 0.1, epsilon = 1e-12);
        assert_eq!(discretization.grid_info(3).grid_type, GridType::Intermediate);
        assert_eq!(discretization.grid_info(3).phase, 1);
        assert_eq!(discretization.grid_info(6).grid_type, GridType::Impulse);
        assert_relative_eq!(discretization.grid_info(6).t, 0.6, epsilon = 1e-12);
        assert_eq!(discretization.grid_info(7).grid_type, GridType::Intermediate);
        assert_eq!(discretization.grid_info(7).phase, 2);
        assert!(discretization
            .grid()
            .iter()
            .filter(|g| g.is_regular())
            .all(|g| g.dt > 1e-9));
    }

    #[test]
    fn test_past_and_future_events() {
        let mut seq = standing();
        seq.push_back_status(ContactStatus::new(1), 0.5, false).unwrap();
        seq.push_back_status(ContactStatus::all_active(1), 3.0, false).unwrap();
        let mut discretization = TimeDiscretization::new(1.0, 10).unwrap();
        discretization.discretize(&seq, 0.7);

        assert_eq!(discretization.len(), 11);
        assert!(discretization.grid().iter().all(|g| g.phase == 1));
        assert_eq!(discretization.num_impulse_stages(), 0);
    }

    #[test]
    fn test_events_within_tolerance_share_a_grid_point() {
        let mut seq = standing();
        // lift and touchdown straddling the grid point 0.3
        seq.push_back_status(ContactStatus::new(1), 0.3 - 5e-9, false).unwrap();
        seq.push_back_status(ContactStatus::all_active(1), 0.3 + 5e-9, false).unwrap();
        // lift and touchdown inside one interval
        seq.push_back_status(ContactStatus::new(1), 0.55, false).unwrap();
        seq.push_back_status(ContactStatus::all_active(1), 0.55 + 5e-9, false).unwrap();
        let mut discretization = TimeDiscretization::new(1.0, 10).unwrap();
        discretization.discretize(&seq, 0.0);

        let grid = discretization.grid();
        assert!(grid.iter().filter(|g| g.is_regular()).all(|g| g.dt > 1e-6));
        assert_eq!(discretization.num_lift_stages(), 2);
        assert_eq!(discretization.num_impulse_stages(), 2);

        assert_eq!(grid[2].grid_type, GridType::Lift);
        assert_eq!(grid[3].grid_type, GridType::Impulse);
        assert_relative_eq!(grid[3].t, 0.3, epsilon = 1e-12);
        assert_eq!(grid[3].impulse_index, Some(0));
        assert_eq!(grid[4].grid_type, GridType::Intermediate);
        assert_eq!(grid[4].phase, 2);

        let impulse = grid.iter().rposition(|g| g.grid_type == GridType::Impulse).unwrap();
        assert_eq!(grid[impulse - 1].grid_type, GridType::Lift);
        assert_eq!(grid[impulse - 1].lift_index, Some(1));
        assert_relative_eq!(grid[impulse].t, 0.55, epsilon = 1e-12);
        assert_eq!(grid[impulse + 1].grid_type, GridType::Aux);
        assert_eq!(grid[impulse + 1].phase, 4);

        let total: f64 = grid.iter().map(|g| g.dt).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }
}
