//! Receding-horizon controller
//!
//! Wraps an [`OcpSolver`] for model predictive control: each cycle drops
//! the contact events that have already happened, shifts the horizon to the
//! current time, runs a bounded number of warm-started Newton iterations and
//! publishes a [`PlannedTrajectory`] for state feedback.

use nalgebra::DVector;
use thiserror::Error;
use tracing::{debug, warn};

use legopt_core::{CoreError, RobotModel};

use crate::config::MpcConfig;
use crate::error::SolverError;
use crate::solver::{OcpSolver, SolveStatistics};
use crate::trajectory::PlannedTrajectory;

/// Controller errors
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("Solver error: {0}")]
    SolverError(#[from] SolverError),
    #[error("Contact sequence error: {0}")]
    ContactSequence(#[from] CoreError),
    #[error("Controller has not been initialized")]
    NotInitialized,
    #[error("No valid trajectory available")]
    NoValidTrajectory,
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerState {
    /// Waiting for the initial solve
    Idle,
    /// Following a valid trajectory
    Executing,
    /// The last solve failed; the previous trajectory is kept
    Error,
}

/// Model predictive controller built on the Riccati solver
pub struct MpcController<R: RobotModel> {
    solver: OcpSolver<R>,
    config: MpcConfig,
    state: PlannerState,
    trajectory: Option<PlannedTrajectory>,
    last_stats: SolveStatistics,
}

impl<R: RobotModel> MpcController<R> {
    pub fn new(solver: OcpSolver<R>, config: MpcConfig) -> Result<Self, PlannerError> {
        config.validate()?;
        Ok(Self {
            solver,
            config,
            state: PlannerState::Idle,
            trajectory: None,
            last_stats: SolveStatistics::default(),
        })
    }

    /// Solve from scratch at `t` with the solver's full iteration budget.
    pub fn init(
        &mut self,
        t: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
    ) -> Result<&SolveStatistics, PlannerError> {
        self.pop_elapsed_events(t)?;
        let stats = self.solver.solve(t, q, v, true)?;
        self.publish(t, stats);
        Ok(&self.last_stats)
    }

    /// One control cycle at time `t` from the measured state `(q, v)`.
    ///
    /// Runs `iterations_per_cycle` Newton iterations warm-started from the
    /// previous cycle.
    pub fn update(
        &mut self,
        t: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
    ) -> Result<&SolveStatistics, PlannerError> {
        if self.state == PlannerState::Idle {
            return Err(PlannerError::NotInitialized);
        }
        self.pop_elapsed_events(t)?;
        let stats = self
            .solver
            .update_solution(t, q, v, self.config.iterations_per_cycle)?;
        self.publish(t, stats);
        Ok(&self.last_stats)
    }

    /// Feedback control `u = u_k + K_k (x ⊖ x_k)` at time `t`.
    pub fn control(
        &self,
        t: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
    ) -> Result<DVector<f64>, PlannerError> {
        let trajectory = self
            .trajectory
            .as_ref()
            .filter(|traj| traj.is_valid && !traj.is_stale(t, self.config.max_trajectory_age))
            .ok_or(PlannerError::NoValidTrajectory)?;
        trajectory
            .control_at(self.solver.robot(), t, q, v)
            .ok_or(PlannerError::NoValidTrajectory)
    }

    pub fn state(&self) -> PlannerState {
        self.state
    }

    pub fn trajectory(&self) -> Option<&PlannedTrajectory> {
        self.trajectory.as_ref()
    }

    pub fn last_statistics(&self) -> &SolveStatistics {
        &self.last_stats
    }

    pub fn solver(&self) -> &OcpSolver<R> {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut OcpSolver<R> {
        &mut self.solver
    }

    /// Remove events at or before `t` from the front of the contact
    /// sequence so phase 0 is the current phase.
    fn pop_elapsed_events(&mut self, t: f64) -> Result<(), PlannerError> {
        let tolerance = self.solver.time_discretization().tolerance();
        let elapsed = {
            let sequence = self.solver.contact_sequence();
            (0..sequence.num_discrete_events())
                .take_while(|&e| sequence.event_time(e) <= t + tolerance)
                .count()
        };
        if elapsed == 0 {
            return Ok(());
        }
        let sequence = self.solver.contact_sequence_mut();
        for _ in 0..elapsed {
            sequence.pop_front()?;
        }
        debug!(t, elapsed, "dropped elapsed contact events");
        Ok(())
    }

    fn publish(&mut self, t: f64, stats: SolveStatistics) {
        if stats.status.is_failure() {
            warn!(t, status = ?stats.status, "solve failed, keeping the previous trajectory");
            self.state = PlannerState::Error;
        } else {
            self.trajectory = Some(self.solver.trajectory(t, true));
            self.state = PlannerState::Executing;
        }
        self.last_stats = stats;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverConfig;
    use crate::cost::{ConfigurationSpaceCost, CostFunction};
    use crate::solver::SolverBuilder;
    use approx::assert_relative_eq;
    use legopt_core::robot::{Manipulator, PointMass};
    use legopt_core::ContactSequence;

    fn manipulator_controller() -> MpcController<Manipulator> {
        let robot = Manipulator::uniform(2).unwrap();
        let mut tracking = ConfigurationSpaceCost::new(&robot);
        tracking.set_q_ref(DVector::from_vec(vec![1.0, 0.0])).unwrap();
        tracking.set_q_weight(DVector::from_element(2, 10.0)).unwrap();
        tracking.set_v_weight(DVector::from_element(2, 1.0)).unwrap();
        tracking.set_u_weight(DVector::from_element(2, 0.01)).unwrap();
        let mut cost = CostFunction::new();
        cost.push(tracking);

        let mut config = SolverConfig::default();
        config.horizon.horizon_time = 0.5;
        config.horizon.num_stages = 10;
        let solver = SolverBuilder::new(robot)
            .with_config(config)
            .with_cost(cost)
            .build()
            .unwrap();
        MpcController::new(solver, MpcConfig::default()).unwrap()
    }

    #[test]
    fn test_update_requires_init() {
        let mut controller = manipulator_controller();
        let q = DVector::zeros(2);
        let v = DVector::zeros(2);
        assert!(matches!(
            controller.update(0.0, &q, &v),
            Err(PlannerError::NotInitialized)
        ));
        assert!(matches!(
            controller.control(0.0, &q, &v),
            Err(PlannerError::NoValidTrajectory)
        ));
    }

    #[test]
    fn test_feedback_after_init() {
        let mut controller = manipulator_controller();
        let q = DVector::from_vec(vec![0.5, -0.3]);
        let v = DVector::zeros(2);
        let converged = controller.init(0.0, &q, &v).unwrap().is_converged();
        assert!(converged);
        assert_eq!(controller.state(), PlannerState::Executing);

        let u = controller.control(0.0, &q, &v).unwrap();
        assert_eq!(u.len(), 2);
        assert_relative_eq!(u, controller.solver().solution(0).u, epsilon = 1e-6);

        controller.update(0.02, &q, &v).unwrap();
        assert_eq!(controller.trajectory().unwrap().start_time(), Some(0.02));
        assert!(controller.control(0.5, &q, &v).is_err());
    }

    #[test]
    fn test_elapsed_events_are_popped() {
        let robot = PointMass::new(1.0).unwrap();
        let mut standing = robot.create_contact_status();
        standing.activate(0).unwrap();
        let mut sequence = ContactSequence::new(1, 2);
        sequence.init(standing.clone()).unwrap();
        sequence
            .push_back_status(robot.create_contact_status(), 0.3, false)
            .unwrap();
        sequence.push_back_status(standing, 0.6, false).unwrap();

        let solver = SolverBuilder::new(robot)
            .with_contact_sequence(sequence)
            .build()
            .unwrap();
        let mut controller = MpcController::new(solver, MpcConfig::default()).unwrap();
        controller.pop_elapsed_events(0.45).unwrap();

        let sequence = controller.solver().contact_sequence();
        assert_eq!(sequence.num_discrete_events(), 1);
        assert!(!sequence.contact_status(0).has_active_contacts());
    }
}
