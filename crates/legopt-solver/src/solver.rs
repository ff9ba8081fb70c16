//! Direct multiple shooting solver
//!
//! [`OcpSolver`] owns the hybrid time grid, one subproblem and one set of
//! buffers per grid point, and runs the Newton iteration:
//!
//! 1. per-stage KKT evaluation and condensation (parallel)
//! 2. backward Riccati factorization (sequential)
//! 3. forward state propagation (sequential)
//! 4. per-stage expansion of the condensed variables (parallel)
//! 5. fraction-to-boundary step, optionally shortened by the line search
//! 6. per-stage update (parallel) and barrier annealing
//!
//! Grid point `i < N` is a regular or impulse stage; the last grid point is
//! the terminal stage.

use std::sync::Arc;
use std::time::Instant;

use nalgebra::{DVector, Vector3};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use legopt_core::math::l1_norm;
use legopt_core::robot::ContactStatus;
use legopt_core::{ContactSequence, CoreError, GridInfo, GridType, RobotModel, TimeDiscretization};

use crate::config::SolverConfig;
use crate::constraints::{ConstraintComponent, Constraints};
use crate::cost::CostFunction;
use crate::error::{FactorizationError, SolverError, SolverResult};
use crate::kkt::{SplitKktMatrix, SplitKktResidual, StageLayout};
use crate::line_search::LineSearch;
use crate::ocp::state_equation::initial_state_direction;
use crate::ocp::{SplitOcp, StageKind, TerminalOcp};
use crate::performance_index::PerformanceIndex;
use crate::riccati::{LqrPolicy, RiccatiRecursion, SplitRiccatiFactorization};
use crate::solution::{SplitDirection, SplitSolution};
use crate::trajectory::PlannedTrajectory;

/// Cost function and inequality constraints of the optimal control problem
///
/// Both are shared by every stage. The barrier parameter lives in the
/// constraints and is changed between iterations only.
#[derive(Debug, Clone)]
pub struct OcpDefinition {
    pub cost: Arc<CostFunction>,
    pub constraints: Arc<Constraints>,
}

impl OcpDefinition {
    pub fn new(cost: CostFunction, constraints: Constraints) -> Self {
        Self {
            cost: Arc::new(cost),
            constraints: Arc::new(constraints),
        }
    }
}

/// Outcome of a solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SolverStatus {
    /// No solve has run yet
    #[default]
    NotSolved,
    /// KKT error below the tolerance
    Converged,
    /// Iteration limit reached first
    MaxIterations,
    /// The control Hessian stayed indefinite after regularization
    FactorizationFailed,
    /// The contact dynamics of a stage could not be eliminated
    SingularContactDynamics,
}

impl SolverStatus {
    /// Whether the solve was aborted by a numerical failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FactorizationFailed | Self::SingularContactDynamics)
    }
}

/// Statistics from a solve
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolveStatistics {
    /// Newton steps taken
    pub iterations: usize,
    /// Wall-clock time of the solve [ms]
    pub solve_time_ms: f64,
    /// KKT error at the returned iterate
    pub kkt_error: f64,
    /// KKT error at every evaluated iterate, first to last
    pub kkt_errors: Vec<f64>,
    /// Cost at the returned iterate, barrier excluded
    pub cost: f64,
    /// Barrier parameter at the end of the solve
    pub barrier: f64,
    /// Last primal step size
    pub primal_step_size: f64,
    /// Last dual step size
    pub dual_step_size: f64,
    pub status: SolverStatus,
}

impl SolveStatistics {
    pub fn is_converged(&self) -> bool {
        self.status == SolverStatus::Converged
    }
}

/// Builder for [`OcpSolver`]
pub struct SolverBuilder<R: RobotModel> {
    robot: R,
    config: SolverConfig,
    cost: CostFunction,
    constraints: Vec<Arc<dyn ConstraintComponent>>,
    contact_sequence: Option<ContactSequence>,
}

impl<R: RobotModel> SolverBuilder<R> {
    pub fn new(robot: R) -> Self {
        Self {
            robot,
            config: SolverConfig::default(),
            cost: CostFunction::new(),
            constraints: Vec::new(),
            contact_sequence: None,
        }
    }

    pub fn with_config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cost(mut self, cost: CostFunction) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_constraint(mut self, component: impl ConstraintComponent + 'static) -> Self {
        self.constraints.push(Arc::new(component));
        self
    }

    pub fn with_contact_sequence(mut self, contact_sequence: ContactSequence) -> Self {
        self.contact_sequence = Some(contact_sequence);
        self
    }

    /// Validate everything and allocate the solver.
    ///
    /// Without a contact sequence the robot stays in a single phase with all
    /// contacts inactive.
    pub fn build(self) -> SolverResult<OcpSolver<R>> {
        let mut constraints = Constraints::new(
            self.config.barrier.initial,
            self.config.barrier.fraction_to_boundary_rule,
        )?;
        for component in self.constraints {
            constraints.push_shared(component);
        }
        let contact_sequence = self
            .contact_sequence
            .unwrap_or_else(|| ContactSequence::new(self.robot.max_num_contacts(), 0));
        OcpSolver::new(
            self.robot,
            OcpDefinition::new(self.cost, constraints),
            contact_sequence,
            self.config,
        )
    }
}

/// Riccati-recursion solver for the hybrid optimal control problem
pub struct OcpSolver<R: RobotModel> {
    robot: R,
    ocp: OcpDefinition,
    config: SolverConfig,
    contact_sequence: ContactSequence,
    time_discretization: TimeDiscretization,
    /// Grid must be rebuilt before the next evaluation
    needs_discretization: bool,
    pool: ThreadPool,
    recursion: RiccatiRecursion,
    line_search: LineSearch,
    stages: Vec<SplitOcp>,
    terminal: TerminalOcp,
    solutions: Vec<SplitSolution>,
    directions: Vec<SplitDirection>,
    kkt_matrices: Vec<SplitKktMatrix>,
    kkt_residuals: Vec<SplitKktResidual>,
    factorizations: Vec<SplitRiccatiFactorization>,
    policies: Vec<LqrPolicy>,
    /// Initial-state direction of the last evaluation
    dx0: DVector<f64>,
    performance: PerformanceIndex,
}

impl<R: RobotModel> OcpSolver<R> {
    /// Create a solver and discretize the horizon starting at `t = 0`.
    ///
    /// # Arguments
    /// * `robot` - Robot model queried by every stage
    /// * `ocp` - Cost and constraints; the barrier parameter and
    ///   fraction-to-boundary rule are taken from `config`
    /// * `contact_sequence` - Contact phases and events over the horizon
    /// * `config` - Solver configuration
    pub fn new(
        robot: R,
        mut ocp: OcpDefinition,
        contact_sequence: ContactSequence,
        config: SolverConfig,
    ) -> SolverResult<Self> {
        config.validate()?;
        if contact_sequence.max_num_contacts() != robot.max_num_contacts() {
            return Err(CoreError::ContactCountMismatch {
                expected: robot.max_num_contacts(),
                got: contact_sequence.max_num_contacts(),
            }
            .into());
        }
        ocp.cost.validate(&robot)?;
        ocp.constraints.validate(&robot)?;
        {
            let constraints = Arc::make_mut(&mut ocp.constraints);
            constraints.set_barrier(config.barrier.initial)?;
            constraints.set_fraction_to_boundary_rule(config.barrier.fraction_to_boundary_rule)?;
        }

        let time_discretization = TimeDiscretization::with_tolerance(
            config.horizon.horizon_time,
            config.horizon.num_stages,
            config.horizon.event_tolerance,
        )?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .build()?;
        let nv = robot.dimv();

        let mut solver = Self {
            recursion: RiccatiRecursion::new(config.regularization.clone()),
            line_search: LineSearch::new(config.line_search.clone()),
            robot,
            ocp,
            config,
            contact_sequence,
            time_discretization,
            needs_discretization: true,
            pool,
            stages: Vec::new(),
            terminal: TerminalOcp::new(),
            solutions: Vec::new(),
            directions: Vec::new(),
            kkt_matrices: Vec::new(),
            kkt_residuals: Vec::new(),
            factorizations: Vec::new(),
            policies: Vec::new(),
            dx0: DVector::zeros(2 * nv),
            performance: PerformanceIndex::default(),
        };
        solver.discretize(0.0);
        Ok(solver)
    }

    /// Rebuild the grid for the horizon starting at `t`.
    ///
    /// Every new grid point is warm-started from the previous solution at
    /// the nearest time, preferring a grid point of the same kind, and its
    /// slack and dual variables are re-initialized.
    pub fn discretize(&mut self, t: f64) {
        let old_grid = self.time_discretization.grid().to_vec();
        let old_solutions = std::mem::take(&mut self.solutions);
        self.time_discretization.discretize(&self.contact_sequence, t);

        let robot = &self.robot;
        let constraints = self.ocp.constraints.as_ref();
        let grid = self.time_discretization.grid();
        let n = grid.len() - 1;
        let nv = robot.dimv();

        let mut stages = Vec::with_capacity(n);
        let mut solutions = Vec::with_capacity(n + 1);
        let mut layouts = Vec::with_capacity(n + 1);
        let mut policies = Vec::with_capacity(n);
        for (i, info) in grid.iter().enumerate() {
            let is_impulse = info.grid_type == GridType::Impulse;
            let mut s = nearest_solution(&old_grid, &old_solutions, info, is_impulse)
                .cloned()
                .unwrap_or_else(|| SplitSolution::new(robot));
            if i == n {
                layouts.push(TerminalOcp::layout(robot));
                solutions.push(s);
                continue;
            }
            let (status, kind) = stage_status(&self.contact_sequence, info);
            s.set_contact_status(status);
            let mut stage = SplitOcp::new(robot, constraints, status, kind);
            stage.init_constraints(robot, constraints, &s);
            layouts.push(*stage.layout());
            policies.push(match kind {
                StageKind::Regular => LqrPolicy::new(nv, robot.dimu()),
                StageKind::Impulse => LqrPolicy::new(nv, 0),
            });
            stages.push(stage);
            solutions.push(s);
        }

        self.directions = layouts.iter().map(|&l| SplitDirection::new(l)).collect();
        self.kkt_matrices = layouts.iter().map(|&l| SplitKktMatrix::new(l)).collect();
        self.kkt_residuals = layouts.iter().map(|&l| SplitKktResidual::new(l)).collect();
        self.factorizations = (0..=n).map(|_| SplitRiccatiFactorization::new(nv)).collect();
        self.policies = policies;
        self.stages = stages;
        self.solutions = solutions;
        self.needs_discretization = false;

        debug!(
            t,
            grid_points = n + 1,
            impulse_stages = self.time_discretization.num_impulse_stages(),
            lift_stages = self.time_discretization.num_lift_stages(),
            "discretized horizon"
        );
    }

    /// Set `q` and `v` at every grid point and re-initialize the slacks.
    pub fn set_initial_guess(&mut self, q: &DVector<f64>, v: &DVector<f64>) -> SolverResult<()> {
        self.check_state(q, v)?;
        for s in &mut self.solutions {
            s.q.copy_from(q);
            s.v.copy_from(v);
        }
        self.init_constraints();
        Ok(())
    }

    /// Set the control input at every regular stage.
    pub fn set_control_guess(&mut self, u: &DVector<f64>) -> SolverResult<()> {
        if u.len() != self.robot.dimu() {
            return Err(SolverError::InvalidConfig(format!(
                "control guess has dimension {}, expected {}",
                u.len(),
                self.robot.dimu()
            )));
        }
        for (stage, s) in self.stages.iter().zip(self.solutions.iter_mut()) {
            if !stage.is_impulse() {
                s.u.copy_from(u);
            }
        }
        self.init_constraints();
        Ok(())
    }

    /// Set the force of every active contact at every regular stage;
    /// `forces[i]` belongs to contact `i`.
    pub fn set_contact_force_guess(&mut self, forces: &[Vector3<f64>]) -> SolverResult<()> {
        if forces.len() != self.robot.max_num_contacts() {
            return Err(CoreError::ContactCountMismatch {
                expected: self.robot.max_num_contacts(),
                got: forces.len(),
            }
            .into());
        }
        for (stage, s) in self.stages.iter().zip(self.solutions.iter_mut()) {
            if stage.is_impulse() {
                continue;
            }
            for (k, i) in stage.contact_status().active_contacts().enumerate() {
                s.f.fixed_rows_mut::<3>(3 * k).copy_from(&forces[i]);
            }
        }
        self.init_constraints();
        Ok(())
    }

    /// Replace the solution at grid point `i`. Its contact stack must match
    /// the contact status of the stage.
    pub fn set_solution(&mut self, i: usize, s: SplitSolution) -> SolverResult<()> {
        let len = self.solutions.len();
        if i >= len {
            return Err(CoreError::IndexOutOfRange {
                kind: "grid point",
                index: i,
                len,
            }
            .into());
        }
        if let Some(stage) = self.stages.get_mut(i) {
            s.check_contact_dimension(i, stage.contact_status())?;
            stage.init_constraints(&self.robot, &self.ocp.constraints, &s);
        }
        self.solutions[i] = s;
        Ok(())
    }

    /// Initialize slack and dual variables of every stage from the current
    /// solution.
    pub fn init_constraints(&mut self) {
        let Self {
            robot,
            ocp,
            pool,
            stages,
            solutions,
            ..
        } = self;
        let robot: &R = robot;
        let constraints = ocp.constraints.as_ref();
        pool.install(|| {
            stages
                .par_iter_mut()
                .zip(solutions.par_iter())
                .for_each(|(stage, s)| stage.init_constraints(robot, constraints, s));
        });
    }

    /// Run Newton iterations from the measured state `(q, v)` at time `t`
    /// until convergence or `max_iterations`.
    ///
    /// # Arguments
    /// * `t` - Start of the horizon [s]
    /// * `q`, `v` - Measured configuration and velocity
    /// * `init_solver` - Re-initialize slack and dual variables first
    ///
    /// # Returns
    /// Statistics of the solve. Numerical failures (an indefinite control
    /// Hessian, singular contact dynamics) are reported through the status
    /// and leave the last accepted iterate in place; `Err` is reserved for
    /// invalid inputs.
    pub fn solve(
        &mut self,
        t: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
        init_solver: bool,
    ) -> SolverResult<SolveStatistics> {
        self.run(t, q, v, init_solver, self.config.max_iterations)
    }

    /// Run at most `max_iterations` Newton iterations warm-started from the
    /// current solution.
    pub fn update_solution(
        &mut self,
        t: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
        max_iterations: usize,
    ) -> SolverResult<SolveStatistics> {
        self.run(t, q, v, false, max_iterations)
    }

    /// KKT error of the current solution for the horizon starting at `t`,
    /// without taking a step. Fails with
    /// [`SolverError::SingularContactDynamics`] when a stage cannot be
    /// condensed.
    pub fn kkt_error(&mut self, t: f64, q: &DVector<f64>, v: &DVector<f64>) -> SolverResult<f64> {
        self.check_state(q, v)?;
        self.prepare(t);
        self.eval_kkt(q, v)
    }

    pub fn robot(&self) -> &R {
        &self.robot
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn ocp(&self) -> &OcpDefinition {
        &self.ocp
    }

    /// Current barrier parameter.
    pub fn barrier(&self) -> f64 {
        self.ocp.constraints.barrier()
    }

    pub fn solution(&self, i: usize) -> &SplitSolution {
        &self.solutions[i]
    }

    pub fn solutions(&self) -> &[SplitSolution] {
        &self.solutions
    }

    /// Feedback policies of the non-terminal grid points.
    pub fn lqr_policies(&self) -> &[LqrPolicy] {
        &self.policies
    }

    pub fn stages(&self) -> &[SplitOcp] {
        &self.stages
    }

    /// Performance index of the last evaluation, all stages summed.
    pub fn performance_index(&self) -> &PerformanceIndex {
        &self.performance
    }

    pub fn time_discretization(&self) -> &TimeDiscretization {
        &self.time_discretization
    }

    pub fn contact_sequence(&self) -> &ContactSequence {
        &self.contact_sequence
    }

    /// Mutable access to the contact sequence; the grid is rebuilt before
    /// the next evaluation.
    pub fn contact_sequence_mut(&mut self) -> &mut ContactSequence {
        self.needs_discretization = true;
        &mut self.contact_sequence
    }

    /// Snapshot of the current solution and policies.
    pub fn trajectory(&self, generated_at: f64, is_valid: bool) -> PlannedTrajectory {
        PlannedTrajectory::from_solution(
            self.time_discretization.grid(),
            &self.solutions,
            &self.policies,
            generated_at,
            is_valid,
        )
    }

    fn check_state(&self, q: &DVector<f64>, v: &DVector<f64>) -> SolverResult<()> {
        if q.len() != self.robot.dimq() {
            return Err(SolverError::InvalidStateDimension {
                expected: self.robot.dimq(),
                got: q.len(),
            });
        }
        if v.len() != self.robot.dimv() {
            return Err(SolverError::InvalidStateDimension {
                expected: self.robot.dimv(),
                got: v.len(),
            });
        }
        Ok(())
    }

    /// Rediscretize when the contact sequence changed or the horizon moved.
    /// Returns whether the grid was rebuilt.
    fn prepare(&mut self, t: f64) -> bool {
        let t0 = self.time_discretization.grid().first().map(|g| g.t0);
        let moved = t0.map_or(true, |t0| (t - t0).abs() > self.time_discretization.tolerance());
        if self.needs_discretization || moved {
            self.discretize(t);
            return true;
        }
        false
    }

    fn run(
        &mut self,
        t: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
        init_solver: bool,
        max_iterations: usize,
    ) -> SolverResult<SolveStatistics> {
        self.check_state(q, v)?;
        let start = Instant::now();
        if !self.prepare(t) && init_solver {
            self.init_constraints();
        }
        self.line_search.clear_filter();

        let mut stats = SolveStatistics::default();
        let mut status = None;
        for iteration in 0..max_iterations {
            let Some(kkt_error) = self.eval_kkt_checked(q, v)? else {
                status = Some(SolverStatus::SingularContactDynamics);
                break;
            };
            stats.kkt_errors.push(kkt_error);
            if kkt_error < self.config.kkt_tolerance {
                status = Some(SolverStatus::Converged);
                break;
            }
            if let Err(err) = self.compute_direction() {
                warn!(
                    stage = err.stage,
                    regularization = err.regularization,
                    "Riccati factorization failed, aborting solve"
                );
                status = Some(SolverStatus::FactorizationFailed);
                break;
            }
            let (primal_step, dual_step) = self.step_sizes(q, v);
            self.update(primal_step, dual_step);
            stats.iterations = iteration + 1;
            stats.primal_step_size = primal_step;
            stats.dual_step_size = dual_step;
            debug!(
                iteration,
                kkt_error,
                primal_step,
                dual_step,
                barrier = self.barrier(),
                "Newton iteration"
            );
            self.anneal_barrier(kkt_error)?;
        }

        let status = match status {
            Some(status) => status,
            None => match self.eval_kkt_checked(q, v)? {
                None => SolverStatus::SingularContactDynamics,
                Some(kkt_error) => {
                    stats.kkt_errors.push(kkt_error);
                    if kkt_error < self.config.kkt_tolerance {
                        SolverStatus::Converged
                    } else {
                        warn!(
                            iterations = stats.iterations,
                            kkt_error, "iteration limit reached before convergence"
                        );
                        SolverStatus::MaxIterations
                    }
                }
            },
        };

        stats.status = status;
        stats.kkt_error = stats.kkt_errors.last().copied().unwrap_or(f64::NAN);
        stats.cost = self.performance.cost;
        stats.barrier = self.barrier();
        stats.solve_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        if status == SolverStatus::Converged {
            info!(
                iterations = stats.iterations,
                kkt_error = stats.kkt_error,
                solve_time_ms = stats.solve_time_ms,
                "solver converged"
            );
        }
        Ok(stats)
    }

    /// [`Self::eval_kkt`] with singular contact dynamics mapped to `None`.
    fn eval_kkt_checked(&mut self, q: &DVector<f64>, v: &DVector<f64>) -> SolverResult<Option<f64>> {
        match self.eval_kkt(q, v) {
            Ok(kkt_error) => Ok(Some(kkt_error)),
            Err(SolverError::SingularContactDynamics { stage }) => {
                warn!(stage, "contact dynamics are singular, aborting solve");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Linearize and condense every stage; returns the KKT error.
    fn eval_kkt(&mut self, q: &DVector<f64>, v: &DVector<f64>) -> SolverResult<f64> {
        let Self {
            robot,
            ocp,
            config,
            time_discretization,
            pool,
            stages,
            terminal,
            solutions,
            kkt_matrices,
            kkt_residuals,
            dx0,
            performance,
            ..
        } = self;
        let robot: &R = robot;
        let cost = ocp.cost.as_ref();
        let constraints = ocp.constraints.as_ref();
        let grid = time_discretization.grid();
        let tau = config.baumgarte_time_constant;
        let solutions: &[SplitSolution] = solutions;
        let n = stages.len();
        let (matrices, terminal_matrix) = kkt_matrices.split_at_mut(n);
        let (residuals, terminal_residual) = kkt_residuals.split_at_mut(n);

        pool.install(|| {
            stages
                .par_iter_mut()
                .zip(matrices.par_iter_mut())
                .zip(residuals.par_iter_mut())
                .enumerate()
                .try_for_each(|(i, ((stage, matrix), residual))| {
                    stage.eval_kkt(
                        robot,
                        cost,
                        constraints,
                        i,
                        &grid[i],
                        tau,
                        &solutions[i],
                        &solutions[i + 1],
                        matrix,
                        residual,
                    )
                })
        })?;
        terminal.eval_kkt(
            robot,
            cost,
            &grid[n],
            &solutions[n],
            &mut terminal_matrix[0],
            &mut terminal_residual[0],
        );

        *dx0 = initial_state_direction(robot, q, v, &solutions[0]);
        let mut total: PerformanceIndex = stages.iter().map(SplitOcp::performance_index).sum();
        total += *terminal.performance_index();
        total.primal_feasibility += l1_norm(dx0);
        total.kkt_error += dx0.norm_squared();
        *performance = total;
        Ok(total.kkt_error.sqrt())
    }

    /// Riccati sweeps, costate directions and per-stage expansion.
    fn compute_direction(&mut self) -> Result<(), FactorizationError> {
        let Self {
            ocp,
            pool,
            recursion,
            stages,
            directions,
            kkt_matrices,
            kkt_residuals,
            factorizations,
            policies,
            dx0,
            ..
        } = self;
        let is_impulse: Vec<bool> = stages.iter().map(SplitOcp::is_impulse).collect();
        recursion.backward(&is_impulse, kkt_matrices, kkt_residuals, policies, factorizations)?;
        recursion.forward(kkt_matrices, kkt_residuals, policies, directions, dx0);
        RiccatiRecursion::costate_directions(factorizations, directions);

        let dlambda_next: Vec<DVector<f64>> =
            directions.iter().skip(1).map(SplitDirection::dlambda).collect();
        let constraints = ocp.constraints.as_ref();
        pool.install(|| {
            stages
                .par_iter_mut()
                .zip(directions.par_iter_mut())
                .zip(dlambda_next.par_iter())
                .for_each(|((stage, d), dlambda)| {
                    stage.expand_primal(constraints, d);
                    stage.expand_dual(dlambda, d);
                });
        });
        Ok(())
    }

    /// Fraction-to-boundary step sizes, the primal one shortened by the
    /// line search when enabled.
    fn step_sizes(&mut self, q: &DVector<f64>, v: &DVector<f64>) -> (f64, f64) {
        let constraints = self.ocp.constraints.as_ref();
        let stages = &self.stages;
        let (max_primal, max_dual) = self.pool.install(|| {
            let primal = stages
                .par_iter()
                .map(|stage| stage.max_primal_step_size(constraints))
                .reduce(|| 1.0, f64::min);
            let dual = stages
                .par_iter()
                .map(|stage| stage.max_dual_step_size(constraints))
                .reduce(|| 1.0, f64::min);
            (primal, dual)
        });
        if !self.config.line_search.enabled {
            return (max_primal, max_dual);
        }
        (self.line_search_step(q, v, max_primal), max_dual)
    }

    fn line_search_step(&mut self, q: &DVector<f64>, v: &DVector<f64>, max_step: f64) -> f64 {
        let Self {
            robot,
            ocp,
            config,
            time_discretization,
            pool,
            line_search,
            stages,
            terminal,
            solutions,
            directions,
            performance,
            ..
        } = self;
        let robot: &R = robot;
        let cost = ocp.cost.as_ref();
        let constraints = ocp.constraints.as_ref();
        let grid = time_discretization.grid();
        let tau = config.baumgarte_time_constant;
        let n = stages.len();
        let stages: &[SplitOcp] = stages;
        let solutions: &[SplitSolution] = solutions;
        let directions: &[SplitDirection] = directions;

        let current = (performance.total_cost(), performance.primal_feasibility);
        let directional_derivative = pool.install(|| {
            stages
                .par_iter()
                .zip(directions.par_iter())
                .map(|(stage, d)| stage.directional_derivative(constraints, d))
                .sum::<f64>()
        }) + terminal.directional_derivative(&directions[n]);
        let multiplier_linf = solutions
            .iter()
            .map(SplitSolution::lagrange_multiplier_linf_norm)
            .fold(0.0, f64::max);

        let eval_trial = |step: f64| {
            pool.install(|| {
                let trial: Vec<SplitSolution> = solutions
                    .par_iter()
                    .zip(directions.par_iter())
                    .enumerate()
                    .map(|(i, (s, d))| {
                        let mut s = s.clone();
                        let is_impulse = stages.get(i).is_some_and(SplitOcp::is_impulse);
                        s.integrate(robot, step, d, is_impulse);
                        s
                    })
                    .collect();
                let (stage_cost, violation) = stages
                    .par_iter()
                    .enumerate()
                    .map(|(i, stage)| {
                        stage.eval_trial(
                            robot,
                            cost,
                            constraints,
                            &grid[i],
                            tau,
                            &trial[i],
                            &trial[i + 1],
                            step,
                        )
                    })
                    .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));
                let (terminal_cost, _) = terminal.eval_trial(robot, cost, &grid[n], &trial[n]);
                let initial = l1_norm(&initial_state_direction(robot, q, v, &trial[0]));
                (stage_cost + terminal_cost, violation + initial)
            })
        };
        line_search.compute_step_size(
            current,
            directional_derivative,
            multiplier_linf,
            max_step,
            eval_trial,
        )
    }

    fn update(&mut self, primal_step: f64, dual_step: f64) {
        let Self {
            robot,
            ocp,
            pool,
            stages,
            solutions,
            directions,
            ..
        } = self;
        let robot: &R = robot;
        let constraints = ocp.constraints.as_ref();
        let n = stages.len();
        let (stage_solutions, terminal_solution) = solutions.split_at_mut(n);
        pool.install(|| {
            stages
                .par_iter_mut()
                .zip(stage_solutions.par_iter_mut())
                .zip(directions.par_iter())
                .for_each(|((stage, s), d)| {
                    stage.update_primal(robot, constraints, primal_step, d, s);
                    stage.update_dual(constraints, dual_step);
                });
        });
        terminal_solution[0].integrate(robot, primal_step, &directions[n], false);
    }

    /// Decrease the barrier once the current barrier problem is solved
    /// accurately enough.
    fn anneal_barrier(&mut self, kkt_error: f64) -> SolverResult<()> {
        let barrier = self.barrier();
        if kkt_error > self.config.barrier.kkt_tolerance || barrier <= self.config.barrier.min {
            return Ok(());
        }
        let next = self.config.barrier.decreased(barrier);
        if next < barrier {
            Arc::make_mut(&mut self.ocp.constraints).set_barrier(next)?;
            self.line_search.clear_filter();
            info!(from = barrier, to = next, "barrier parameter decreased");
        }
        Ok(())
    }
}

/// Contact status and kind of the stage at `info`: the phase status for a
/// regular stage, the newly made contacts for an impulse stage.
fn stage_status<'a>(
    contact_sequence: &'a ContactSequence,
    info: &GridInfo,
) -> (&'a ContactStatus, StageKind) {
    match (info.grid_type, info.impulse_index) {
        (GridType::Impulse, Some(index)) => (
            contact_sequence.impulse_status(index).as_contact_status(),
            StageKind::Impulse,
        ),
        _ => (contact_sequence.contact_status(info.phase), StageKind::Regular),
    }
}

/// Solution at the old grid point closest in time to `info`.
fn nearest_solution<'a>(
    grid: &[GridInfo],
    solutions: &'a [SplitSolution],
    info: &GridInfo,
    is_impulse: bool,
) -> Option<&'a SplitSolution> {
    let nearest = |same_kind: bool| {
        grid.iter()
            .zip(solutions)
            .filter(|(g, _)| !same_kind || (g.grid_type == GridType::Impulse) == is_impulse)
            .min_by(|(a, _), (b, _)| (a.t - info.t).abs().total_cmp(&(b.t - info.t).abs()))
            .map(|(_, s)| s)
    };
    nearest(true).or_else(|| nearest(false))
}
