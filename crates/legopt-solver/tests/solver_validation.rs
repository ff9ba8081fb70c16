//! Validation of the full Newton iteration
//!
//! End-to-end solves on the reference robots: convergence on a fixed-base
//! manipulator, exactness of one step on a linear-quadratic hopping
//! problem, interior-point positivity under active limits and friction
//! cones, and both line-search methods.

use approx::assert_relative_eq;
use nalgebra::{DVector, Vector3};

use legopt_core::robot::{Manipulator, PointMass};
use legopt_core::{ContactSequence, GridType, RobotModel};
use legopt_solver::config::{LineSearchMethod, SolverConfig};
use legopt_solver::constraints::{
    FrictionCone, ImpulseFrictionCone, JointLimit, JointLimitSide, JointLimitTarget,
};
use legopt_solver::cost::{ConfigurationSpaceCost, ContactForceCost, CostFunction};
use legopt_solver::{OcpSolver, SolverBuilder, SolverStatus};

fn manipulator_cost(robot: &Manipulator) -> CostFunction {
    let mut tracking = ConfigurationSpaceCost::new(robot);
    tracking.set_q_ref(DVector::from_vec(vec![1.0, 0.0])).unwrap();
    tracking.set_q_weight(DVector::from_element(2, 10.0)).unwrap();
    tracking.set_v_weight(DVector::from_element(2, 1.0)).unwrap();
    tracking.set_a_weight(DVector::from_element(2, 0.001)).unwrap();
    tracking.set_u_weight(DVector::from_element(2, 0.01)).unwrap();
    tracking.set_qf_weight(DVector::from_element(2, 10.0)).unwrap();
    tracking.set_vf_weight(DVector::from_element(2, 1.0)).unwrap();
    let mut cost = CostFunction::new();
    cost.push(tracking);
    cost
}

fn manipulator_config() -> SolverConfig {
    let mut config = SolverConfig::default();
    config.horizon.horizon_time = 1.0;
    config.horizon.num_stages = 10;
    config.kkt_tolerance = 1e-8;
    config.max_iterations = 20;
    config
}

fn initial_state() -> (DVector<f64>, DVector<f64>) {
    (DVector::from_vec(vec![0.5, -0.3]), DVector::zeros(2))
}

/// Stand on the origin, lift off at 0.35 s and land again at 0.62 s.
fn hop_sequence(robot: &PointMass) -> ContactSequence {
    let mut standing = robot.create_contact_status();
    standing.activate(0).unwrap();
    let mut sequence = ContactSequence::new(1, 2);
    sequence.init(standing.clone()).unwrap();
    sequence
        .push_back_status(robot.create_contact_status(), 0.35, false)
        .unwrap();
    sequence.push_back_status(standing, 0.62, false).unwrap();
    sequence
}

fn hop_cost(robot: &PointMass) -> CostFunction {
    let mut tracking = ConfigurationSpaceCost::new(robot);
    tracking.set_q_ref(DVector::from_vec(vec![0.2, 0.0, 0.0])).unwrap();
    tracking.set_q_weight(DVector::from_element(3, 1.0)).unwrap();
    tracking.set_v_weight(DVector::from_element(3, 0.1)).unwrap();
    tracking.set_a_weight(DVector::from_element(3, 0.01)).unwrap();
    tracking.set_u_weight(DVector::from_element(3, 0.01)).unwrap();
    tracking.set_qf_weight(DVector::from_element(3, 1.0)).unwrap();
    tracking.set_dvi_weight(DVector::from_element(3, 0.01)).unwrap();

    let mut forces = ContactForceCost::new(robot);
    let weight = robot.mass() * 1e-3;
    forces.set_f_weight(vec![Vector3::from_element(weight)]).unwrap();
    forces
        .set_f_ref(vec![Vector3::new(0.0, 0.0, robot.mass() * robot.gravity())])
        .unwrap();
    forces.set_fi_weight(vec![Vector3::from_element(weight)]).unwrap();

    let mut cost = CostFunction::new();
    cost.push(tracking);
    cost.push(forces);
    cost
}

fn hop_solver(with_friction_cones: bool) -> OcpSolver<PointMass> {
    let robot = PointMass::new(1.5).unwrap();
    let sequence = hop_sequence(&robot);
    let cost = hop_cost(&robot);
    let mut config = SolverConfig::default();
    config.horizon.horizon_time = 1.0;
    config.horizon.num_stages = 10;
    config.kkt_tolerance = 1e-8;

    let support = Vector3::new(0.0, 0.0, robot.mass() * robot.gravity());
    let mut builder = SolverBuilder::new(robot)
        .with_config(config)
        .with_cost(cost)
        .with_contact_sequence(sequence);
    if with_friction_cones {
        builder = builder
            .with_constraint(FrictionCone::new())
            .with_constraint(ImpulseFrictionCone::new());
    }
    let mut solver = builder.build().unwrap();
    solver.set_contact_force_guess(&[support]).unwrap();
    solver
}

fn all_interior_point_data_positive<R: RobotModel>(solver: &OcpSolver<R>) -> bool {
    solver
        .stages()
        .iter()
        .all(|stage| stage.constraints_data().is_positive())
}

mod convergence {
    use super::*;

    #[test]
    fn test_manipulator_converges_within_twenty_iterations() {
        let robot = Manipulator::uniform(2).unwrap();
        let cost = manipulator_cost(&robot);
        let mut solver = SolverBuilder::new(robot)
            .with_config(manipulator_config())
            .with_cost(cost)
            .build()
            .unwrap();
        let (q, v) = initial_state();

        let stats = solver.solve(0.0, &q, &v, true).unwrap();
        assert_eq!(stats.status, SolverStatus::Converged);
        assert!(stats.iterations <= 20);
        assert!(stats.kkt_error < 1e-8);
        assert_eq!(stats.kkt_errors.len(), stats.iterations + 1);

        // initial state is enforced
        assert_relative_eq!(solver.solution(0).q, q, epsilon = 1e-8);
        assert_relative_eq!(solver.solution(0).v, v, epsilon = 1e-8);

        // moved towards the reference
        let terminal = solver.solutions().last().unwrap();
        assert!((terminal.q[0] - 1.0).abs() < (q[0] - 1.0).abs());
    }

    #[test]
    fn test_kkt_error_without_stepping() {
        let robot = Manipulator::uniform(2).unwrap();
        let cost = manipulator_cost(&robot);
        let mut solver = SolverBuilder::new(robot)
            .with_config(manipulator_config())
            .with_cost(cost)
            .build()
            .unwrap();
        let (q, v) = initial_state();

        let before = solver.kkt_error(0.0, &q, &v).unwrap();
        assert!(before > 1e-3);
        let stats = solver.solve(0.0, &q, &v, true).unwrap();
        let after = solver.kkt_error(0.0, &q, &v).unwrap();
        assert_relative_eq!(after, stats.kkt_error, epsilon = 1e-12);
        assert!(after < before);
    }

    #[test]
    fn test_policy_dimensions() {
        let robot = Manipulator::uniform(2).unwrap();
        let cost = manipulator_cost(&robot);
        let mut solver = SolverBuilder::new(robot)
            .with_config(manipulator_config())
            .with_cost(cost)
            .build()
            .unwrap();
        let (q, v) = initial_state();
        solver.solve(0.0, &q, &v, true).unwrap();

        assert_eq!(solver.lqr_policies().len(), 10);
        for policy in solver.lqr_policies() {
            assert_eq!(policy.gain.shape(), (2, 4));
            assert_eq!(policy.feedforward.len(), 2);
        }

        let trajectory = solver.trajectory(0.0, true);
        assert_eq!(trajectory.times.len(), 11);
        assert_relative_eq!(trajectory.times[10], 1.0, epsilon = 1e-12);
    }
}

mod hybrid {
    use super::*;

    #[test]
    fn test_grid_contains_lift_and_impulse() {
        let solver = hop_solver(false);
        let grid = solver.time_discretization().grid();
        assert_eq!(solver.time_discretization().num_lift_stages(), 1);
        assert_eq!(solver.time_discretization().num_impulse_stages(), 1);

        let impulse = grid
            .iter()
            .position(|g| g.grid_type == GridType::Impulse)
            .unwrap();
        assert_relative_eq!(grid[impulse].t, 0.62, epsilon = 1e-12);
        assert!(solver.stages()[impulse].is_impulse());
        assert_eq!(grid[impulse + 1].grid_type, GridType::Aux);
    }

    #[test]
    fn test_linear_quadratic_hop_solves_in_one_step() {
        // point mass dynamics, contact constraints and costs are linear-
        // quadratic, so the condensed Newton step is the exact solution
        let mut solver = hop_solver(false);
        let q = DVector::zeros(3);
        let v = DVector::zeros(3);

        let stats = solver.solve(0.0, &q, &v, true).unwrap();
        assert_eq!(stats.status, SolverStatus::Converged);
        assert_eq!(stats.iterations, 1);
        assert!(stats.kkt_errors[0] > 1.0);

        // contact constraints hold after landing
        let grid = solver.time_discretization().grid();
        let last_stage = solver.stages().len() - 1;
        assert_eq!(grid[last_stage].grid_type, GridType::Intermediate);
        assert_eq!(solver.solution(last_stage).dimf(), 3);
    }

    #[test]
    fn test_hop_with_friction_cones_keeps_positivity() {
        let mut solver = hop_solver(true);
        let q = DVector::zeros(3);
        let v = DVector::zeros(3);
        assert!(all_interior_point_data_positive(&solver));

        let first = solver.kkt_error(0.0, &q, &v).unwrap();
        for _ in 0..15 {
            let stats = solver.update_solution(0.0, &q, &v, 1).unwrap();
            assert_ne!(stats.status, SolverStatus::FactorizationFailed);
            assert!(all_interior_point_data_positive(&solver));
        }
        let last = solver.kkt_error(0.0, &q, &v).unwrap();
        assert!(last < first);

        // normal forces stay inside the cone
        for (stage, s) in solver.stages().iter().zip(solver.solutions()) {
            if stage.contact_status().has_active_contacts() && !stage.is_impulse() {
                assert!(s.f[2] > 0.0);
            }
        }
    }
}

mod fraction_to_boundary {
    use super::*;

    #[test]
    fn test_active_torque_limit() {
        // holding q = 1 needs 2·sin(1) ≈ 1.68 N·m at the first joint
        let robot = Manipulator::uniform(2).unwrap();
        let cost = manipulator_cost(&robot);
        let mut config = manipulator_config();
        config.max_iterations = 100;
        config.kkt_tolerance = 1e-6;
        let mut solver = SolverBuilder::new(robot)
            .with_config(config)
            .with_cost(cost)
            .with_constraint(JointLimit::new(
                JointLimitTarget::Torque,
                JointLimitSide::Upper,
                DVector::from_element(2, 1.0),
            ))
            .with_constraint(JointLimit::new(
                JointLimitTarget::Torque,
                JointLimitSide::Lower,
                DVector::from_element(2, -1.0),
            ))
            .build()
            .unwrap();
        let (q, v) = initial_state();

        for _ in 0..5 {
            solver.update_solution(0.0, &q, &v, 1).unwrap();
            assert!(all_interior_point_data_positive(&solver));
        }
        let stats = solver.solve(0.0, &q, &v, false).unwrap();
        assert_eq!(stats.status, SolverStatus::Converged);
        assert!(all_interior_point_data_positive(&solver));
        for (stage, s) in solver.stages().iter().zip(solver.solutions()) {
            assert!(!stage.is_impulse());
            assert!(s.u.iter().all(|&u| u.abs() <= 1.0 + 1e-6));
        }
    }
}

mod line_search {
    use super::*;

    fn solve_with(method: LineSearchMethod) -> legopt_solver::SolveStatistics {
        let robot = Manipulator::uniform(2).unwrap();
        let cost = manipulator_cost(&robot);
        let mut config = manipulator_config();
        config.line_search.enabled = true;
        config.line_search.method = method;
        config.max_iterations = 50;
        let mut solver = SolverBuilder::new(robot)
            .with_config(config)
            .with_cost(cost)
            .build()
            .unwrap();
        let (q, v) = initial_state();
        solver.solve(0.0, &q, &v, true).unwrap()
    }

    #[test]
    fn test_filter_line_search_converges() {
        let stats = solve_with(LineSearchMethod::Filter);
        assert_eq!(stats.status, SolverStatus::Converged);
        assert!(stats.primal_step_size > 0.0 && stats.primal_step_size <= 1.0);
    }

    #[test]
    fn test_merit_line_search_converges() {
        let stats = solve_with(LineSearchMethod::MeritBacktracking);
        assert_eq!(stats.status, SolverStatus::Converged);
        assert!(stats.primal_step_size > 0.0 && stats.primal_step_size <= 1.0);
    }
}
