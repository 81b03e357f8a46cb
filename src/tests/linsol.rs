use float_cmp::assert_approx_eq;

use super::{from_dense, toy_problem};
use crate::math::{norm_inf, sym_upper_mat_vec};
use crate::{
    LdlFactory, LdlPlugin, LinearSolverPlugin, PluginFactory, Point, Problem, RefinedLdlPlugin,
    RegularizationParams, SolverError,
};

#[test]
fn initialization_factorizes_once() {
    let problem = toy_problem();
    let point = Point::initial(&problem);
    let plugin = LdlPlugin::new(&problem, &point, &RegularizationParams::default()).unwrap();

    let counters = plugin.counters();
    assert_eq!(counters.factorizations, 1);
    assert_eq!(counters.solves, 0);
    assert_eq!(counters.retries, 0);
    assert_eq!(plugin.regularization(), (1e-4, 1e-4));
}

#[test]
fn solution_satisfies_regularized_system() {
    let problem = toy_problem();
    let point = Point::initial(&problem);
    let mut plugin = LdlPlugin::new(&problem, &point, &RegularizationParams::default()).unwrap();

    let b = vec![1.0, 2.0, 3.0, 4.0, 5.0];
    let mut x = b.clone();
    plugin.solve_in_place(&mut x).unwrap();

    let mut kx = vec![0.0; 5];
    sym_upper_mat_vec(plugin.system().unwrap().matrix(), &x, &mut kx);
    for (r, b) in kx.iter().zip(&b) {
        assert_approx_eq!(f64, *r, *b, epsilon = 1e-10);
    }
    assert_eq!(plugin.counters().solves, 1);
}

#[test]
fn refresh_lowers_regularization_to_the_floor() {
    let problem = toy_problem();
    let point = Point::initial(&problem);
    let params = RegularizationParams::default();
    let mut plugin = LdlPlugin::new(&problem, &point, &params).unwrap();

    for _ in 0..20 {
        plugin.refresh(&problem, &point).unwrap();
        let (rho, delta) = plugin.regularization();
        assert!(rho > 0.0 && delta > 0.0);
    }
    let (rho_min, delta_min) = params.floors::<f64>();
    assert_eq!(plugin.regularization(), (rho_min, delta_min));
    assert_eq!(plugin.counters().factorizations, 21);
}

#[test]
fn wrong_length_rhs_is_rejected() {
    let problem = toy_problem();
    let point = Point::initial(&problem);
    let mut plugin = LdlPlugin::new(&problem, &point, &RegularizationParams::default()).unwrap();

    let mut rhs = vec![0.0; 4];
    assert!(matches!(
        plugin.solve_in_place(&mut rhs),
        Err(SolverError::DimensionMismatch { .. })
    ));
}

#[test]
fn non_finite_solution_is_reported() {
    let problem = toy_problem();
    let point = Point::initial(&problem);
    let mut plugin = LdlPlugin::new(&problem, &point, &RegularizationParams::default()).unwrap();

    let mut rhs = vec![f64::NAN, 0.0, 0.0, 0.0, 0.0];
    assert_eq!(
        plugin.solve_in_place(&mut rhs),
        Err(SolverError::NonFiniteSolution)
    );
}

#[test]
fn exhausted_retries_fail() {
    // One attempt with a regularization far too small to hide the
    // indefinite Hessian.
    let h_mat = from_dense(&[vec![1.0, 2.0], vec![2.0, 1.0]]);
    let problem = Problem::new(
        &h_mat,
        vec![0.0; 2],
        0.0,
        &sprs::CsMat::zero((0, 2)),
        vec![],
        vec![f64::NEG_INFINITY; 2],
        vec![f64::INFINITY; 2],
    );
    let point = Point::initial(&problem);
    let params = RegularizationParams {
        max_attempts: 1,
        ..Default::default()
    };

    let err = LdlPlugin::new(&problem, &point, &params).err().unwrap();
    assert_eq!(
        err,
        SolverError::Factorization {
            attempts: 1,
            rho: params.rho0,
            delta: params.delta0
        }
    );
}

#[test]
fn failure_reports_the_last_tried_regularization() {
    let h_mat = from_dense(&[vec![1.0, 2.0], vec![2.0, 1.0]]);
    let problem = Problem::new(
        &h_mat,
        vec![0.0; 2],
        0.0,
        &sprs::CsMat::zero((0, 2)),
        vec![],
        vec![f64::NEG_INFINITY; 2],
        vec![f64::INFINITY; 2],
    );
    let point = Point::initial(&problem);
    let params = RegularizationParams {
        rho0: 0.01,
        delta0: 0.01,
        increase: 10.0,
        max_attempts: 2,
        ..Default::default()
    };

    // Tries rho = 0.01 and rho = 0.1. -H - rho I stays indefinite below rho = 1.
    match LdlPlugin::new(&problem, &point, &params).err().unwrap() {
        SolverError::Factorization {
            attempts,
            rho,
            delta,
        } => {
            assert_eq!(attempts, 2);
            assert_approx_eq!(f64, rho, 0.1);
            assert_approx_eq!(f64, delta, 0.1);
        }
        err => panic!("unexpected error: {}", err),
    }
}

#[test]
fn retries_grow_regularization() {
    let h_mat = from_dense(&[vec![1.0, 2.0], vec![2.0, 1.0]]);
    let problem = Problem::new(
        &h_mat,
        vec![0.0; 2],
        0.0,
        &sprs::CsMat::zero((0, 2)),
        vec![],
        vec![f64::NEG_INFINITY; 2],
        vec![f64::INFINITY; 2],
    );
    let point = Point::initial(&problem);
    let params = RegularizationParams {
        rho0: 0.5,
        increase: 10.0,
        max_attempts: 3,
        ..Default::default()
    };

    // -H - rho I is negative definite once rho > 1.
    let plugin = LdlPlugin::new(&problem, &point, &params).unwrap();
    assert_eq!(plugin.counters().retries, 1);
    assert_eq!(plugin.counters().factorizations, 2);
    assert_approx_eq!(f64, plugin.regularization().0, 5.0);
}

#[test]
fn refinement_reduces_the_unregularized_residual() {
    let problem = toy_problem();
    let point = Point::initial(&problem);
    let params = RegularizationParams {
        rho0: 1e-2,
        delta0: 1e-2,
        ..Default::default()
    };
    let b = vec![1.0, -1.0, 2.0, 0.5, 3.0];

    let residual = |x: &[f64], plugin: &dyn LinearSolverPlugin<f64>| {
        let mut r = vec![0.0; 5];
        plugin.system().unwrap().mul_unregularized(x, &mut r);
        let diff: Vec<f64> = r.iter().zip(&b).map(|(r, b)| r - b).collect();
        norm_inf(&diff)
    };

    let mut plain = LdlPlugin::new(&problem, &point, &params).unwrap();
    let mut x_plain = b.clone();
    plain.solve_in_place(&mut x_plain).unwrap();

    let mut refined = RefinedLdlPlugin::new(&problem, &point, &params, 5, 1e-14).unwrap();
    let mut x_refined = b.clone();
    refined.solve_in_place(&mut x_refined).unwrap();

    assert!(residual(&x_refined, &refined) < 1e-3 * residual(&x_plain, &plain));
    assert!(refined.counters().refinement_steps > 0);
    assert_eq!(refined.counters().solves, 1);
}

#[test]
fn factory_creates_both_precisions() {
    let problem = toy_problem();
    let single = problem.cast::<f32>();
    let params = RegularizationParams::default();

    let plugin64 = LdlFactory
        .double(&problem, &Point::initial(&problem), &params)
        .unwrap();
    let plugin32 = LdlFactory
        .single(&single, &Point::initial(&single), &params)
        .unwrap();

    assert_eq!(plugin64.system().unwrap().dim(), 5);
    assert_eq!(plugin32.system().unwrap().dim(), 5);
    assert_eq!(LdlFactory.name(), "ldl");
}
