use float_cmp::assert_approx_eq;

use super::{from_dense, toy_problem};
use crate::kkt::assemble;
use crate::ldl::{LdlError, LdlFactorization};
use crate::{Point, Problem, SolverError};

#[test]
fn assembles_upper_triangle() {
    let problem = toy_problem();
    let point = Point::initial(&problem);
    let (rho, delta) = (1e-6, 1e-7);

    let kkt = assemble(&problem, &point, rho, delta).unwrap();
    let k = kkt.matrix();

    assert_eq!(kkt.dim(), 5);
    assert!(k.is_csc());
    assert!(k.iter().all(|(_, (i, j))| i <= j));

    // x = 1, s_l = 1 on every variable: D = 1.
    assert_approx_eq!(f64, kkt.diagonal(0), -4.0 - 1.0 - rho);
    assert_approx_eq!(f64, kkt.diagonal(1), -3.0 - 1.0 - rho);
    assert_approx_eq!(f64, kkt.diagonal(2), -5.0 - 1.0 - rho);
    assert_eq!(kkt.diagonal(3), delta);
    assert_eq!(kkt.diagonal(4), delta);

    assert_eq!(k.get(0, 1), Some(&-1.0));
    assert_eq!(k.get(1, 2), Some(&-1.0));
    assert_eq!(k.get(0, 2), None);
    assert_eq!(k.get(0, 3), Some(&1.0));
    assert_eq!(k.get(1, 4), Some(&-1.0));
    assert_eq!(k.get(2, 4), None);
}

#[test]
fn refresh_only_touches_the_diagonal() {
    let problem = toy_problem();
    let mut point = Point::initial(&problem);
    let mut kkt = assemble(&problem, &point, 1e-4, 1e-4).unwrap();
    let pattern = kkt.matrix().indices().to_vec();
    let off_diagonal: Vec<f64> = kkt
        .matrix()
        .iter()
        .filter(|(_, (i, j))| i != j)
        .map(|(&v, _)| v)
        .collect();

    point.x[0] = 0.5;
    point.s_l[0] = 2.0;
    kkt.update_diagonal(&problem, &point, 1e-8, 1e-9).unwrap();

    assert_eq!(kkt.matrix().indices(), &pattern[..]);
    let after: Vec<f64> = kkt
        .matrix()
        .iter()
        .filter(|(_, (i, j))| i != j)
        .map(|(&v, _)| v)
        .collect();
    assert_eq!(after, off_diagonal);
    assert_approx_eq!(f64, kkt.diagonal(0), -4.0 - 4.0 - 1e-8);
    assert_eq!((kkt.rho(), kkt.delta()), (1e-8, 1e-9));
}

#[test]
fn mismatched_jacobian_is_rejected() {
    let problem = toy_problem();
    let wide = from_dense(&[vec![1.0, 1.0, 1.0, 1.0]]);
    let bad = Problem::new(
        &from_dense(&[
            vec![4.0, 1.0, 0.0],
            vec![1.0, 3.0, 1.0],
            vec![0.0, 1.0, 5.0],
        ]),
        problem.cost().to_vec(),
        0.0,
        &wide,
        vec![1.0],
        problem.lower().to_vec(),
        problem.upper().to_vec(),
    );
    let point = Point {
        x: vec![1.0; 3],
        y: vec![0.0],
        s_l: vec![1.0; 3],
        s_u: vec![0.0; 3],
    };

    let err = assemble(&bad, &point, 1e-4, 1e-4).unwrap_err();
    assert_eq!(
        err,
        SolverError::DimensionMismatch {
            what: "jacobian cols",
            expected: 3,
            found: 4
        }
    );
    assert!(matches!(
        bad.check(),
        Err(SolverError::DimensionMismatch { .. })
    ));
}

#[test]
fn mismatched_iterate_is_rejected() {
    let problem = toy_problem();
    let mut point = Point::initial(&problem);
    point.y.push(0.0);

    assert!(matches!(
        assemble(&problem, &point, 1e-4, 1e-4),
        Err(SolverError::DimensionMismatch { what: "y", .. })
    ));
}

/// A rank deficient Hessian with a free variable and a redundant row still
/// gives a quasi-definite system once regularized.
#[test]
fn singular_hessian_is_factorizable() {
    let h_mat = from_dense(&[
        vec![1.0, 1.0, 0.0],
        vec![1.0, 1.0, 0.0],
        vec![0.0, 0.0, 0.0],
    ]);
    let a_mat = from_dense(&[vec![1.0, 1.0, 0.0], vec![2.0, 2.0, 0.0]]);
    let problem = Problem::new(
        &h_mat,
        vec![0.0; 3],
        0.0,
        &a_mat,
        vec![1.0, 2.0],
        vec![f64::NEG_INFINITY; 3],
        vec![f64::INFINITY; 3],
    );
    let point = Point::initial(&problem);

    let kkt = assemble(&problem, &point, 1e-8, 1e-8).unwrap();
    let mut ldl = LdlFactorization::symbolic(kkt.matrix()).unwrap();
    // Succeeds only with three negative and two positive pivots.
    ldl.factor(kkt.matrix(), kkt.nvar()).unwrap();
    assert_eq!(
        ldl.factor(kkt.matrix(), kkt.nvar() - 1),
        Err(LdlError::WrongInertia { index: 2 })
    );
}
