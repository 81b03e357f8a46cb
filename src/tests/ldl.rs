use float_cmp::assert_approx_eq;
use sprs::{CsMat, TriMat};

use crate::kkt::assemble;
use crate::ldl::{LdlError, LdlFactorization};
use crate::math::sym_upper_mat_vec;
use crate::{Point, Problem};

/// Upper triangle of
///
/// ```txt
///     [ -4   1   1 ]
///     [  1  -3   0 ]
///     [  1   0   2 ]
/// ```
fn quasi_definite() -> CsMat<f64> {
    let mut tri = TriMat::new((3, 3));
    tri.add_triplet(0, 0, -4.0);
    tri.add_triplet(0, 1, 1.0);
    tri.add_triplet(1, 1, -3.0);
    tri.add_triplet(0, 2, 1.0);
    tri.add_triplet(2, 2, 2.0);
    tri.to_csc()
}

fn assert_solves(mat: &CsMat<f64>, x: &[f64], b: &[f64], epsilon: f64) {
    let mut kx = vec![0.0; b.len()];
    sym_upper_mat_vec(mat, x, &mut kx);
    for (r, b) in kx.iter().zip(b) {
        assert_approx_eq!(f64, *r, *b, epsilon = epsilon);
    }
}

#[test]
fn solves_quasi_definite_system() {
    let mat = quasi_definite();
    let mut ldl = LdlFactorization::symbolic(&mat).unwrap();
    ldl.factor(&mat, 2).unwrap();

    let b = vec![1.0, -2.0, 3.0];
    let mut x = b.clone();
    ldl.solve(&mut x);

    assert_solves(&mat, &x, &b, 1e-12);
    assert_eq!(ldl.dim(), 3);
    // Eliminating the leaves before the hub avoids all fill.
    assert_eq!(ldl.nnz_l(), 2);
}

#[test]
fn refactorizes_with_new_values() {
    let mat = quasi_definite();
    let mut ldl = LdlFactorization::symbolic(&mat).unwrap();
    ldl.factor(&mat, 2).unwrap();

    let scaled = mat.map(|&v| 2.0 * v);
    ldl.factor(&scaled, 2).unwrap();

    let b = vec![2.0, 0.0, 0.0];
    let mut x = b.clone();
    ldl.solve(&mut x);
    assert_solves(&scaled, &x, &b, 1e-12);
}

#[test]
fn detects_wrong_inertia() {
    let mat = quasi_definite();
    let mut ldl = LdlFactorization::symbolic(&mat).unwrap();

    // Row 1 gets a negative pivot whatever the elimination order.
    assert_eq!(
        ldl.factor(&mat, 1),
        Err(LdlError::WrongInertia { index: 1 })
    );
}

#[test]
fn detects_zero_pivot() {
    let mut tri = TriMat::new((2, 2));
    tri.add_triplet(0, 0, 0.0);
    tri.add_triplet(1, 1, 1.0);
    let mat: CsMat<f64> = tri.to_csc();
    let mut ldl = LdlFactorization::symbolic(&mat).unwrap();

    assert_eq!(ldl.factor(&mat, 1), Err(LdlError::BadPivot(0)));
}

#[test]
fn rejects_changed_pattern() {
    let mat = quasi_definite();
    let mut ldl = LdlFactorization::symbolic(&mat).unwrap();

    let mut tri = TriMat::new((3, 3));
    tri.add_triplet(0, 0, -4.0);
    tri.add_triplet(1, 1, -3.0);
    tri.add_triplet(2, 2, 2.0);
    assert!(matches!(
        ldl.factor(&tri.to_csc(), 2),
        Err(LdlError::DimensionMismatch { .. })
    ));
}

#[test]
fn rejects_lower_triangle() {
    let mut tri = TriMat::new((2, 2));
    tri.add_triplet(0, 0, 1.0);
    tri.add_triplet(1, 0, 1.0);
    tri.add_triplet(1, 1, 1.0);
    let mat: CsMat<f64> = tri.to_csc();

    assert_eq!(
        LdlFactorization::symbolic(&mat).unwrap_err(),
        LdlError::NotUpperCsc
    );
    assert_eq!(
        LdlFactorization::<f64>::symbolic(&tri.to_csr()).unwrap_err(),
        LdlError::NotUpperCsc
    );
}

#[test]
fn works_in_single_precision() {
    let mat = quasi_definite().map(|&v| v as f32);
    let mut ldl = LdlFactorization::symbolic(&mat).unwrap();
    ldl.factor(&mat, 2).unwrap();

    let mut x = vec![1.0_f32, 1.0, 1.0];
    ldl.solve(&mut x);
    let mut kx = vec![0.0_f32; 3];
    sym_upper_mat_vec(&mat, &x, &mut kx);
    for r in kx {
        assert_approx_eq!(f32, r, 1.0, epsilon = 1e-5);
    }
}

/// `x_i + x_0 = 1` for every row: `x_0` couples all rows, so the natural
/// order fills the whole multiplier block of `L`.
#[test]
fn ordering_keeps_a_dense_column_from_filling_in() {
    let m = 400;
    let n = m + 1;
    let mut h_tri = TriMat::new((n, n));
    for j in 0..n {
        h_tri.add_triplet(j, j, 1.0);
    }
    let mut a_tri = TriMat::new((m, n));
    for i in 0..m {
        a_tri.add_triplet(i, 0, 1.0);
        a_tri.add_triplet(i, i + 1, 1.0);
    }
    let problem = Problem::new(
        &h_tri.to_csc(),
        vec![0.0; n],
        0.0,
        &a_tri.to_csr(),
        vec![1.0; m],
        vec![f64::NEG_INFINITY; n],
        vec![f64::INFINITY; n],
    );
    let point = Point::initial(&problem);
    let kkt = assemble(&problem, &point, 1e-6, 1e-6).unwrap();
    assert_eq!(kkt.dim(), 801);
    assert_eq!(kkt.matrix().nnz(), 1601);

    let mut ldl = LdlFactorization::symbolic(kkt.matrix()).unwrap();
    assert!(ldl.nnz_l() <= kkt.matrix().nnz(), "nnz(L) = {}", ldl.nnz_l());

    ldl.factor(kkt.matrix(), kkt.nvar()).unwrap();
    let b: Vec<f64> = (0..kkt.dim()).map(|k| 1.0 + (k % 7) as f64).collect();
    let mut x = b.clone();
    ldl.solve(&mut x);
    assert_solves(kkt.matrix(), &x, &b, 1e-8);
}
