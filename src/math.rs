use sprs::CsMat;

use crate::traits::Real;

/// Computes the dot-product of `a` and `b`.
pub fn dot<T: Real>(a: &[T], b: &[T]) -> T {
    a.iter()
        .zip(b)
        .fold(T::zero(), |acc, (&ai, &bi)| acc + ai * bi)
}

/// Computes the infinity norm: `max(abs(a))`, zero for an empty slice.
pub fn norm_inf<T: Real>(a: &[T]) -> T {
    a.iter().fold(T::zero(), |max, &v| max.max(v.abs()))
}

/// True if every element is neither NaN nor infinite.
pub fn all_finite<T: Real>(a: &[T]) -> bool {
    a.iter().all(|v| v.is_finite())
}

/// `y = A x` for a general sparse matrix in any storage.
pub fn mat_vec<T: Real>(a_mat: &CsMat<T>, x: &[T], y: &mut [T]) {
    y.iter_mut().for_each(|v| *v = T::zero());
    for (&v, (i, j)) in a_mat.iter() {
        y[i] += v * x[j];
    }
}

/// `y = A' x` for a general sparse matrix in any storage.
pub fn mat_t_vec<T: Real>(a_mat: &CsMat<T>, x: &[T], y: &mut [T]) {
    y.iter_mut().for_each(|v| *v = T::zero());
    for (&v, (i, j)) in a_mat.iter() {
        y[j] += v * x[i];
    }
}

/// `y = H x` where only the upper triangle of the symmetric `H` is stored.
pub fn sym_upper_mat_vec<T: Real>(h_mat: &CsMat<T>, x: &[T], y: &mut [T]) {
    y.iter_mut().for_each(|v| *v = T::zero());
    for (&v, (i, j)) in h_mat.iter() {
        y[i] += v * x[j];
        if i != j {
            y[j] += v * x[i];
        }
    }
}
