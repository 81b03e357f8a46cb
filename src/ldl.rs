//! Sparse LDL^T factorization of quasi-definite matrices, backed by faer.
//!
//! [`LdlFactorization::symbolic`] computes an approximate minimum degree
//! ordering of the pattern once, permutes the upper triangle with it and runs
//! faer's simplicial symbolic analysis on the result. Every numeric
//! factorization reuses both.
//!
//! faer factorizes without pivoting. A quasi-definite matrix is stable under
//! any symmetric permutation, with `D` negative on the pivots of the leading
//! block and positive on the trailing one, which is what
//! [`LdlFactorization::factor`] checks.

use std::fmt;

use faer::dyn_stack::{MemBuffer, MemStack, StackReq};
use faer::linalg::cholesky::ldlt::factor::{LdltError, LdltRegularization};
use faer::perm::PermRef;
use faer::sparse::linalg::amd;
use faer::sparse::linalg::cholesky::simplicial::{
    self, SimplicialLdltRef, SymbolicSimplicialCholesky,
};
use faer::sparse::utils::{permute_self_adjoint, permute_self_adjoint_scratch};
use faer::sparse::{FaerError, SparseColMatRef, SymbolicSparseColMatRef};
use faer::{Conj, MatMut, Par, Side};
use sprs::CsMat;
use thiserror::Error;

use crate::traits::Real;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LdlError {
    #[error("matrix must be square, upper triangular and in CSC storage")]
    NotUpperCsc,

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("symbolic analysis failed: {0}")]
    Analysis(#[from] FaerError),

    #[error("zero or non-finite pivot at column {0}")]
    BadPivot(usize),

    #[error("pivot {index} has the wrong sign for a quasi-definite matrix")]
    WrongInertia { index: usize },
}

/// Fill-reducing ordering, symbolic factor and numeric storage.
///
/// Indices in errors refer to rows of the unpermuted matrix.
pub struct LdlFactorization<T> {
    n: usize,
    nnz: usize,
    perm: Vec<usize>,
    perm_inv: Vec<usize>,

    // Upper triangle of P A P', rewritten by every numeric factorization.
    col_ptr: Vec<usize>,
    row_idx: Vec<usize>,
    values: Vec<T>,

    symbolic: SymbolicSimplicialCholesky<usize>,
    l_values: Vec<T>,
    rhs: Vec<T>,
    work: MemBuffer,
}

impl<T: Real> LdlFactorization<T> {
    /// AMD ordering and symbolic analysis for the pattern of `mat`.
    pub fn symbolic(mat: &CsMat<T>) -> Result<Self, LdlError> {
        let n = mat.cols();
        if !mat.is_csc() || mat.rows() != n || mat.iter().any(|(_, (i, j))| i > j) {
            return Err(LdlError::NotUpperCsc);
        }
        let nnz = mat.nnz();
        let a_indptr = mat.indptr();
        let a_p = a_indptr.to_proper();
        let a_sym = SymbolicSparseColMatRef::new_checked(n, n, &*a_p, None, mat.indices());

        let mut perm = vec![0usize; n];
        let mut perm_inv = vec![0usize; n];
        let mut ordering_mem = MemBuffer::new(amd::order_scratch::<usize>(n, nnz));
        amd::order(
            &mut perm,
            &mut perm_inv,
            a_sym,
            amd::Control::default(),
            MemStack::new(&mut ordering_mem),
        )?;

        let mut work = MemBuffer::new(StackReq::any_of(&[
            permute_self_adjoint_scratch::<usize>(n),
            simplicial::prefactorize_symbolic_cholesky_scratch::<usize>(n, nnz),
            simplicial::factorize_simplicial_symbolic_cholesky_scratch::<usize>(n),
            simplicial::factorize_simplicial_numeric_ldlt_scratch::<usize, T>(n),
        ]));

        let mut col_ptr = vec![0usize; n + 1];
        let mut row_idx = vec![0usize; nnz];
        let mut values = vec![T::zero(); nnz];
        permute_upper(
            mat,
            &perm,
            &perm_inv,
            &mut col_ptr,
            &mut row_idx,
            &mut values,
            MemStack::new(&mut work),
        );

        let pattern = SymbolicSparseColMatRef::new_checked(n, n, &col_ptr[..], None, &row_idx[..]);
        let mut etree = vec![0isize; n];
        let mut col_counts = vec![0usize; n];
        let etree_ref = simplicial::prefactorize_symbolic_cholesky(
            &mut etree,
            &mut col_counts,
            pattern,
            MemStack::new(&mut work),
        );
        let symbolic = simplicial::factorize_simplicial_symbolic_cholesky(
            pattern,
            etree_ref,
            &col_counts,
            MemStack::new(&mut work),
        )?;

        Ok(Self {
            n,
            nnz,
            perm,
            perm_inv,
            col_ptr,
            row_idx,
            values,
            l_values: vec![T::zero(); symbolic.len_val()],
            symbolic,
            rhs: vec![T::zero(); n],
            work,
        })
    }

    /// Numeric factorization of `mat`, which must have the pattern given to
    /// [`LdlFactorization::symbolic`]. Rows `0..num_negative` must get
    /// negative pivots and the remaining ones positive pivots.
    pub fn factor(&mut self, mat: &CsMat<T>, num_negative: usize) -> Result<(), LdlError> {
        if mat.cols() != self.n || mat.rows() != self.n || mat.nnz() != self.nnz {
            return Err(LdlError::DimensionMismatch {
                expected: self.n,
                actual: mat.cols(),
            });
        }
        permute_upper(
            mat,
            &self.perm,
            &self.perm_inv,
            &mut self.col_ptr,
            &mut self.row_idx,
            &mut self.values,
            MemStack::new(&mut self.work),
        );

        let pattern = SymbolicSparseColMatRef::new_checked(
            self.n,
            self.n,
            &self.col_ptr[..],
            None,
            &self.row_idx[..],
        );
        let status = simplicial::factorize_simplicial_numeric_ldlt(
            &mut self.l_values,
            SparseColMatRef::new(pattern, &self.values[..]),
            LdltRegularization::default(),
            &self.symbolic,
            MemStack::new(&mut self.work),
        );
        if let Err(LdltError::ZeroPivot { index }) = status {
            // One-based position in the permuted matrix.
            return Err(LdlError::BadPivot(self.perm[index.saturating_sub(1)]));
        }

        // D is the head of each column of the simplicial factor.
        let l_p = self.symbolic.col_ptr();
        for (k, &row) in self.perm.iter().enumerate() {
            if (row < num_negative) != (self.l_values[l_p[k]] < T::zero()) {
                return Err(LdlError::WrongInertia { index: row });
            }
        }
        Ok(())
    }

    /// Solves `A x = b` in place with the latest factors.
    pub fn solve(&mut self, x: &mut [T]) {
        for (k, &row) in self.perm.iter().enumerate() {
            self.rhs[k] = x[row];
        }
        SimplicialLdltRef::new(&self.symbolic, &self.l_values[..]).solve_in_place_with_conj(
            Conj::No,
            MatMut::from_column_major_slice_mut(&mut self.rhs[..], self.n, 1),
            Par::Seq,
            MemStack::new(&mut self.work),
        );
        for (k, &row) in self.perm.iter().enumerate() {
            x[row] = self.rhs[k];
        }
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    /// Number of nonzeros below the diagonal of `L`.
    pub fn nnz_l(&self) -> usize {
        self.symbolic.len_val() - self.n
    }
}

impl<T> fmt::Debug for LdlFactorization<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdlFactorization")
            .field("n", &self.n)
            .field("nnz", &self.nnz)
            .field("perm", &self.perm)
            .field("len_l", &self.symbolic.len_val())
            .finish_non_exhaustive()
    }
}

fn permute_upper<T: Real>(
    mat: &CsMat<T>,
    perm: &[usize],
    perm_inv: &[usize],
    col_ptr: &mut [usize],
    row_idx: &mut [usize],
    values: &mut [T],
    stack: &mut MemStack,
) {
    let n = mat.cols();
    let a_indptr = mat.indptr();
    let a_p = a_indptr.to_proper();
    let a_sym = SymbolicSparseColMatRef::new_checked(n, n, &*a_p, None, mat.indices());
    permute_self_adjoint(
        values,
        col_ptr,
        row_idx,
        SparseColMatRef::new(a_sym, mat.data()),
        PermRef::new_checked(perm, perm_inv, n),
        Side::Upper,
        Side::Upper,
        stack,
    );
}
