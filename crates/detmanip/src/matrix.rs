//! Dense matrix storage and the few linear algebra kernels the engine needs

use crate::error::{DetManipError, Result};
use crate::scalar::Scalar;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Simple 2D matrix backed by Vec (row-major)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix<T> {
    data: Vec<T>,
    nrows: usize,
    ncols: usize,
}

impl<T> Matrix<T> {
    /// Number of rows
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Row-major view of the raw data
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

impl<T: Clone> Matrix<T> {
    /// Create a new matrix from dimensions and initial value
    pub fn from_elem(nrows: usize, ncols: usize, elem: T) -> Self {
        Self {
            data: vec![elem; nrows * ncols],
            nrows,
            ncols,
        }
    }

    /// Swap two rows in place
    pub fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for j in 0..self.ncols {
            self.data.swap(a * self.ncols + j, b * self.ncols + j);
        }
    }

    /// Swap two columns in place
    pub fn swap_cols(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for i in 0..self.nrows {
            self.data.swap(i * self.ncols + a, i * self.ncols + b);
        }
    }

    /// Row `i` restricted to its first `len` entries
    pub fn row_head(&self, i: usize, len: usize) -> Vec<T> {
        self.data[i * self.ncols..i * self.ncols + len].to_vec()
    }

    /// Column `j` restricted to its first `len` entries
    pub fn col_head(&self, j: usize, len: usize) -> Vec<T> {
        (0..len).map(|i| self[[i, j]].clone()).collect()
    }

    /// Copy of the leading `n x n` block
    pub fn leading_block(&self, n: usize) -> Self {
        assert!(n <= self.nrows && n <= self.ncols);
        let mut data = Vec::with_capacity(n * n);
        for i in 0..n {
            data.extend_from_slice(&self.data[i * self.ncols..i * self.ncols + n]);
        }
        Self {
            data,
            nrows: n,
            ncols: n,
        }
    }
}

impl<T: Clone + Zero> Matrix<T> {
    /// Create a zeros matrix
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self::from_elem(nrows, ncols, T::zero())
    }

    /// Resize to `nrows x ncols`, keeping the overlapping top-left block and
    /// filling new entries with zero
    pub fn resize_preserving(&mut self, nrows: usize, ncols: usize) {
        if nrows == self.nrows && ncols == self.ncols {
            return;
        }
        let mut result = Self::zeros(nrows, ncols);
        let r = nrows.min(self.nrows);
        let c = ncols.min(self.ncols);
        for i in 0..r {
            result.data[i * ncols..i * ncols + c]
                .clone_from_slice(&self.data[i * self.ncols..i * self.ncols + c]);
        }
        *self = result;
    }

    /// Copy `block` into the top-left corner
    pub fn set_leading_block(&mut self, block: &Matrix<T>) {
        assert!(block.nrows <= self.nrows && block.ncols <= self.ncols);
        for i in 0..block.nrows {
            self.data[i * self.ncols..i * self.ncols + block.ncols]
                .clone_from_slice(&block.data[i * block.ncols..(i + 1) * block.ncols]);
        }
    }
}

impl<T> Index<[usize; 2]> for Matrix<T> {
    type Output = T;

    fn index(&self, idx: [usize; 2]) -> &Self::Output {
        &self.data[idx[0] * self.ncols + idx[1]]
    }
}

impl<T> IndexMut<[usize; 2]> for Matrix<T> {
    fn index_mut(&mut self, idx: [usize; 2]) -> &mut Self::Output {
        &mut self.data[idx[0] * self.ncols + idx[1]]
    }
}

/// Create a zeros matrix with given dimensions
pub fn zeros<T: Clone + Zero>(nrows: usize, ncols: usize) -> Matrix<T> {
    Matrix::zeros(nrows, ncols)
}

/// Create an identity matrix
pub fn eye<T: Clone + Zero + One>(n: usize) -> Matrix<T> {
    let mut m = zeros(n, n);
    for i in 0..n {
        m[[i, i]] = T::one();
    }
    m
}

/// Create a matrix from a 2D vector (row-major)
pub fn from_vec2d<T: Clone + Zero>(data: Vec<Vec<T>>) -> Matrix<T> {
    let nrows = data.len();
    let ncols = if nrows > 0 { data[0].len() } else { 0 };
    let mut m = zeros(nrows, ncols);
    for (i, row) in data.into_iter().enumerate() {
        assert_eq!(row.len(), ncols, "ragged rows in from_vec2d");
        for (j, v) in row.into_iter().enumerate() {
            m[[i, j]] = v;
        }
    }
    m
}

/// Dot product of two vectors (no conjugation)
pub fn dot<T: Scalar>(a: &[T], b: &[T]) -> T {
    assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .fold(T::zero(), |acc, (&x, &y)| acc + x * y)
}

/// Matrix multiplication: A * B
pub fn mat_mul<T: Scalar>(a: &Matrix<T>, b: &Matrix<T>) -> Matrix<T> {
    let m = a.nrows();
    let k = a.ncols();
    let n = b.ncols();
    assert_eq!(b.nrows(), k);

    let mut result = zeros(m, n);
    for i in 0..m {
        for l in 0..k {
            let ail = a[[i, l]];
            for j in 0..n {
                result[[i, j]] = result[[i, j]] + ail * b[[l, j]];
            }
        }
    }
    result
}

/// `y = A[0..n, 0..n] * x` using only the leading block of `a`
pub fn gemv_leading<T: Scalar>(a: &Matrix<T>, x: &[T]) -> Vec<T> {
    let n = x.len();
    (0..n)
        .map(|i| {
            (0..n).fold(T::zero(), |acc, j| acc + a[[i, j]] * x[j])
        })
        .collect()
}

/// `y = A[0..n, 0..n]^T * x` using only the leading block of `a`
pub fn gemv_leading_transposed<T: Scalar>(a: &Matrix<T>, x: &[T]) -> Vec<T> {
    let n = x.len();
    let mut y = vec![T::zero(); n];
    for (i, &xi) in x.iter().enumerate() {
        for (j, yj) in y.iter_mut().enumerate() {
            *yj = *yj + a[[i, j]] * xi;
        }
    }
    y
}

/// Rank-1 update of the leading block: `A[i, j] += alpha * u[i] * v[j]`
pub fn ger_leading<T: Scalar>(alpha: T, u: &[T], v: &[T], a: &mut Matrix<T>) {
    for (i, &ui) in u.iter().enumerate() {
        let s = alpha * ui;
        for (j, &vj) in v.iter().enumerate() {
            a[[i, j]] = a[[i, j]] + s * vj;
        }
    }
}

/// Largest entrywise modulus of `a - b` and of `a + b`
pub fn max_abs_diff_and_sum<T: Scalar>(a: &Matrix<T>, b: &Matrix<T>) -> (f64, f64) {
    assert_eq!(a.nrows(), b.nrows());
    assert_eq!(a.ncols(), b.ncols());
    a.data
        .iter()
        .zip(b.data.iter())
        .fold((0.0_f64, 0.0_f64), |(d, s), (&x, &y)| {
            (d.max((x - y).abs_val()), s.max((x + y).abs_val()))
        })
}

/// LU factorization with partial pivoting, stored compactly in one matrix.
struct LuFactors<T> {
    lu: Matrix<T>,
    perm: Vec<usize>,
    swaps: usize,
}

#[allow(clippy::needless_range_loop)]
fn lu_factorize<T: Scalar>(a: &Matrix<T>) -> LuFactors<T> {
    let n = a.nrows();
    assert_eq!(a.ncols(), n, "LU factorization needs a square matrix");

    let mut lu = a.clone();
    let mut perm: Vec<usize> = (0..n).collect();
    let mut swaps = 0;

    for k in 0..n {
        // Find pivot
        let mut max_idx = k;
        let mut max_val: f64 = lu[[k, k]].abs_sq();
        for i in (k + 1)..n {
            let val: f64 = lu[[i, k]].abs_sq();
            if val > max_val {
                max_val = val;
                max_idx = i;
            }
        }

        if max_idx != k {
            lu.swap_rows(k, max_idx);
            perm.swap(k, max_idx);
            swaps += 1;
        }

        let pivot = lu[[k, k]];
        if pivot.abs_sq() == 0.0 {
            continue;
        }

        // Eliminate below, keeping the multipliers in the lower triangle
        for i in (k + 1)..n {
            let factor = lu[[i, k]] / pivot;
            lu[[i, k]] = factor;
            for j in (k + 1)..n {
                lu[[i, j]] = lu[[i, j]] - factor * lu[[k, j]];
            }
        }
    }

    LuFactors { lu, perm, swaps }
}

impl<T: Scalar> LuFactors<T> {
    fn determinant(&self) -> T {
        let n = self.lu.nrows();
        let prod = (0..n).fold(T::one(), |acc, i| acc * self.lu[[i, i]]);
        if self.swaps % 2 == 1 {
            -prod
        } else {
            prod
        }
    }

    fn is_singular(&self) -> bool {
        let n = self.lu.nrows();
        (0..n).any(|i| {
            let d = self.lu[[i, i]];
            d.abs_sq() == 0.0 || !d.is_finite()
        })
    }

    #[allow(clippy::needless_range_loop)]
    fn inverse(&self) -> Matrix<T> {
        let n = self.lu.nrows();
        let mut inv = zeros(n, n);
        let mut col = vec![T::zero(); n];
        for c in 0..n {
            // Solve L y = P e_c
            for i in 0..n {
                let mut sum = if self.perm[i] == c { T::one() } else { T::zero() };
                for k in 0..i {
                    sum = sum - self.lu[[i, k]] * col[k];
                }
                col[i] = sum;
            }
            // Solve U x = y
            for i in (0..n).rev() {
                let mut sum = col[i];
                for k in (i + 1)..n {
                    sum = sum - self.lu[[i, k]] * col[k];
                }
                col[i] = sum / self.lu[[i, i]];
            }
            for i in 0..n {
                inv[[i, c]] = col[i];
            }
        }
        inv
    }
}

/// Determinant of a square matrix by LU with partial pivoting.
///
/// An empty matrix has determinant one.
pub fn determinant<T: Scalar>(a: &Matrix<T>) -> T {
    match a.nrows() {
        0 => T::one(),
        1 => a[[0, 0]],
        2 => a[[0, 0]] * a[[1, 1]] - a[[0, 1]] * a[[1, 0]],
        _ => lu_factorize(a).determinant(),
    }
}

/// Determinant and inverse of a square matrix.
///
/// Fails with [`DetManipError::SingularMatrix`] when a zero (or non-finite)
/// pivot shows up.
pub fn determinant_and_inverse<T: Scalar>(a: &Matrix<T>) -> Result<(T, Matrix<T>)> {
    if a.nrows() == 0 {
        return Ok((T::one(), zeros(0, 0)));
    }
    let lu = lu_factorize(a);
    if lu.is_singular() {
        return Err(DetManipError::SingularMatrix);
    }
    Ok((lu.determinant(), lu.inverse()))
}

/// Inverse of a square matrix
pub fn inverse<T: Scalar>(a: &Matrix<T>) -> Result<Matrix<T>> {
    determinant_and_inverse(a).map(|(_, inv)| inv)
}

/// Sign of a permutation given as a table `i -> perm[i]`
pub fn permutation_sign(perm: &[usize]) -> i32 {
    let mut visited = vec![false; perm.len()];
    let mut sign = 1;
    for start in 0..perm.len() {
        if visited[start] {
            continue;
        }
        let mut len = 0;
        let mut i = start;
        while !visited[i] {
            visited[i] = true;
            i = perm[i];
            len += 1;
        }
        if len % 2 == 0 {
            sign = -sign;
        }
    }
    sign
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use num_complex::Complex64;

    #[test]
    fn test_matrix_basic() {
        let mut m = zeros::<f64>(3, 3);
        m[[0, 0]] = 1.0;
        m[[1, 1]] = 2.0;
        m[[2, 2]] = 3.0;

        assert_eq!(m[[0, 0]], 1.0);
        assert_eq!(m[[1, 1]], 2.0);
        assert_eq!(m[[2, 2]], 3.0);
        assert_eq!(m[[0, 1]], 0.0);
    }

    #[test]
    fn test_shape_without_clone_bound() {
        struct Token;
        let m: Matrix<Token> = Matrix {
            data: vec![Token, Token],
            nrows: 1,
            ncols: 2,
        };
        assert_eq!((m.nrows(), m.ncols()), (1, 2));
        assert_eq!(m.as_slice().len(), 2);
    }

    #[test]
    fn test_resize_preserving() {
        let mut m = from_vec2d(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        m.resize_preserving(4, 4);
        assert_eq!(m.nrows(), 4);
        assert_eq!(m[[0, 1]], 2.0);
        assert_eq!(m[[1, 0]], 3.0);
        assert_eq!(m[[3, 3]], 0.0);

        m.resize_preserving(1, 1);
        assert_eq!(m.as_slice(), &[1.0]);
    }

    #[test]
    fn test_swap_rows_and_cols() {
        let mut m = from_vec2d(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        m.swap_rows(0, 1);
        assert_eq!(m, from_vec2d(vec![vec![3.0, 4.0], vec![1.0, 2.0]]));
        m.swap_cols(0, 1);
        assert_eq!(m, from_vec2d(vec![vec![4.0, 3.0], vec![2.0, 1.0]]));
    }

    #[test]
    fn test_leading_block() {
        let m = from_vec2d(vec![
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
            vec![7.0, 8.0, 9.0],
        ]);
        let b = m.leading_block(2);
        assert_eq!(b, from_vec2d(vec![vec![1.0, 2.0], vec![4.0, 5.0]]));
        assert_eq!(m.row_head(1, 2), vec![4.0, 5.0]);
        assert_eq!(m.col_head(2, 2), vec![3.0, 6.0]);
    }

    #[test]
    fn test_mat_mul() {
        let a = from_vec2d(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let b = from_vec2d(vec![vec![5.0, 6.0], vec![7.0, 8.0]]);
        let c = mat_mul(&a, &b);

        assert_eq!(c[[0, 0]], 19.0);
        assert_eq!(c[[0, 1]], 22.0);
        assert_eq!(c[[1, 0]], 43.0);
        assert_eq!(c[[1, 1]], 50.0);
    }

    #[test]
    fn test_gemv_and_ger_on_leading_block() {
        let mut a = from_vec2d(vec![
            vec![1.0, 2.0, 100.0],
            vec![3.0, 4.0, 100.0],
            vec![100.0, 100.0, 100.0],
        ]);
        assert_eq!(gemv_leading(&a, &[1.0, 1.0]), vec![3.0, 7.0]);
        assert_eq!(gemv_leading_transposed(&a, &[1.0, 1.0]), vec![4.0, 6.0]);

        ger_leading(2.0, &[1.0, 0.0], &[1.0, 1.0], &mut a);
        assert_eq!(a[[0, 0]], 3.0);
        assert_eq!(a[[0, 1]], 4.0);
        assert_eq!(a[[1, 0]], 3.0);
        assert_eq!(a[[0, 2]], 100.0);
    }

    #[test]
    fn test_determinant_and_inverse_real() {
        let a = from_vec2d(vec![
            vec![2.0, 1.0, 0.0],
            vec![1.0, 3.0, 1.0],
            vec![0.0, 1.0, 4.0],
        ]);
        let (det, inv) = determinant_and_inverse(&a).unwrap();
        assert_relative_eq!(det, 18.0, epsilon = 1e-12);
        assert_relative_eq!(determinant(&a), 18.0, epsilon = 1e-12);

        let id = mat_mul(&a, &inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(id[[i, j]], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_determinant_needs_pivoting() {
        let a = from_vec2d(vec![
            vec![0.0, 1.0, 2.0],
            vec![1.0, 0.0, 3.0],
            vec![4.0, -3.0, 8.0],
        ]);
        // 0*(0*8 - 3*(-3)) - 1*(1*8 - 3*4) + 2*(1*(-3) - 0*4) = 4 - 6
        assert_relative_eq!(determinant(&a), -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_determinant_and_inverse_complex() {
        let i = Complex64::new(0.0, 1.0);
        let one = Complex64::new(1.0, 0.0);
        let a = from_vec2d(vec![vec![one, i], vec![-i, 2.0 * one]]);
        let (det, inv) = determinant_and_inverse(&a).unwrap();
        // 2 - (i)(-i) = 2 - 1
        assert_relative_eq!(det.re, 1.0, epsilon = 1e-12);
        assert_relative_eq!(det.im, 0.0, epsilon = 1e-12);
        let id = mat_mul(&a, &inv);
        assert!((id[[0, 0]] - one).norm() < 1e-12);
        assert!(id[[0, 1]].norm() < 1e-12);
    }

    #[test]
    fn test_singular_matrix() {
        let a = from_vec2d(vec![vec![1.0, 2.0], vec![2.0, 4.0]]);
        assert!(matches!(
            determinant_and_inverse(&a),
            Err(DetManipError::SingularMatrix)
        ));
        assert_eq!(determinant(&a), 0.0);
    }

    #[test]
    fn test_empty_matrix() {
        let a = zeros::<f64>(0, 0);
        let (det, inv) = determinant_and_inverse(&a).unwrap();
        assert_eq!(det, 1.0);
        assert_eq!(inv.nrows(), 0);
    }

    #[test]
    fn test_permutation_sign() {
        assert_eq!(permutation_sign(&[]), 1);
        assert_eq!(permutation_sign(&[0, 1, 2]), 1);
        assert_eq!(permutation_sign(&[1, 0, 2]), -1);
        assert_eq!(permutation_sign(&[1, 2, 0]), 1);
        assert_eq!(permutation_sign(&[3, 2, 1, 0]), 1);
        assert_eq!(permutation_sign(&[1, 2, 3, 0]), -1);
    }

    #[test]
    fn test_max_abs_diff_and_sum() {
        let a = from_vec2d(vec![vec![1.0, -2.0]]);
        let b = from_vec2d(vec![vec![1.5, -2.0]]);
        let (d, s) = max_abs_diff_and_sum(&a, &b);
        assert_relative_eq!(d, 0.5);
        assert_relative_eq!(s, 4.0);
    }
}
