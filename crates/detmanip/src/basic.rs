//! Reference manipulator recomputing everything from scratch
//!
//! [`DetManipBasic`] stores the matrix in logical order and evaluates every
//! proposal with a full LU factorization. It is `O(n^3)` per operation and
//! exists to cross-check [`DetManip`](crate::DetManip) and for small matrices
//! where the bookkeeping of the incremental engine does not pay off.

use crate::error::Result;
use crate::kernel::Kernel;
use crate::matrix::{determinant, inverse, zeros, Matrix};
use crate::operation::{check_sorted_positions, sort_positions, OperationKind};
use crate::scalar::Scalar;
use crate::traits::DeterminantManipulator;
use num_traits::One;

#[derive(Debug, Clone)]
struct Candidate<X, Y, T> {
    kind: OperationKind,
    x_values: Vec<X>,
    y_values: Vec<Y>,
    matrix: Matrix<T>,
    det: T,
}

/// Determinant manipulator without incremental updates
#[derive(Clone)]
pub struct DetManipBasic<K, X, Y>
where
    K: Kernel<X, Y>,
{
    kernel: K,
    x_values: Vec<X>,
    y_values: Vec<Y>,
    matrix: Matrix<K::Value>,
    det: K::Value,
    pending: Option<Candidate<X, Y, K::Value>>,
}

impl<K, X, Y> DetManipBasic<K, X, Y>
where
    K: Kernel<X, Y>,
    X: Clone,
    Y: Clone,
{
    /// Create an empty manipulator
    pub fn new(kernel: K) -> Self {
        Self {
            kernel,
            x_values: Vec::new(),
            y_values: Vec::new(),
            matrix: zeros(0, 0),
            det: K::Value::one(),
            pending: None,
        }
    }

    /// The kernel function
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Drop all points and any pending proposal
    pub fn clear(&mut self) {
        self.x_values.clear();
        self.y_values.clear();
        self.matrix = zeros(0, 0);
        self.det = K::Value::one();
        self.pending = None;
    }

    fn assert_ready(&self) {
        if let Some(c) = &self.pending {
            panic!(
                "a {:?} operation is pending: complete or reject it first",
                c.kind
            );
        }
    }

    /// Evaluate the candidate point set and keep it pending
    fn propose(&mut self, kind: OperationKind, x_values: Vec<X>, y_values: Vec<Y>) -> K::Value {
        let n = x_values.len();
        let mut matrix = zeros(n, n);
        for (i, x) in x_values.iter().enumerate() {
            for (j, y) in y_values.iter().enumerate() {
                matrix[[i, j]] = self.kernel.evaluate(x, y);
            }
        }
        let det = determinant(&matrix);
        let ratio = det / self.det;
        self.pending = Some(Candidate {
            kind,
            x_values,
            y_values,
            matrix,
            det,
        });
        ratio
    }
}

impl<K, X, Y> DeterminantManipulator<X, Y> for DetManipBasic<K, X, Y>
where
    K: Kernel<X, Y>,
    X: Clone,
    Y: Clone,
{
    type Value = K::Value;

    fn size(&self) -> usize {
        self.x_values.len()
    }

    fn get_x(&self, i: usize) -> &X {
        &self.x_values[i]
    }

    fn get_y(&self, j: usize) -> &Y {
        &self.y_values[j]
    }

    fn determinant(&self) -> K::Value {
        self.det
    }

    fn matrix(&self) -> Matrix<K::Value> {
        self.matrix.clone()
    }

    /// Inverse by LU; a singular matrix yields NaN entries
    fn inverse_matrix(&self) -> Matrix<K::Value> {
        let n = self.size();
        inverse(&self.matrix)
            .unwrap_or_else(|_| Matrix::from_elem(n, n, K::Value::from_f64(f64::NAN)))
    }

    fn pending_operation(&self) -> Option<OperationKind> {
        self.pending.as_ref().map(|c| c.kind)
    }

    fn try_insert(&mut self, i: usize, j: usize, x: X, y: Y) -> K::Value {
        self.assert_ready();
        let n = self.size();
        assert!(
            i <= n && j <= n,
            "insert position ({i}, {j}) out of range for size {n}"
        );
        let mut xs = self.x_values.clone();
        let mut ys = self.y_values.clone();
        xs.insert(i, x);
        ys.insert(j, y);
        self.propose(OperationKind::Insert, xs, ys)
    }

    fn try_insert_k(
        &mut self,
        rows: &[usize],
        cols: &[usize],
        xs: Vec<X>,
        ys: Vec<Y>,
    ) -> K::Value {
        self.assert_ready();
        let k = rows.len();
        assert!(k > 0, "try_insert_k needs at least one point");
        assert_eq!(cols.len(), k, "as many columns as rows must be inserted");
        let n = self.size();
        let (rows, xs) = sort_positions(rows, xs, n + k);
        let (cols, ys) = sort_positions(cols, ys, n + k);

        let mut new_xs = self.x_values.clone();
        let mut new_ys = self.y_values.clone();
        for (i, x) in rows.into_iter().zip(xs) {
            new_xs.insert(i, x);
        }
        for (j, y) in cols.into_iter().zip(ys) {
            new_ys.insert(j, y);
        }
        self.propose(OperationKind::InsertK, new_xs, new_ys)
    }

    fn try_remove(&mut self, i: usize, j: usize) -> K::Value {
        self.assert_ready();
        let n = self.size();
        assert!(
            i < n && j < n,
            "remove position ({i}, {j}) out of range for size {n}"
        );
        let mut xs = self.x_values.clone();
        let mut ys = self.y_values.clone();
        xs.remove(i);
        ys.remove(j);
        self.propose(OperationKind::Remove, xs, ys)
    }

    fn try_remove_k(&mut self, rows: &[usize], cols: &[usize]) -> K::Value {
        self.assert_ready();
        let k = rows.len();
        let n = self.size();
        assert!(k > 0, "try_remove_k needs at least one point");
        assert_eq!(cols.len(), k, "as many columns as rows must be removed");
        assert!(k <= n, "cannot remove {k} points from a matrix of size {n}");

        let mut rows = rows.to_vec();
        let mut cols = cols.to_vec();
        rows.sort_unstable();
        cols.sort_unstable();
        check_sorted_positions(&rows, n);
        check_sorted_positions(&cols, n);

        let xs = self
            .x_values
            .iter()
            .enumerate()
            .filter(|(i, _)| rows.binary_search(i).is_err())
            .map(|(_, x)| x.clone())
            .collect();
        let ys = self
            .y_values
            .iter()
            .enumerate()
            .filter(|(j, _)| cols.binary_search(j).is_err())
            .map(|(_, y)| y.clone())
            .collect();
        self.propose(OperationKind::RemoveK, xs, ys)
    }

    fn try_replace_col(&mut self, j: usize, y: Y) -> K::Value {
        self.assert_ready();
        assert!(j < self.size(), "column {j} out of range");
        let mut ys = self.y_values.clone();
        ys[j] = y;
        self.propose(OperationKind::ReplaceCol, self.x_values.clone(), ys)
    }

    fn try_replace_row(&mut self, i: usize, x: X) -> K::Value {
        self.assert_ready();
        assert!(i < self.size(), "row {i} out of range");
        let mut xs = self.x_values.clone();
        xs[i] = x;
        self.propose(OperationKind::ReplaceRow, xs, self.y_values.clone())
    }

    fn try_replace_row_col(&mut self, i: usize, j: usize, x: X, y: Y) -> K::Value {
        self.assert_ready();
        let n = self.size();
        assert!(i < n && j < n, "position ({i}, {j}) out of range");
        let mut xs = self.x_values.clone();
        let mut ys = self.y_values.clone();
        xs[i] = x;
        ys[j] = y;
        self.propose(OperationKind::ReplaceRowCol, xs, ys)
    }

    fn try_refill(&mut self, xs: Vec<X>, ys: Vec<Y>) -> K::Value {
        self.assert_ready();
        assert_eq!(
            xs.len(),
            ys.len(),
            "refill needs as many row arguments as column arguments"
        );
        self.propose(OperationKind::Refill, xs, ys)
    }

    fn complete_operation(&mut self) -> Result<()> {
        let Some(c) = self.pending.take() else {
            panic!("complete_operation called with no pending operation");
        };
        self.x_values = c.x_values;
        self.y_values = c.y_values;
        self.matrix = c.matrix;
        self.det = c.det;
        Ok(())
    }

    fn reject_last_try(&mut self) {
        assert!(
            self.pending.take().is_some(),
            "reject_last_try called with no pending operation"
        );
    }
}
