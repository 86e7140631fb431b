//! Common interface of the determinant manipulators

use crate::error::Result;
use crate::matrix::Matrix;
use crate::operation::OperationKind;
use crate::scalar::Scalar;

/// Propose / commit / reject interface over a matrix `M[i][j] = F(x_i, y_j)`.
///
/// Every `try_*` method computes the ratio `det(M_new) / det(M)` of a proposed
/// change without touching the committed state, and leaves the proposal
/// pending. Exactly one proposal may be pending; it is applied by
/// [`complete_operation`](Self::complete_operation) or dropped by
/// [`reject_last_try`](Self::reject_last_try).
///
/// # Panics
///
/// Calling a `try_*` method while a proposal is pending, committing with no
/// proposal pending, or passing an out-of-range position are programming
/// errors and panic.
pub trait DeterminantManipulator<X, Y> {
    /// Scalar type of the matrix entries and of the determinant
    type Value: Scalar;

    /// Current size `n` of the matrix
    fn size(&self) -> usize;

    /// Row argument at logical row `i`
    fn get_x(&self, i: usize) -> &X;

    /// Column argument at logical column `j`
    fn get_y(&self, j: usize) -> &Y;

    /// Determinant of the committed matrix
    fn determinant(&self) -> Self::Value;

    /// The committed matrix in logical order
    fn matrix(&self) -> Matrix<Self::Value>;

    /// Inverse of the committed matrix in logical order
    fn inverse_matrix(&self) -> Matrix<Self::Value>;

    /// Kind of the pending proposal, if any
    fn pending_operation(&self) -> Option<OperationKind>;

    /// Propose inserting row argument `x` at row `i` and column argument `y`
    /// at column `j` (`0 <= i, j <= n`).
    fn try_insert(&mut self, i: usize, j: usize, x: X, y: Y) -> Self::Value;

    /// Propose inserting `k` rows and columns at once.
    ///
    /// Positions refer to the matrix after insertion (`< n + k`) and must be
    /// pairwise distinct. Row arguments follow `rows`, column arguments follow
    /// `cols`.
    fn try_insert_k(&mut self, rows: &[usize], cols: &[usize], xs: Vec<X>, ys: Vec<Y>)
        -> Self::Value;

    /// Propose removing row `i` and column `j`
    fn try_remove(&mut self, i: usize, j: usize) -> Self::Value;

    /// Propose removing several rows and columns at once
    fn try_remove_k(&mut self, rows: &[usize], cols: &[usize]) -> Self::Value;

    /// Propose replacing the column argument of column `j`
    fn try_replace_col(&mut self, j: usize, y: Y) -> Self::Value;

    /// Propose replacing the row argument of row `i`
    fn try_replace_row(&mut self, i: usize, x: X) -> Self::Value;

    /// Propose replacing row `i` and column `j` arguments simultaneously
    fn try_replace_row_col(&mut self, i: usize, j: usize, x: X, y: Y) -> Self::Value;

    /// Propose replacing the whole point set
    fn try_refill(&mut self, xs: Vec<X>, ys: Vec<Y>) -> Self::Value;

    /// Apply the pending proposal
    fn complete_operation(&mut self) -> Result<()>;

    /// Drop the pending proposal
    fn reject_last_try(&mut self);

    /// Check if the matrix is empty
    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Row arguments in logical order
    fn x_values(&self) -> Vec<X>
    where
        X: Clone,
    {
        (0..self.size()).map(|i| self.get_x(i).clone()).collect()
    }

    /// Column arguments in logical order
    fn y_values(&self) -> Vec<Y>
    where
        Y: Clone,
    {
        (0..self.size()).map(|j| self.get_y(j).clone()).collect()
    }

    /// Two-point version of [`try_insert_k`](Self::try_insert_k)
    #[allow(clippy::too_many_arguments)]
    fn try_insert2(
        &mut self,
        i0: usize,
        i1: usize,
        j0: usize,
        j1: usize,
        x0: X,
        x1: X,
        y0: Y,
        y1: Y,
    ) -> Self::Value {
        self.try_insert_k(&[i0, i1], &[j0, j1], vec![x0, x1], vec![y0, y1])
    }

    /// Two-point version of [`try_remove_k`](Self::try_remove_k)
    fn try_remove2(&mut self, i0: usize, i1: usize, j0: usize, j1: usize) -> Self::Value {
        self.try_remove_k(&[i0, i1], &[j0, j1])
    }

    /// `try_insert` followed by `complete_operation`
    fn insert(&mut self, i: usize, j: usize, x: X, y: Y) -> Result<Self::Value> {
        let r = self.try_insert(i, j, x, y);
        self.complete_operation()?;
        Ok(r)
    }

    /// Insert as last row and last column
    fn insert_at_end(&mut self, x: X, y: Y) -> Result<Self::Value> {
        let n = self.size();
        self.insert(n, n, x, y)
    }

    /// `try_insert2` followed by `complete_operation`
    #[allow(clippy::too_many_arguments)]
    fn insert2(
        &mut self,
        i0: usize,
        i1: usize,
        j0: usize,
        j1: usize,
        x0: X,
        x1: X,
        y0: Y,
        y1: Y,
    ) -> Result<Self::Value> {
        let r = self.try_insert2(i0, i1, j0, j1, x0, x1, y0, y1);
        self.complete_operation()?;
        Ok(r)
    }

    /// Insert two points as the last two rows and columns
    fn insert2_at_end(&mut self, x0: X, x1: X, y0: Y, y1: Y) -> Result<Self::Value> {
        let n = self.size();
        self.insert2(n, n + 1, n, n + 1, x0, x1, y0, y1)
    }

    /// `try_remove` followed by `complete_operation`
    fn remove(&mut self, i: usize, j: usize) -> Result<Self::Value> {
        let r = self.try_remove(i, j);
        self.complete_operation()?;
        Ok(r)
    }

    /// Remove the last row and column
    fn remove_at_end(&mut self) -> Result<Self::Value> {
        let n = self.size();
        assert!(n > 0, "remove_at_end on an empty matrix");
        self.remove(n - 1, n - 1)
    }

    /// `try_remove2` followed by `complete_operation`
    fn remove2(&mut self, i0: usize, i1: usize, j0: usize, j1: usize) -> Result<Self::Value> {
        let r = self.try_remove2(i0, i1, j0, j1);
        self.complete_operation()?;
        Ok(r)
    }

    /// Remove the last two rows and columns
    fn remove2_at_end(&mut self) -> Result<Self::Value> {
        let n = self.size();
        assert!(n > 1, "remove2_at_end needs at least two rows");
        self.remove2(n - 1, n - 2, n - 1, n - 2)
    }

    /// `try_replace_col` followed by `complete_operation`
    fn replace_col(&mut self, j: usize, y: Y) -> Result<Self::Value> {
        let r = self.try_replace_col(j, y);
        self.complete_operation()?;
        Ok(r)
    }

    /// `try_replace_row` followed by `complete_operation`
    fn replace_row(&mut self, i: usize, x: X) -> Result<Self::Value> {
        let r = self.try_replace_row(i, x);
        self.complete_operation()?;
        Ok(r)
    }

    /// `try_replace_row_col` followed by `complete_operation`
    fn replace_row_col(&mut self, i: usize, j: usize, x: X, y: Y) -> Result<Self::Value> {
        let r = self.try_replace_row_col(i, j, x, y);
        self.complete_operation()?;
        Ok(r)
    }

    /// `try_refill` followed by `complete_operation`
    fn refill(&mut self, xs: Vec<X>, ys: Vec<Y>) -> Result<Self::Value> {
        let r = self.try_refill(xs, ys);
        self.complete_operation()?;
        Ok(r)
    }
}
