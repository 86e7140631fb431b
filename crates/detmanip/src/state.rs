//! Serializable snapshot of a committed [`DetManip`](crate::DetManip)

use crate::error::{DetManipError, Result};
use crate::matrix::Matrix;
use crate::options::DetManipOptions;
use serde::{Deserialize, Serialize};

/// Committed state of a manipulator, without the kernel.
///
/// Produced by [`DetManip::state`](crate::DetManip::state) and restored with
/// [`DetManip::from_state`](crate::DetManip::from_state). A pending proposal
/// is never part of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetManipState<X, Y, T> {
    /// Matrix size
    pub n: usize,
    /// Row arguments in storage order
    pub x_values: Vec<X>,
    /// Column arguments in storage order
    pub y_values: Vec<Y>,
    /// Logical row to storage slot
    pub row_num: Vec<usize>,
    /// Logical column to storage slot
    pub col_num: Vec<usize>,
    /// Inverse of the storage-order matrix (`n x n`)
    pub inverse: Matrix<T>,
    /// Storage-order determinant
    pub det: T,
    /// `determinant() = sign * det`
    pub sign: i32,
    /// Committed operations since the last regeneration
    pub n_operations: u64,
    /// Options the manipulator was running with
    pub options: DetManipOptions,
}

fn is_permutation(table: &[usize], n: usize) -> bool {
    let mut seen = vec![false; n];
    table.len() == n
        && table.iter().all(|&v| {
            if v >= n || seen[v] {
                return false;
            }
            seen[v] = true;
            true
        })
}

impl<X, Y, T> DetManipState<X, Y, T> {
    /// Check the structural consistency of the snapshot
    pub fn validate(&self) -> Result<()> {
        let n = self.n;
        let invalid = |message: String| Err(DetManipError::InvalidState { message });

        if self.x_values.len() != n || self.y_values.len() != n {
            return invalid(format!(
                "expected {n} arguments, got {} rows and {} columns",
                self.x_values.len(),
                self.y_values.len()
            ));
        }
        if !is_permutation(&self.row_num, n) {
            return invalid(format!("row table {:?} is not a permutation", self.row_num));
        }
        if !is_permutation(&self.col_num, n) {
            return invalid(format!(
                "column table {:?} is not a permutation",
                self.col_num
            ));
        }
        if self.inverse.nrows() != n || self.inverse.ncols() != n {
            return invalid(format!(
                "inverse is {}x{}, expected {n}x{n}",
                self.inverse.nrows(),
                self.inverse.ncols()
            ));
        }
        if self.sign != 1 && self.sign != -1 {
            return invalid(format!("sign must be +1 or -1, got {}", self.sign));
        }
        Ok(())
    }
}
