//! Proposed operations and their scratch data

use crate::matrix::Matrix;

/// Kind of a proposed operation awaiting `complete_operation` or `reject_last_try`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// One row and one column inserted
    Insert,
    /// k rows and k columns inserted at once
    InsertK,
    /// One row and one column removed
    Remove,
    /// k rows and k columns removed at once
    RemoveK,
    /// One column argument replaced
    ReplaceCol,
    /// One row argument replaced
    ReplaceRow,
    /// One row and one column argument replaced simultaneously
    ReplaceRowCol,
    /// Whole point set replaced
    Refill,
}

/// Direction of a cyclic roll of the logical rows or columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollDirection {
    /// No change
    None,
    /// First row moves to the last position
    Up,
    /// Last row moves to the first position
    Down,
    /// First column moves to the last position
    Left,
    /// Last column moves to the first position
    Right,
}

/// Scratch data of the single in-flight proposal of [`DetManip`](crate::DetManip).
///
/// Index naming: `i`/`j` are logical positions, `ireal`/`jreal` storage slots.
/// `b`/`c` are the new column/row of kernel values, `mb = S^{-1} b` and
/// `mc = c S^{-1}`.
#[derive(Debug, Clone)]
pub(crate) enum PendingOperation<X, Y, T> {
    Insert {
        i: usize,
        j: usize,
        x: X,
        y: Y,
        c: Vec<T>,
        mb: Vec<T>,
        ksi: T,
    },
    InsertK {
        rows: Vec<usize>,
        cols: Vec<usize>,
        xs: Vec<X>,
        ys: Vec<Y>,
        /// k x n block of new row values
        c: Matrix<T>,
        /// n x k block `S^{-1} b`
        mb: Matrix<T>,
        /// k x k Schur complement
        ksi: Matrix<T>,
    },
    Remove {
        ireal: usize,
        jreal: usize,
    },
    RemoveK {
        ireals: Vec<usize>,
        jreals: Vec<usize>,
    },
    ReplaceCol {
        jreal: usize,
        y: Y,
        mb: Vec<T>,
        ksi: T,
    },
    ReplaceRow {
        ireal: usize,
        x: X,
        mc: Vec<T>,
        ksi: T,
    },
    ReplaceRowCol {
        ireal: usize,
        jreal: usize,
        x: X,
        y: Y,
        /// Row change `delta_row[b] = F(x, y_b) - F(x_ireal, y_b)`, zero at `jreal`
        delta_row: Vec<T>,
        /// `S^{-1} delta_col`
        inv_delta_col: Vec<T>,
        /// `S^{-T} delta_row`
        inv_delta_row: Vec<T>,
        ratio: T,
    },
    Refill {
        xs: Vec<X>,
        ys: Vec<Y>,
        matrix: Matrix<T>,
    },
}

impl<X, Y, T> PendingOperation<X, Y, T> {
    pub(crate) fn kind(&self) -> OperationKind {
        match self {
            Self::Insert { .. } => OperationKind::Insert,
            Self::InsertK { .. } => OperationKind::InsertK,
            Self::Remove { .. } => OperationKind::Remove,
            Self::RemoveK { .. } => OperationKind::RemoveK,
            Self::ReplaceCol { .. } => OperationKind::ReplaceCol,
            Self::ReplaceRow { .. } => OperationKind::ReplaceRow,
            Self::ReplaceRowCol { .. } => OperationKind::ReplaceRowCol,
            Self::Refill { .. } => OperationKind::Refill,
        }
    }
}

/// Sort positions ascending, carrying the associated arguments along.
///
/// Panics when two positions coincide or one is `>= bound`.
pub(crate) fn sort_positions<A>(positions: &[usize], args: Vec<A>, bound: usize) -> (Vec<usize>, Vec<A>) {
    assert_eq!(
        positions.len(),
        args.len(),
        "positions and arguments must have the same length"
    );
    let mut paired: Vec<(usize, A)> = positions.iter().copied().zip(args).collect();
    paired.sort_by_key(|(p, _)| *p);
    let (sorted, args): (Vec<usize>, Vec<A>) = paired.into_iter().unzip();
    check_sorted_positions(&sorted, bound);
    (sorted, args)
}

/// Panics unless `sorted` is strictly increasing and below `bound`
pub(crate) fn check_sorted_positions(sorted: &[usize], bound: usize) {
    for w in sorted.windows(2) {
        assert!(w[0] != w[1], "position {} appears twice", w[0]);
    }
    if let Some(&last) = sorted.last() {
        assert!(last < bound, "position {last} out of range (size {bound})");
    }
}

/// Parity of the sum of all positions: `+1` if even, `-1` if odd
pub(crate) fn position_parity(rows: &[usize], cols: &[usize]) -> i32 {
    let sum: usize = rows.iter().chain(cols.iter()).sum();
    if sum % 2 == 0 {
        1
    } else {
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_positions_carries_arguments() {
        let (pos, args) = sort_positions(&[3, 0, 2], vec!["c", "a", "b"], 4);
        assert_eq!(pos, vec![0, 2, 3]);
        assert_eq!(args, vec!["a", "b", "c"]);
    }

    #[test]
    #[should_panic(expected = "appears twice")]
    fn test_sort_positions_rejects_duplicates() {
        sort_positions(&[1, 1], vec![0.0, 1.0], 4);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_sort_positions_rejects_out_of_range() {
        sort_positions(&[0, 5], vec![0.0, 1.0], 4);
    }

    #[test]
    fn test_position_parity() {
        assert_eq!(position_parity(&[0], &[0]), 1);
        assert_eq!(position_parity(&[1], &[0]), -1);
        assert_eq!(position_parity(&[1, 2], &[0, 3]), 1);
    }

    #[test]
    fn test_pending_kind() {
        let op: PendingOperation<f64, f64, f64> = PendingOperation::Remove { ireal: 0, jreal: 1 };
        assert_eq!(op.kind(), OperationKind::Remove);
    }
}
