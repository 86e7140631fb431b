//! Incremental determinant and inverse manipulation
//!
//! [`DetManip`] keeps the inverse and the determinant of
//! `M[i][j] = F(x_i, y_j)` up to date while points are inserted, removed or
//! replaced, using Schur complements for the ratios and Sherman-Morrison /
//! Woodbury formulas for the inverse.
//!
//! Row and column arguments live in *storage order*. Two index tables map a
//! logical row (column) to its storage slot, so that removing or inserting a
//! point in the middle never moves the inverse around: with
//! `S[a][b] = F(x_values[a], y_values[b])`,
//!
//! ```text
//! M[i][j]      = S[row_num[i]][col_num[j]]
//! M^{-1}[i][j] = mat_inv[col_num[i]][row_num[j]]      (mat_inv = S^{-1})
//! det M        = sign * det
//! ```

use crate::error::{DetManipError, Result};
use crate::kernel::Kernel;
use crate::matrix::{
    determinant, determinant_and_inverse, dot, gemv_leading, gemv_leading_transposed,
    ger_leading, inverse, mat_mul, max_abs_diff_and_sum, permutation_sign, zeros, Matrix,
};
use crate::operation::{
    check_sorted_positions, position_parity, sort_positions, OperationKind, PendingOperation,
    RollDirection,
};
use crate::options::DetManipOptions;
use crate::scalar::{with_sign, Scalar};
use crate::state::DetManipState;
use crate::traits::DeterminantManipulator;
use num_traits::{One, Zero};

/// Pending operation together with the determinant it would produce
#[derive(Debug, Clone)]
struct Proposal<X, Y, T> {
    op: PendingOperation<X, Y, T>,
    new_det: T,
    new_sign: i32,
}

/// Determinant manipulator based on incremental updates of the inverse.
///
/// # Example
///
/// ```
/// use detmanip::{DetManip, DeterminantManipulator};
///
/// let mut d = DetManip::new(|x: &f64, y: &f64| x - y, 100);
/// d.insert_at_end(1.0, 3.0).unwrap();
///
/// let ratio = d.try_insert(1, 1, 2.0, 4.0);
/// d.complete_operation().unwrap();
///
/// assert_eq!(d.size(), 2);
/// assert!((ratio + 0.5).abs() < 1e-12);
/// assert!((d.determinant() - 1.0).abs() < 1e-12);
/// ```
#[derive(Clone)]
pub struct DetManip<K, X, Y>
where
    K: Kernel<X, Y>,
{
    kernel: K,
    options: DetManipOptions,
    /// Logical size
    n: usize,
    /// Allocated dimension of `mat_inv`
    capacity: usize,
    x_values: Vec<X>,
    y_values: Vec<Y>,
    row_num: Vec<usize>,
    col_num: Vec<usize>,
    mat_inv: Matrix<K::Value>,
    det: K::Value,
    sign: i32,
    /// Committed operations since the last regeneration
    n_ops: u64,
    pending: Option<Proposal<X, Y, K::Value>>,
}

impl<K, X, Y> std::fmt::Debug for DetManip<K, X, Y>
where
    K: Kernel<X, Y>,
    X: std::fmt::Debug,
    Y: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetManip")
            .field("size", &self.n)
            .field("capacity", &self.capacity)
            .field("x_values", &self.x_values)
            .field("y_values", &self.y_values)
            .field("row_num", &self.row_num)
            .field("col_num", &self.col_num)
            .field("det", &self.det)
            .field("sign", &self.sign)
            .field("pending", &self.pending.as_ref().map(|p| p.op.kind()))
            .finish()
    }
}

/// Swap the two entries of an index table holding the values `a` and `b`
fn swap_values(table: &mut [usize], a: usize, b: usize) {
    let pa = table.iter().position(|&v| v == a);
    let pb = table.iter().position(|&v| v == b);
    if let (Some(pa), Some(pb)) = (pa, pb) {
        table.swap(pa, pb);
    }
}

fn is_invertible<T: Scalar>(ksi: T) -> bool {
    ksi.abs_sq() != 0.0 && (T::one() / ksi).is_finite()
}

impl<K, X, Y> DetManip<K, X, Y>
where
    K: Kernel<X, Y>,
{
    /// Create an empty manipulator.
    ///
    /// `capacity` is the matrix size reserved up front; growing past it
    /// reallocates (doubling), so it is a performance hint, not a limit.
    pub fn new(kernel: K, capacity: usize) -> Self {
        Self::with_options(kernel, capacity, DetManipOptions::default())
    }

    /// Create an empty manipulator with explicit options
    pub fn with_options(kernel: K, capacity: usize, options: DetManipOptions) -> Self {
        Self {
            kernel,
            options,
            n: 0,
            capacity,
            x_values: Vec::with_capacity(capacity),
            y_values: Vec::with_capacity(capacity),
            row_num: Vec::with_capacity(capacity),
            col_num: Vec::with_capacity(capacity),
            mat_inv: zeros(capacity, capacity),
            det: K::Value::one(),
            sign: 1,
            n_ops: 0,
            pending: None,
        }
    }

    /// Build the matrix from explicit row and column arguments and invert it
    pub fn from_points(kernel: K, xs: Vec<X>, ys: Vec<Y>) -> Result<Self> {
        Self::from_points_with_options(kernel, xs, ys, DetManipOptions::default())
    }

    /// [`from_points`](Self::from_points) with explicit options
    pub fn from_points_with_options(
        kernel: K,
        xs: Vec<X>,
        ys: Vec<Y>,
        options: DetManipOptions,
    ) -> Result<Self> {
        if xs.len() != ys.len() {
            return Err(DetManipError::DimensionMismatch {
                nx: xs.len(),
                ny: ys.len(),
            });
        }
        let n = xs.len();
        let mut d = Self::with_options(kernel, 2 * n.max(15), options);
        if n == 0 {
            return Ok(d);
        }

        d.x_values = xs;
        d.y_values = ys;
        let s = d.storage_matrix(n);
        let (det, inv) = determinant_and_inverse(&s)?;
        d.mat_inv.set_leading_block(&inv);
        d.det = det;
        d.row_num = (0..n).collect();
        d.col_num = (0..n).collect();
        d.n = n;
        Ok(d)
    }

    /// Restore a manipulator from a snapshot taken by [`state`](Self::state).
    ///
    /// The kernel is not part of the snapshot and must be the one the
    /// snapshot was taken with; call [`regenerate`](Self::regenerate) to
    /// discard the stored inverse in favour of a fresh one.
    pub fn from_state(kernel: K, state: DetManipState<X, Y, K::Value>) -> Result<Self> {
        state.validate()?;
        let n = state.n;
        let mut d = Self::with_options(kernel, 2 * n.max(15), state.options);
        d.mat_inv.set_leading_block(&state.inverse);
        d.x_values = state.x_values;
        d.y_values = state.y_values;
        d.row_num = state.row_num;
        d.col_num = state.col_num;
        d.det = state.det;
        d.sign = state.sign;
        d.n_ops = state.n_operations;
        d.n = n;
        Ok(d)
    }

    /// Snapshot of the committed state. A pending proposal is not included.
    pub fn state(&self) -> DetManipState<X, Y, K::Value>
    where
        X: Clone,
        Y: Clone,
    {
        DetManipState {
            n: self.n,
            x_values: self.x_values.clone(),
            y_values: self.y_values.clone(),
            row_num: self.row_num.clone(),
            col_num: self.col_num.clone(),
            inverse: self.mat_inv.leading_block(self.n),
            det: self.det,
            sign: self.sign,
            n_operations: self.n_ops,
            options: self.options.clone(),
        }
    }

    /// Reserve room for a matrix of size `capacity`
    pub fn reserve(&mut self, capacity: usize) {
        if capacity <= self.capacity {
            return;
        }
        let new_capacity = 2 * capacity;
        tracing::debug!(
            old_capacity = self.capacity,
            new_capacity,
            "growing det_manip storage"
        );
        self.mat_inv.resize_preserving(new_capacity, new_capacity);
        self.x_values
            .reserve(new_capacity.saturating_sub(self.x_values.len()));
        self.y_values
            .reserve(new_capacity.saturating_sub(self.y_values.len()));
        self.row_num
            .reserve(new_capacity.saturating_sub(self.row_num.len()));
        self.col_num
            .reserve(new_capacity.saturating_sub(self.col_num.len()));
        self.capacity = new_capacity;
    }

    /// Reset to size 0, dropping any pending proposal
    pub fn clear(&mut self) {
        self.n = 0;
        self.det = K::Value::one();
        self.sign = 1;
        self.pending = None;
        self.x_values.clear();
        self.y_values.clear();
        self.row_num.clear();
        self.col_num.clear();
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    /// Reserved matrix size
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The kernel function
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Current options
    pub fn options(&self) -> &DetManipOptions {
        &self.options
    }

    /// Replace the options
    pub fn set_options(&mut self, options: DetManipOptions) {
        self.options = options;
    }

    /// Committed operations since the last regeneration
    pub fn n_operations_since_regeneration(&self) -> u64 {
        self.n_ops
    }

    /// `M[i][j]`, evaluated through the kernel
    pub fn matrix_entry(&self, i: usize, j: usize) -> K::Value {
        self.kernel.evaluate(self.get_x(i), self.get_y(j))
    }

    /// `M^{-1}[i][j]`
    pub fn inverse_matrix_entry(&self, i: usize, j: usize) -> K::Value {
        assert!(i < self.n && j < self.n, "index ({i}, {j}) out of range");
        self.mat_inv[[self.col_num[i], self.row_num[j]]]
    }

    /// Row arguments in storage order (a permutation of the logical order)
    pub fn x_values_internal_order(&self) -> &[X] {
        &self.x_values
    }

    /// Column arguments in storage order
    pub fn y_values_internal_order(&self) -> &[Y] {
        &self.y_values
    }

    /// Inverse of the storage-order matrix: entry `(b, a)` pairs with
    /// storage row `a` and storage column `b`
    pub fn inverse_matrix_internal_order(&self) -> Matrix<K::Value> {
        self.mat_inv.leading_block(self.n)
    }

    /// Call `f(x, y, m)` for every pair of stored arguments, where `m` is the
    /// inverse entry paired with them. Iteration follows storage order.
    pub fn for_each_internal<F>(&self, mut f: F)
    where
        F: FnMut(&X, &Y, K::Value),
    {
        for (a, x) in self.x_values.iter().enumerate() {
            for (b, y) in self.y_values.iter().enumerate() {
                f(x, y, self.mat_inv[[b, a]]);
            }
        }
    }

    /// Whether `|det|` counts as zero under the configured threshold
    pub fn is_singular(&self) -> bool {
        self.options.is_singular(self.det.abs_val())
    }

    /// Propose inserting a row and a column whose entries are supplied by the
    /// caller instead of the kernel.
    ///
    /// `column(x_l)` gives the new column entry `M[l][j]` for every stored row
    /// argument, `row(y_l)` the new row entry `M[i][l]` for every stored
    /// column argument, and `diag` the corner `M[i][j]`. `x` and `y` are
    /// stored as the arguments of the new row and column; the supplied values
    /// must agree with `F(x, .)` and `F(., y)` (typically cached kernel
    /// values), since [`matrix`](DeterminantManipulator::matrix) and
    /// [`regenerate`](Self::regenerate) evaluate the kernel. Committed like
    /// [`try_insert`](DeterminantManipulator::try_insert).
    #[allow(clippy::too_many_arguments)]
    pub fn try_insert_from_function<FC, FR>(
        &mut self,
        i: usize,
        j: usize,
        x: X,
        y: Y,
        column: FC,
        row: FR,
        diag: K::Value,
    ) -> K::Value
    where
        FC: Fn(&X) -> K::Value,
        FR: Fn(&Y) -> K::Value,
    {
        self.assert_ready();
        let n = self.n;
        assert!(
            i <= n && j <= n,
            "insert position ({i}, {j}) out of range for size {n}"
        );
        let b: Vec<K::Value> = self.x_values.iter().map(&column).collect();
        let c: Vec<K::Value> = self.y_values.iter().map(&row).collect();
        self.propose_insert(i, j, x, y, b, c, diag)
    }

    // ------------------------------------------------------------------
    // Permutation-only operations
    // ------------------------------------------------------------------

    /// Swap two logical rows. Only the index table changes.
    pub fn swap_row(&mut self, i: usize, j: usize) {
        self.assert_ready();
        assert!(i < self.n && j < self.n, "row ({i}, {j}) out of range");
        if i == j {
            return;
        }
        self.row_num.swap(i, j);
        self.sign = -self.sign;
    }

    /// Swap two logical columns. Only the index table changes.
    pub fn swap_col(&mut self, i: usize, j: usize) {
        self.assert_ready();
        assert!(i < self.n && j < self.n, "column ({i}, {j}) out of range");
        if i == j {
            return;
        }
        self.col_num.swap(i, j);
        self.sign = -self.sign;
    }

    /// Cyclically roll the logical rows or columns.
    ///
    /// Returns the sign picked up by the determinant, `(-1)^(n-1)`.
    pub fn roll_matrix(&mut self, direction: RollDirection) -> i32 {
        self.assert_ready();
        if self.n < 2 {
            return 1;
        }
        match direction {
            RollDirection::None => return 1,
            RollDirection::Down => self.row_num.rotate_right(1),
            RollDirection::Up => self.row_num.rotate_left(1),
            RollDirection::Right => self.col_num.rotate_right(1),
            RollDirection::Left => self.col_num.rotate_left(1),
        }
        if (self.n - 1) % 2 == 1 {
            self.sign = -self.sign;
            -1
        } else {
            1
        }
    }

    // ------------------------------------------------------------------
    // Regeneration
    // ------------------------------------------------------------------

    /// Recompute the matrix from the kernel, its determinant and its inverse.
    ///
    /// Resets the accumulated floating point drift. Fails with
    /// [`DetManipError::SingularMatrix`] without touching the state when the
    /// recomputed matrix is singular.
    pub fn regenerate(&mut self) -> Result<()> {
        self.assert_ready();
        self.regenerate_with_check(false)
    }

    /// Compare the incremental inverse with a fresh inversion, then replace it.
    ///
    /// Logs a warning above `precision_warning` and fails with
    /// [`DetManipError::DeviationAboveThreshold`] above `precision_error`
    /// (both relative to `max|M^{-1}|`), keeping the drifted inverse so the
    /// owner can inspect it before calling [`regenerate`](Self::regenerate).
    pub fn check_inverse(&mut self) -> Result<()> {
        self.assert_ready();
        self.regenerate_with_check(true)
    }

    fn regenerate_with_check(&mut self, check: bool) -> Result<()> {
        let n = self.n;
        if n == 0 {
            self.det = K::Value::one();
            self.sign = 1;
            self.n_ops = 0;
            return Ok(());
        }

        let s = self.storage_matrix(n);
        let (det, inv) = determinant_and_inverse(&s)?;
        if self.options.is_singular(det.abs_val()) {
            return Err(DetManipError::SingularMatrix);
        }

        if check {
            let current = self.mat_inv.leading_block(n);
            let (deviation, scale) = max_abs_diff_and_sum(&inv, &current);
            let error_bound = self.options.precision_error * scale;
            let warning_bound = self.options.precision_warning * scale;
            if deviation >= error_bound || deviation.is_nan() {
                tracing::warn!(
                    size = n,
                    deviation,
                    bound = error_bound,
                    "det_manip inverse deviation above critical threshold"
                );
                return Err(DetManipError::DeviationAboveThreshold {
                    deviation,
                    bound: error_bound,
                });
            }
            if deviation >= warning_bound {
                tracing::warn!(
                    size = n,
                    deviation,
                    bound = warning_bound,
                    "det_manip inverse deviation above warning threshold"
                );
            }
        }

        self.mat_inv.set_leading_block(&inv);
        self.det = det;
        self.sign = permutation_sign(&self.row_num) * permutation_sign(&self.col_num);
        self.n_ops = 0;
        tracing::debug!(size = n, "regenerated det_manip from the kernel");
        Ok(())
    }

    /// Drift check run from `complete_operation` once `check_interval`
    /// commits have accumulated.
    ///
    /// The operation is already committed at this point, so failures are
    /// logged and recovered from instead of being returned: a deviation above
    /// `precision_error` is followed by a plain regeneration, and a singular
    /// recomputed matrix keeps the incremental inverse. The counter is reset
    /// in every case.
    fn periodic_check(&mut self) {
        match self.regenerate_with_check(true) {
            Ok(()) => {}
            Err(DetManipError::DeviationAboveThreshold { .. }) => {
                if let Err(err) = self.regenerate_with_check(false) {
                    tracing::error!(%err, size = self.n, "det_manip regeneration after drift failed");
                }
            }
            Err(err) => {
                tracing::error!(%err, size = self.n, "periodic det_manip check failed");
            }
        }
        self.n_ops = 0;
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn assert_ready(&self) {
        if let Some(p) = &self.pending {
            panic!(
                "a {:?} operation is pending: complete or reject it first",
                p.op.kind()
            );
        }
    }

    /// `S[a][b] = F(x_values[a], y_values[b])` for the first `n` slots
    fn storage_matrix(&self, n: usize) -> Matrix<K::Value> {
        let mut s = zeros(n, n);
        for (a, x) in self.x_values[..n].iter().enumerate() {
            for (b, y) in self.y_values[..n].iter().enumerate() {
                s[[a, b]] = self.kernel.evaluate(x, y);
            }
        }
        s
    }

    fn propose(
        &mut self,
        op: PendingOperation<X, Y, K::Value>,
        new_det: K::Value,
        new_sign: i32,
    ) {
        self.pending = Some(Proposal {
            op,
            new_det,
            new_sign,
        });
    }

    /// Schur complement proposal for one new row and column.
    ///
    /// `b` is the new column over the stored rows, `c` the new row over the
    /// stored columns (both in storage order) and `diag` the corner entry.
    #[allow(clippy::too_many_arguments)]
    fn propose_insert(
        &mut self,
        i: usize,
        j: usize,
        x: X,
        y: Y,
        b: Vec<K::Value>,
        c: Vec<K::Value>,
        diag: K::Value,
    ) -> K::Value {
        if self.n == 0 {
            let op = PendingOperation::Insert {
                i,
                j,
                x,
                y,
                c: Vec::new(),
                mb: Vec::new(),
                ksi: diag,
            };
            self.propose(op, diag, 1);
            return diag;
        }

        // The proposal appends the new row and column at storage slot n
        let mb = gemv_leading(&self.mat_inv, &b);
        let ksi = diag - dot(&c, &mb);

        let new_det = self.det * ksi;
        let new_sign = self.sign * position_parity(&[i], &[j]);
        let op = PendingOperation::Insert {
            i,
            j,
            x,
            y,
            c,
            mb,
            ksi,
        };
        self.propose(op, new_det, new_sign);
        with_sign(ksi, new_sign * self.sign)
    }

    #[allow(clippy::too_many_arguments)]
    fn complete_insert(
        &mut self,
        i: usize,
        j: usize,
        x: X,
        y: Y,
        c: Vec<K::Value>,
        mut mb: Vec<K::Value>,
        ksi: K::Value,
    ) -> Result<()> {
        if !is_invertible(ksi) {
            return Err(DetManipError::SingularMatrix);
        }
        let n = self.n;
        self.reserve(n + 1);
        self.x_values.push(x);
        self.y_values.push(y);

        if n == 0 {
            self.mat_inv[[0, 0]] = K::Value::one() / ksi;
            self.row_num.push(0);
            self.col_num.push(0);
            self.n = 1;
            return Ok(());
        }

        // mc = c S^{-1}, extended by -1 on the new slot (so is mb)
        let mut mc = gemv_leading_transposed(&self.mat_inv, &c);
        mc.push(-K::Value::one());
        mb.push(-K::Value::one());

        self.n = n + 1;
        self.row_num.insert(i, n);
        self.col_num.insert(j, n);

        for l in 0..=n {
            self.mat_inv[[l, n]] = K::Value::zero();
            self.mat_inv[[n, l]] = K::Value::zero();
        }
        ger_leading(K::Value::one() / ksi, &mb, &mc, &mut self.mat_inv);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn complete_insert_k(
        &mut self,
        rows: Vec<usize>,
        cols: Vec<usize>,
        xs: Vec<X>,
        ys: Vec<Y>,
        c: Matrix<K::Value>,
        mb: Matrix<K::Value>,
        ksi: Matrix<K::Value>,
    ) -> Result<()> {
        let ksi_inv = inverse(&ksi)?;
        let n = self.n;
        let k = rows.len();
        self.reserve(n + k);
        self.x_values.extend(xs);
        self.y_values.extend(ys);

        if n == 0 {
            // positions are then exactly 0..k
            self.mat_inv.set_leading_block(&ksi_inv);
            self.row_num = (0..k).collect();
            self.col_num = (0..k).collect();
            self.n = k;
            return Ok(());
        }

        let nk = n + k;
        let mc_head = mat_mul(&c, &self.mat_inv.leading_block(n));
        let mut mc = zeros(k, nk);
        let mut mb_ext = zeros(nk, k);
        for l in 0..k {
            for a in 0..n {
                mc[[l, a]] = mc_head[[l, a]];
                mb_ext[[a, l]] = mb[[a, l]];
            }
            mc[[l, n + l]] = -K::Value::one();
            mb_ext[[n + l, l]] = -K::Value::one();
        }

        for (l, (&row, &col)) in rows.iter().zip(cols.iter()).enumerate() {
            self.row_num.insert(row, n + l);
            self.col_num.insert(col, n + l);
        }
        self.n = nk;

        for a in 0..nk {
            for slot in n..nk {
                self.mat_inv[[a, slot]] = K::Value::zero();
                self.mat_inv[[slot, a]] = K::Value::zero();
            }
        }
        let update = mat_mul(&mb_ext, &mat_mul(&ksi_inv, &mc));
        for a in 0..nk {
            for b in 0..nk {
                self.mat_inv[[a, b]] = self.mat_inv[[a, b]] + update[[a, b]];
            }
        }
        Ok(())
    }

    fn complete_remove(&mut self, ireal: usize, jreal: usize) -> Result<()> {
        let n = self.n;
        if n == 1 {
            self.clear();
            return Ok(());
        }
        if !is_invertible(self.mat_inv[[jreal, ireal]]) {
            return Err(DetManipError::SingularMatrix);
        }

        // Move the removed row and column to the last slot
        let last = n - 1;
        if ireal != last {
            self.mat_inv.swap_cols(ireal, last);
            self.x_values.swap(ireal, last);
            swap_values(&mut self.row_num, ireal, last);
        }
        if jreal != last {
            self.mat_inv.swap_rows(jreal, last);
            self.y_values.swap(jreal, last);
            swap_values(&mut self.col_num, jreal, last);
        }
        self.row_num.retain(|&s| s != last);
        self.col_num.retain(|&s| s != last);
        self.x_values.pop();
        self.y_values.pop();
        self.n = last;

        // S^{-1} <- a - b d^{-1} c
        let alpha = -K::Value::one() / self.mat_inv[[last, last]];
        let col = self.mat_inv.col_head(last, last);
        let row = self.mat_inv.row_head(last, last);
        ger_leading(alpha, &col, &row, &mut self.mat_inv);
        Ok(())
    }

    fn complete_remove_k(&mut self, mut ireals: Vec<usize>, mut jreals: Vec<usize>) -> Result<()> {
        let n = self.n;
        let k = ireals.len();
        if n == k {
            self.clear();
            return Ok(());
        }
        ireals.sort_unstable();
        jreals.sort_unstable();

        // After moving the removed slots to the end, the trailing block of
        // S^{-1} is the sorted block below
        let mut block = zeros(k, k);
        for (m1, &jr) in jreals.iter().enumerate() {
            for (m2, &ir) in ireals.iter().enumerate() {
                block[[m1, m2]] = self.mat_inv[[jr, ir]];
            }
        }
        let block_inv = inverse(&block)?;

        for m in (0..k).rev() {
            let target = n - k + m;
            if ireals[m] != target {
                self.mat_inv.swap_cols(ireals[m], target);
                self.x_values.swap(ireals[m], target);
                swap_values(&mut self.row_num, ireals[m], target);
            }
            if jreals[m] != target {
                self.mat_inv.swap_rows(jreals[m], target);
                self.y_values.swap(jreals[m], target);
                swap_values(&mut self.col_num, jreals[m], target);
            }
        }
        let new_n = n - k;
        self.row_num.retain(|&s| s < new_n);
        self.col_num.retain(|&s| s < new_n);
        self.x_values.truncate(new_n);
        self.y_values.truncate(new_n);
        self.n = new_n;

        let mut left = zeros(new_n, k);
        let mut right = zeros(k, new_n);
        for a in 0..new_n {
            for l in 0..k {
                left[[a, l]] = self.mat_inv[[a, new_n + l]];
                right[[l, a]] = self.mat_inv[[new_n + l, a]];
            }
        }
        let update = mat_mul(&left, &mat_mul(&block_inv, &right));
        for a in 0..new_n {
            for b in 0..new_n {
                self.mat_inv[[a, b]] = self.mat_inv[[a, b]] - update[[a, b]];
            }
        }
        Ok(())
    }

    fn complete_replace_col(
        &mut self,
        jreal: usize,
        y: Y,
        mut mb: Vec<K::Value>,
        ksi: K::Value,
    ) -> Result<()> {
        if !is_invertible(ksi) {
            return Err(DetManipError::SingularMatrix);
        }
        let n = self.n;
        self.y_values[jreal] = y;

        // Sherman-Morrison in two steps: leave row jreal alone, then rescale it
        let alpha = -K::Value::one() / ksi;
        mb[jreal] = K::Value::zero();
        let row = self.mat_inv.row_head(jreal, n);
        ger_leading(alpha, &mb, &row, &mut self.mat_inv);
        let scale = K::Value::one() / ksi;
        for b in 0..n {
            self.mat_inv[[jreal, b]] = self.mat_inv[[jreal, b]] * scale;
        }
        Ok(())
    }

    fn complete_replace_row(
        &mut self,
        ireal: usize,
        x: X,
        mut mc: Vec<K::Value>,
        ksi: K::Value,
    ) -> Result<()> {
        if !is_invertible(ksi) {
            return Err(DetManipError::SingularMatrix);
        }
        let n = self.n;
        self.x_values[ireal] = x;

        let alpha = -K::Value::one() / ksi;
        mc[ireal] = K::Value::zero();
        let col = self.mat_inv.col_head(ireal, n);
        ger_leading(alpha, &col, &mc, &mut self.mat_inv);
        let scale = K::Value::one() / ksi;
        for a in 0..n {
            self.mat_inv[[a, ireal]] = self.mat_inv[[a, ireal]] * scale;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn complete_replace_row_col(
        &mut self,
        ireal: usize,
        jreal: usize,
        x: X,
        y: Y,
        delta_row: Vec<K::Value>,
        inv_delta_col: Vec<K::Value>,
        inv_delta_row: Vec<K::Value>,
        ratio: K::Value,
    ) -> Result<()> {
        if !is_invertible(ratio) {
            return Err(DetManipError::SingularMatrix);
        }
        let n = self.n;
        self.x_values[ireal] = x;
        self.y_values[jreal] = y;

        let one = K::Value::one();
        let xn = inv_delta_col[jreal];
        let yn = inv_delta_row[ireal];
        let a = -(one + yn) / ratio;
        let b = -(one + xn) / ratio;
        let z = dot(&delta_row, &inv_delta_col) / ratio;
        let mnn = self.mat_inv[[jreal, ireal]] / ratio;
        let row_j = self.mat_inv.row_head(jreal, n);
        let col_i = self.mat_inv.col_head(ireal, n);

        for p in 0..n {
            let xp = inv_delta_col[p];
            let min = col_i[p];
            for q in 0..n {
                let yq = inv_delta_row[q];
                let mnj = row_j[q];
                self.mat_inv[[p, q]] =
                    self.mat_inv[[p, q]] + a * xp * mnj + b * min * yq + mnn * xp * yq + z * min * mnj;
            }
        }
        Ok(())
    }

    fn complete_refill(
        &mut self,
        xs: Vec<X>,
        ys: Vec<Y>,
        matrix: Matrix<K::Value>,
    ) -> Result<()> {
        let s = xs.len();
        if s == 0 {
            self.clear();
            return Ok(());
        }
        let inv = inverse(&matrix)?;
        self.reserve(s);
        self.x_values = xs;
        self.y_values = ys;
        self.row_num = (0..s).collect();
        self.col_num = (0..s).collect();
        self.mat_inv.set_leading_block(&inv);
        self.n = s;
        tracing::debug!(size = s, "refilled det_manip");
        Ok(())
    }
}

impl<K, X, Y> DeterminantManipulator<X, Y> for DetManip<K, X, Y>
where
    K: Kernel<X, Y>,
{
    type Value = K::Value;

    fn size(&self) -> usize {
        self.n
    }

    fn get_x(&self, i: usize) -> &X {
        &self.x_values[self.row_num[i]]
    }

    fn get_y(&self, j: usize) -> &Y {
        &self.y_values[self.col_num[j]]
    }

    fn determinant(&self) -> K::Value {
        with_sign(self.det, self.sign)
    }

    fn matrix(&self) -> Matrix<K::Value> {
        let n = self.n;
        let mut m = zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                m[[i, j]] = self.matrix_entry(i, j);
            }
        }
        m
    }

    fn inverse_matrix(&self) -> Matrix<K::Value> {
        let n = self.n;
        let mut m = zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                m[[i, j]] = self.mat_inv[[self.col_num[i], self.row_num[j]]];
            }
        }
        m
    }

    fn pending_operation(&self) -> Option<OperationKind> {
        self.pending.as_ref().map(|p| p.op.kind())
    }

    fn try_insert(&mut self, i: usize, j: usize, x: X, y: Y) -> K::Value {
        self.assert_ready();
        let n = self.n;
        assert!(
            i <= n && j <= n,
            "insert position ({i}, {j}) out of range for size {n}"
        );

        let diag = self.kernel.evaluate(&x, &y);
        let b: Vec<K::Value> = self
            .x_values
            .iter()
            .map(|xv| self.kernel.evaluate(xv, &y))
            .collect();
        let c: Vec<K::Value> = self
            .y_values
            .iter()
            .map(|yv| self.kernel.evaluate(&x, yv))
            .collect();
        self.propose_insert(i, j, x, y, b, c, diag)
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
        let n = self.n;
        let (rows, xs) = sort_positions(rows, xs, n + k);
        let (cols, ys) = sort_positions(cols, ys, n + k);

        let mut ksi = zeros(k, k);
        for (m, x) in xs.iter().enumerate() {
            for (l, y) in ys.iter().enumerate() {
                ksi[[m, l]] = self.kernel.evaluate(x, y);
            }
        }

        if n == 0 {
            let d = determinant(&ksi);
            let op = PendingOperation::InsertK {
                rows,
                cols,
                xs,
                ys,
                c: zeros(k, 0),
                mb: zeros(0, k),
                ksi,
            };
            self.propose(op, d, 1);
            return d;
        }

        let mut b = zeros(n, k);
        let mut c = zeros(k, n);
        for a in 0..n {
            for l in 0..k {
                b[[a, l]] = self.kernel.evaluate(&self.x_values[a], &ys[l]);
                c[[l, a]] = self.kernel.evaluate(&xs[l], &self.y_values[a]);
            }
        }
        let mb = mat_mul(&self.mat_inv.leading_block(n), &b);
        let cmb = mat_mul(&c, &mb);
        for m in 0..k {
            for l in 0..k {
                ksi[[m, l]] = ksi[[m, l]] - cmb[[m, l]];
            }
        }
        let d = determinant(&ksi);

        let new_det = self.det * d;
        let new_sign = self.sign * position_parity(&rows, &cols);
        let op = PendingOperation::InsertK {
            rows,
            cols,
            xs,
            ys,
            c,
            mb,
            ksi,
        };
        self.propose(op, new_det, new_sign);
        with_sign(d, new_sign * self.sign)
    }

    fn try_remove(&mut self, i: usize, j: usize) -> K::Value {
        self.assert_ready();
        let n = self.n;
        assert!(
            i < n && j < n,
            "remove position ({i}, {j}) out of range for size {n}"
        );
        let ireal = self.row_num[i];
        let jreal = self.col_num[j];
        // Corner of the inverse once row and column are moved to the end
        let ksi = self.mat_inv[[jreal, ireal]];

        let new_det = self.det * ksi;
        let new_sign = self.sign * position_parity(&[i], &[j]);
        self.propose(PendingOperation::Remove { ireal, jreal }, new_det, new_sign);
        with_sign(ksi, new_sign * self.sign)
    }

    fn try_remove_k(&mut self, rows: &[usize], cols: &[usize]) -> K::Value {
        self.assert_ready();
        let k = rows.len();
        let n = self.n;
        assert!(k > 0, "try_remove_k needs at least one point");
        assert_eq!(cols.len(), k, "as many columns as rows must be removed");
        assert!(k <= n, "cannot remove {k} points from a matrix of size {n}");

        let mut rows = rows.to_vec();
        let mut cols = cols.to_vec();
        rows.sort_unstable();
        cols.sort_unstable();
        check_sorted_positions(&rows, n);
        check_sorted_positions(&cols, n);

        let ireals: Vec<usize> = rows.iter().map(|&i| self.row_num[i]).collect();
        let jreals: Vec<usize> = cols.iter().map(|&j| self.col_num[j]).collect();
        let mut ksi = zeros(k, k);
        for (l1, &jr) in jreals.iter().enumerate() {
            for (l2, &ir) in ireals.iter().enumerate() {
                ksi[[l1, l2]] = self.mat_inv[[jr, ir]];
            }
        }
        let d = determinant(&ksi);

        let new_det = self.det * d;
        let new_sign = self.sign * position_parity(&rows, &cols);
        self.propose(PendingOperation::RemoveK { ireals, jreals }, new_det, new_sign);
        with_sign(d, new_sign * self.sign)
    }

    fn try_replace_col(&mut self, j: usize, y: Y) -> K::Value {
        self.assert_ready();
        let n = self.n;
        assert!(j < n, "column {j} out of range for size {n}");
        let jreal = self.col_num[j];

        let old_y = &self.y_values[jreal];
        let delta: Vec<K::Value> = self
            .x_values
            .iter()
            .map(|xv| self.kernel.evaluate(xv, &y) - self.kernel.evaluate(xv, old_y))
            .collect();
        let mb = gemv_leading(&self.mat_inv, &delta);
        let ksi = K::Value::one() + mb[jreal];

        let new_det = self.det * ksi;
        let new_sign = self.sign;
        self.propose(PendingOperation::ReplaceCol { jreal, y, mb, ksi }, new_det, new_sign);
        ksi
    }

    fn try_replace_row(&mut self, i: usize, x: X) -> K::Value {
        self.assert_ready();
        let n = self.n;
        assert!(i < n, "row {i} out of range for size {n}");
        let ireal = self.row_num[i];

        let old_x = &self.x_values[ireal];
        let delta: Vec<K::Value> = self
            .y_values
            .iter()
            .map(|yv| self.kernel.evaluate(&x, yv) - self.kernel.evaluate(old_x, yv))
            .collect();
        let mc = gemv_leading_transposed(&self.mat_inv, &delta);
        let ksi = K::Value::one() + mc[ireal];

        let new_det = self.det * ksi;
        let new_sign = self.sign;
        self.propose(PendingOperation::ReplaceRow { ireal, x, mc, ksi }, new_det, new_sign);
        ksi
    }

    fn try_replace_row_col(&mut self, i: usize, j: usize, x: X, y: Y) -> K::Value {
        self.assert_ready();
        let n = self.n;
        assert!(
            i < n && j < n,
            "position ({i}, {j}) out of range for size {n}"
        );
        let ireal = self.row_num[i];
        let jreal = self.col_num[j];
        let old_x = &self.x_values[ireal];
        let old_y = &self.y_values[jreal];

        let mut delta_col: Vec<K::Value> = self
            .x_values
            .iter()
            .map(|xv| self.kernel.evaluate(xv, &y) - self.kernel.evaluate(xv, old_y))
            .collect();
        let mut delta_row: Vec<K::Value> = self
            .y_values
            .iter()
            .map(|yv| self.kernel.evaluate(&x, yv) - self.kernel.evaluate(old_x, yv))
            .collect();
        // The corner entry is carried by the column change only
        delta_col[ireal] = self.kernel.evaluate(&x, &y) - self.kernel.evaluate(old_x, old_y);
        delta_row[jreal] = K::Value::zero();

        let inv_delta_col = gemv_leading(&self.mat_inv, &delta_col);
        let inv_delta_row = gemv_leading_transposed(&self.mat_inv, &delta_row);

        let one = K::Value::one();
        let xn = inv_delta_col[jreal];
        let yn = inv_delta_row[ireal];
        let z = dot(&delta_row, &inv_delta_col);
        let mnn = self.mat_inv[[jreal, ireal]];
        let ratio = (one + xn) * (one + yn) - mnn * z;

        let new_det = self.det * ratio;
        let new_sign = self.sign;
        let op = PendingOperation::ReplaceRowCol {
            ireal,
            jreal,
            x,
            y,
            delta_row,
            inv_delta_col,
            inv_delta_row,
            ratio,
        };
        self.propose(op, new_det, new_sign);
        ratio
    }

    fn try_refill(&mut self, xs: Vec<X>, ys: Vec<Y>) -> K::Value {
        self.assert_ready();
        assert_eq!(
            xs.len(),
            ys.len(),
            "refill needs as many row arguments as column arguments"
        );
        let s = xs.len();
        let old_det = self.determinant();

        let mut matrix = zeros(s, s);
        for (a, x) in xs.iter().enumerate() {
            for (b, y) in ys.iter().enumerate() {
                matrix[[a, b]] = self.kernel.evaluate(x, y);
            }
        }
        let new_det = determinant(&matrix);
        self.propose(PendingOperation::Refill { xs, ys, matrix }, new_det, 1);
        new_det / old_det
    }

    fn complete_operation(&mut self) -> Result<()> {
        let Some(Proposal {
            op,
            new_det,
            new_sign,
        }) = self.pending.take()
        else {
            panic!("complete_operation called with no pending operation");
        };
        let kind = op.kind();

        match op {
            PendingOperation::Insert {
                i,
                j,
                x,
                y,
                c,
                mb,
                ksi,
            } => self.complete_insert(i, j, x, y, c, mb, ksi)?,
            PendingOperation::InsertK {
                rows,
                cols,
                xs,
                ys,
                c,
                mb,
                ksi,
            } => self.complete_insert_k(rows, cols, xs, ys, c, mb, ksi)?,
            PendingOperation::Remove { ireal, jreal } => self.complete_remove(ireal, jreal)?,
            PendingOperation::RemoveK { ireals, jreals } => {
                self.complete_remove_k(ireals, jreals)?
            }
            PendingOperation::ReplaceCol { jreal, y, mb, ksi } => {
                self.complete_replace_col(jreal, y, mb, ksi)?
            }
            PendingOperation::ReplaceRow { ireal, x, mc, ksi } => {
                self.complete_replace_row(ireal, x, mc, ksi)?
            }
            PendingOperation::ReplaceRowCol {
                ireal,
                jreal,
                x,
                y,
                delta_row,
                inv_delta_col,
                inv_delta_row,
                ratio,
            } => self.complete_replace_row_col(
                ireal,
                jreal,
                x,
                y,
                delta_row,
                inv_delta_col,
                inv_delta_row,
                ratio,
            )?,
            PendingOperation::Refill { xs, ys, matrix } => self.complete_refill(xs, ys, matrix)?,
        }

        if self.n == 0 {
            self.det = K::Value::one();
            self.sign = 1;
        } else {
            self.det = new_det;
            self.sign = new_sign;
        }
        self.n_ops += 1;
        tracing::trace!(operation = ?kind, size = self.n, "completed det_manip operation");

        if let Some(interval) = self.options.check_interval {
            if self.n_ops >= interval {
                self.periodic_check();
            }
        }
        Ok(())
    }

    fn reject_last_try(&mut self) {
        assert!(
            self.pending.take().is_some(),
            "reject_last_try called with no pending operation"
        );
    }
}
