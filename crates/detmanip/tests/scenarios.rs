use approx::assert_relative_eq;
use detmanip::matrix::{determinant, eye, mat_mul};
use detmanip::{
    from_vec2d, DetManip, DetManipError, DetManipOptions, DetManipState, DeterminantManipulator,
    Matrix, OperationKind, RollDirection,
};
use num_complex::Complex64;
use std::panic::{self, AssertUnwindSafe};

fn diff(x: &f64, y: &f64) -> f64 {
    x - y
}

fn lorentz(x: &f64, y: &f64) -> f64 {
    1.0 / (1.0 + (x - y) * (x - y))
}

fn laplace(x: &f64, y: &f64) -> f64 {
    (-(x - y).abs()).exp()
}

const POISON: f64 = -99.0;

fn poisoned(x: &f64, y: &f64) -> f64 {
    assert!(*x != POISON && *y != POISON, "poisoned kernel argument");
    lorentz(x, y)
}

fn assert_matrix_close(a: &Matrix<f64>, b: &Matrix<f64>, tol: f64) {
    assert_eq!((a.nrows(), a.ncols()), (b.nrows(), b.ncols()));
    for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
        assert!((x - y).abs() < tol, "{a:?}\n!=\n{b:?}");
    }
}

fn assert_inverse_ok<K: detmanip::Kernel<f64, f64, Value = f64>>(d: &DetManip<K, f64, f64>) {
    let product = mat_mul(&d.matrix(), &d.inverse_matrix());
    assert_matrix_close(&product, &eye(d.size()), 1e-9);
}

#[test]
fn test_difference_kernel_determinant() {
    let mut d = DetManip::new(diff, 10);
    assert_eq!(d.determinant(), 1.0);

    let r = d.insert_at_end(1.0, 3.0).unwrap();
    assert_relative_eq!(r, -2.0);
    let r = d.insert_at_end(2.0, 4.0).unwrap();
    assert_relative_eq!(r, -0.5, epsilon = 1e-12);

    assert_eq!(
        d.matrix(),
        from_vec2d(vec![vec![-2.0, -3.0], vec![-1.0, -2.0]])
    );
    assert_relative_eq!(d.determinant(), 1.0, epsilon = 1e-12);
    assert_matrix_close(
        &d.inverse_matrix(),
        &from_vec2d(vec![vec![-2.0, 3.0], vec![1.0, -2.0]]),
        1e-12,
    );
}

type Engine = DetManip<fn(&f64, &f64) -> f64, f64, f64>;

#[test]
fn test_reject_leaves_state_unchanged() {
    let mut d = Engine::from_points(lorentz, vec![0.0, 1.0, 2.5], vec![0.3, 1.9, 3.1]).unwrap();
    let det = d.determinant();
    let inv = d.inverse_matrix();
    let xs = d.x_values();
    let ys = d.y_values();

    let tries: [fn(&mut Engine) -> f64; 8] = [
        |d| d.try_insert(1, 2, 4.0, 5.0),
        |d| d.try_insert2(0, 3, 1, 4, 4.0, 6.0, 5.0, 7.0),
        |d| d.try_remove(2, 0),
        |d| d.try_remove2(0, 2, 1, 2),
        |d| d.try_replace_col(1, 8.0),
        |d| d.try_replace_row(0, 8.0),
        |d| d.try_replace_row_col(2, 1, 8.0, 9.0),
        |d| d.try_refill(vec![1.0], vec![2.0]),
    ];
    for attempt in &tries {
        attempt(&mut d);
        assert!(d.pending_operation().is_some());
        d.reject_last_try();
        assert_eq!(d.pending_operation(), None);
        assert_eq!(d.x_values(), xs);
        assert_eq!(d.y_values(), ys);
        assert_eq!(d.determinant(), det);
        assert_eq!(d.inverse_matrix(), inv);
    }
}

#[test]
fn test_insert_then_remove_restores_matrix() {
    let mut d = DetManip::from_points(lorentz, vec![0.0, 1.0, 2.5], vec![0.3, 1.9, 3.1]).unwrap();
    let det = d.determinant();
    let inv = d.inverse_matrix();

    let r_in = d.insert(1, 3, 4.2, 0.9).unwrap();
    let r_out = d.remove(1, 3).unwrap();
    assert_relative_eq!(r_in * r_out, 1.0, max_relative = 1e-10);
    assert_relative_eq!(d.determinant(), det, max_relative = 1e-10);
    assert_matrix_close(&d.inverse_matrix(), &inv, 1e-10);
    assert_eq!(d.x_values(), vec![0.0, 1.0, 2.5]);
}

#[test]
fn test_batched_equals_sequential() {
    let xs = vec![0.0, 1.0, 2.5];
    let ys = vec![0.3, 1.9, 3.1];
    let mut batched = DetManip::from_points(lorentz, xs.clone(), ys.clone()).unwrap();
    let mut single = DetManip::from_points(lorentz, xs, ys).unwrap();

    // Positions of the batch refer to the final matrix, so inserting the
    // lower position first gives the same result one by one
    let r2 = batched
        .insert2(4, 1, 0, 2, 5.5, 6.5, 7.0, 0.6)
        .unwrap();
    let r_a = single.insert(1, 0, 6.5, 7.0).unwrap();
    let r_b = single.insert(4, 2, 5.5, 0.6).unwrap();

    assert_relative_eq!(r2, r_a * r_b, max_relative = 1e-10);
    assert_eq!(batched.x_values(), single.x_values());
    assert_eq!(batched.y_values(), single.y_values());
    assert_relative_eq!(batched.determinant(), single.determinant(), max_relative = 1e-10);
    assert_matrix_close(&batched.inverse_matrix(), &single.inverse_matrix(), 1e-10);

    // Removing both again, in one step and in two
    let r2 = batched.remove2(1, 4, 0, 2).unwrap();
    let r_a = single.remove(4, 2).unwrap();
    let r_b = single.remove(1, 0).unwrap();
    assert_relative_eq!(r2, r_a * r_b, max_relative = 1e-10);
    assert_eq!(batched.x_values(), vec![0.0, 1.0, 2.5]);
    assert_eq!(batched.x_values(), single.x_values());
    assert_inverse_ok(&batched);
}

#[test]
fn test_insert_k_from_empty() {
    let mut d = DetManip::new(lorentz, 2);
    let r = d
        .try_insert_k(&[2, 0, 1], &[1, 2, 0], vec![3.0, 0.0, 1.0], vec![2.2, 4.1, 0.4]);
    assert_eq!(d.pending_operation(), Some(OperationKind::InsertK));
    d.complete_operation().unwrap();

    assert_eq!(d.x_values(), vec![0.0, 1.0, 3.0]);
    assert_eq!(d.y_values(), vec![0.4, 2.2, 4.1]);
    assert_relative_eq!(r, determinant(&d.matrix()), max_relative = 1e-12);
    assert_relative_eq!(d.determinant(), determinant(&d.matrix()), max_relative = 1e-12);
    assert_inverse_ok(&d);
}

#[test]
fn test_remove_everything() {
    let mut d = DetManip::from_points(lorentz, vec![0.0, 1.0], vec![0.5, 2.0]).unwrap();
    d.swap_row(0, 1);
    d.remove_at_end().unwrap();
    let r = d.remove_at_end().unwrap();
    assert!(d.is_empty());
    assert_relative_eq!(r, 1.0 / lorentz(&1.0, &0.5), max_relative = 1e-12);
    assert_eq!(d.determinant(), 1.0);

    let mut d = DetManip::from_points(lorentz, vec![0.0, 1.0], vec![0.5, 2.0]).unwrap();
    let det = d.determinant();
    let r = d.remove2_at_end().unwrap();
    assert!(d.is_empty());
    assert_relative_eq!(r * det, 1.0, max_relative = 1e-12);
}

#[test]
fn test_growth_beyond_capacity() {
    let mut d = DetManip::new(laplace, 1);
    for l in 0..20 {
        let t = l as f64 * 1.3;
        d.insert_at_end(t, t + 0.05).unwrap();
    }
    d.insert2(0, 5, 3, 21, 30.0, 33.0, 30.05, 33.05).unwrap();
    assert_eq!(d.size(), 22);
    assert!(d.capacity() >= 22);
    assert_inverse_ok(&d);
    assert_relative_eq!(
        d.determinant(),
        determinant(&d.matrix()),
        max_relative = 1e-8
    );
}

#[test]
fn test_refill_and_empty_refill() {
    let mut d = DetManip::from_points(lorentz, vec![0.0, 1.0], vec![0.5, 2.0]).unwrap();
    let det = d.determinant();
    let xs = vec![3.0, 1.0, 4.0];
    let ys = vec![1.5, 9.0, 2.6];
    let r = d.refill(xs.clone(), ys.clone()).unwrap();
    assert_eq!(d.x_values(), xs);
    assert_eq!(d.x_values_internal_order(), &xs[..]);
    assert_relative_eq!(r * det, d.determinant(), max_relative = 1e-12);
    assert_inverse_ok(&d);

    let det = d.determinant();
    let r = d.refill(Vec::new(), Vec::new()).unwrap();
    assert!(d.is_empty());
    assert_relative_eq!(r, 1.0 / det, max_relative = 1e-12);
    assert_eq!(d.determinant(), 1.0);
}

#[test]
fn test_replace_updates_arguments() {
    let mut d = DetManip::from_points(lorentz, vec![0.0, 1.0, 2.0], vec![0.5, 2.0, 3.3]).unwrap();
    d.replace_col(1, 7.0).unwrap();
    d.replace_row(2, -1.0).unwrap();
    d.replace_row_col(0, 2, 4.4, -2.0).unwrap();
    assert_eq!(d.x_values(), vec![4.4, 1.0, -1.0]);
    assert_eq!(d.y_values(), vec![0.5, 7.0, -2.0]);
    assert_eq!(*d.get_x(2), -1.0);
    assert_eq!(*d.get_y(1), 7.0);
    assert_relative_eq!(d.matrix_entry(0, 2), lorentz(&4.4, &-2.0));
    assert_inverse_ok(&d);
}

#[test]
fn test_swap_roll_and_regenerate_agree() {
    let mut d = DetManip::from_points(
        lorentz,
        vec![0.0, 1.0, 2.0, 3.5],
        vec![0.5, 2.0, 3.3, 4.0],
    )
    .unwrap();
    d.remove(1, 2).unwrap();
    d.insert(0, 3, 6.0, 6.6).unwrap();

    d.swap_col(0, 3);
    d.swap_row(1, 2);
    // cycles of even length are odd permutations
    assert_eq!(d.roll_matrix(RollDirection::Right), -1);
    assert_eq!(d.roll_matrix(RollDirection::Up), -1);
    let det = d.determinant();
    assert_relative_eq!(det, determinant(&d.matrix()), max_relative = 1e-10);
    assert_inverse_ok(&d);

    d.regenerate().unwrap();
    assert_relative_eq!(d.determinant(), det, max_relative = 1e-10);
    assert_eq!(d.n_operations_since_regeneration(), 0);
}

#[test]
fn test_inverse_entries_follow_logical_order() {
    let mut d = DetManip::from_points(lorentz, vec![0.0, 1.0, 2.0], vec![0.5, 2.0, 3.3]).unwrap();
    d.remove(0, 1).unwrap();
    d.insert(2, 0, 5.0, 5.5).unwrap();
    let inv = d.inverse_matrix();
    for i in 0..d.size() {
        for j in 0..d.size() {
            assert_eq!(d.inverse_matrix_entry(i, j), inv[[i, j]]);
        }
    }
    assert_eq!(d.inverse_matrix_internal_order().nrows(), 3);
}

#[test]
fn test_checkpoint_json_roundtrip() {
    let mut d = DetManip::with_options(
        lorentz,
        8,
        DetManipOptions::default().with_check_interval(100),
    );
    d.insert_at_end(0.0, 0.4).unwrap();
    d.insert(0, 0, 1.0, 1.7).unwrap();
    d.insert(1, 2, 2.5, 3.1).unwrap();
    d.swap_row(0, 2);

    let json = serde_json::to_string(&d.state()).unwrap();
    let state: DetManipState<f64, f64, f64> = serde_json::from_str(&json).unwrap();
    let mut restored = DetManip::from_state(lorentz, state).unwrap();

    assert_eq!(restored.options(), d.options());
    assert_eq!(restored.x_values(), d.x_values());
    assert_eq!(restored.determinant(), d.determinant());
    assert_eq!(restored.inverse_matrix(), d.inverse_matrix());

    let r1 = restored.try_remove(1, 1);
    let r2 = d.try_remove(1, 1);
    assert_eq!(r1, r2);
}

#[test]
fn test_from_state_rejects_inconsistent_checkpoint() {
    let d = DetManip::from_points(lorentz, vec![0.0, 1.0], vec![0.5, 2.0]).unwrap();
    let mut state = d.state();
    state.row_num = vec![1, 1];
    assert!(matches!(
        DetManip::from_state(lorentz, state),
        Err(DetManipError::InvalidState { .. })
    ));
}

#[test]
fn test_singular_points_are_reported() {
    let r = DetManip::from_points(diff, vec![0.0, 1.0, 2.0], vec![0.0, 1.0, 2.0]);
    assert!(matches!(r, Err(DetManipError::SingularMatrix)));

    let mut d = DetManip::from_points(lorentz, vec![0.0, 1.0], vec![0.5, 2.0]).unwrap();
    // duplicating an existing row argument makes the matrix singular
    let ratio = d.try_replace_row(1, 0.0);
    assert_relative_eq!(ratio, 0.0, epsilon = 1e-12);
    d.reject_last_try();
    assert!(!d.is_singular());
}

#[test]
fn test_complex_kernel() {
    let kernel = |x: &f64, y: &f64| Complex64::new(1.0 / (1.0 + (x - y).abs()), x * y);
    let mut d = DetManip::new(kernel, 4);
    d.insert_at_end(0.0, 1.0).unwrap();
    d.insert_at_end(1.0, 0.0).unwrap();
    d.insert(1, 0, 2.0, 3.0).unwrap();

    let expected = determinant(&d.matrix());
    assert!((d.determinant() - expected).norm() < 1e-12);

    let product = mat_mul(&d.matrix(), &d.inverse_matrix());
    let id: Matrix<Complex64> = eye(3);
    for (a, b) in product.as_slice().iter().zip(id.as_slice()) {
        assert!((a - b).norm() < 1e-10);
    }
}

#[test]
fn test_panicking_kernel_leaves_state_intact() {
    let mut d = Engine::from_points(poisoned, vec![0.0, 1.0, 2.5], vec![0.3, 1.9, 3.1]).unwrap();
    let det = d.determinant();
    let inv = d.inverse_matrix();
    let xs = d.x_values();
    let ys = d.y_values();

    let failing: [fn(&mut Engine) -> f64; 7] = [
        |d| d.try_insert(1, 2, POISON, 5.0),
        |d| d.try_insert2(0, 3, 1, 4, 4.0, 6.0, 5.0, POISON),
        |d| d.try_replace_col(1, POISON),
        |d| d.try_replace_row(0, POISON),
        |d| d.try_replace_row_col(2, 1, 8.0, POISON),
        |d| d.try_refill(vec![POISON], vec![2.0]),
        |d| {
            d.try_insert_from_function(0, 0, 4.0, 5.0, |_| panic!("no cached value"), |_| 1.0, 1.0)
        },
    ];
    for attempt in failing {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| attempt(&mut d)));
        assert!(outcome.is_err());
        assert_eq!(d.pending_operation(), None);
        assert_eq!(d.size(), 3);
        assert_eq!(d.x_values(), xs);
        assert_eq!(d.y_values(), ys);
        assert_eq!(d.determinant(), det);
        assert_eq!(d.inverse_matrix(), inv);
    }

    // The engine stays usable afterwards
    d.insert(1, 1, 4.0, 5.0).unwrap();
    assert_eq!(d.size(), 4);
    assert_inverse_ok(&d);
}
