//! Kernel functions producing the matrix entries

use crate::scalar::Scalar;

/// A bivariate function `F(x, y)` whose values fill the matrix.
///
/// The engine assumes the function is deterministic and free of side effects:
/// incremental updates are only consistent with a full regeneration when
/// evaluating the same pair twice gives the same value.
///
/// Any `Fn(&X, &Y) -> T` closure is a kernel:
///
/// ```
/// use detmanip::Kernel;
///
/// let f = |x: &f64, y: &f64| x - y;
/// assert_eq!(f.evaluate(&1.0, &3.0), -2.0);
/// ```
pub trait Kernel<X, Y> {
    /// Scalar type of the matrix entries
    type Value: Scalar;

    /// Evaluate `F(x, y)`
    fn evaluate(&self, x: &X, y: &Y) -> Self::Value;
}

impl<X, Y, T, F> Kernel<X, Y> for F
where
    T: Scalar,
    F: Fn(&X, &Y) -> T,
{
    type Value = T;

    #[inline]
    fn evaluate(&self, x: &X, y: &Y) -> T {
        self(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    struct Exponential {
        beta: f64,
    }

    impl Kernel<f64, f64> for Exponential {
        type Value = f64;

        fn evaluate(&self, x: &f64, y: &f64) -> f64 {
            (-(x - y) / self.beta).exp()
        }
    }

    fn sum_diagonal<K: Kernel<f64, f64>>(k: &K, points: &[f64]) -> K::Value {
        points
            .iter()
            .fold(K::Value::from_f64(0.0), |acc, p| acc + k.evaluate(p, p))
    }

    #[test]
    fn test_closure_kernel() {
        let f = |x: &f64, y: &f64| x * y;
        assert_eq!(f.evaluate(&2.0, &3.0), 6.0);
        assert_eq!(sum_diagonal(&f, &[1.0, 2.0]), 5.0);
    }

    #[test]
    fn test_struct_kernel() {
        let k = Exponential { beta: 2.0 };
        assert_eq!(k.evaluate(&1.0, &1.0), 1.0);
        assert_eq!(sum_diagonal(&k, &[0.5, 3.0, 7.0]), 3.0);
    }

    #[test]
    fn test_complex_kernel_with_mixed_arguments() {
        let f = |x: &usize, y: &(f64, f64)| Complex64::new(*x as f64 * y.0, y.1);
        let v = f.evaluate(&2, &(1.5, -1.0));
        assert_eq!(v, Complex64::new(3.0, -1.0));
    }
}
