//! Incremental determinant manipulation
//!
//! This crate maintains the determinant and the inverse of a matrix
//! `M[i][j] = F(x_i, y_j)` built from a kernel function `F` and two lists of
//! arguments, under a stream of small modifications:
//! - `DetManip`: incremental engine, O(n^2) per rank-1 change
//! - `DetManipBasic`: reference engine recomputing everything by LU
//! - `DeterminantManipulator`: the try / complete / reject interface shared by both
//!
//! Every change is first proposed with a `try_*` method, which returns the
//! ratio `det(M_new) / det(M)` and leaves the committed state untouched, then
//! applied with `complete_operation` or dropped with `reject_last_try`.
//!
//! # Example
//!
//! ```
//! use detmanip::{DetManip, DeterminantManipulator};
//!
//! let mut d = DetManip::new(|x: &f64, y: &f64| x - y, 100);
//! d.insert_at_end(1.0, 3.0).unwrap();
//! d.insert_at_end(2.0, 4.0).unwrap();
//!
//! // M = [[-2, -3], [-1, -2]]
//! assert!((d.determinant() - 1.0).abs() < 1e-12);
//!
//! // Propose a removal and keep the current matrix
//! let ratio = d.try_remove(0, 0);
//! assert!((ratio + 2.0).abs() < 1e-12);
//! d.reject_last_try();
//! assert_eq!(d.size(), 2);
//! ```

pub mod basic;
pub mod det_manip;
pub mod error;
pub mod kernel;
pub mod matrix;
pub mod operation;
pub mod options;
pub mod scalar;
pub mod state;
pub mod traits;

// Re-export main types
pub use basic::DetManipBasic;
pub use det_manip::DetManip;
pub use error::{DetManipError, Result};
pub use kernel::Kernel;
pub use matrix::{from_vec2d, Matrix};
pub use operation::{OperationKind, RollDirection};
pub use options::DetManipOptions;
pub use scalar::Scalar;
pub use state::DetManipState;
pub use traits::DeterminantManipulator;

#[doc(hidden)]
pub use paste::paste as __paste;
