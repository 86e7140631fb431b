//! Tuning knobs for the numerical bookkeeping of the engine

use serde::{Deserialize, Serialize};

/// Options controlling drift checks and singularity detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetManipOptions {
    /// Number of committed operations after which the incremental inverse is
    /// compared against a fresh inversion and replaced by it.
    /// `None` disables the automatic check; the owner calls
    /// `regenerate`/`check_inverse` itself.
    pub check_interval: Option<u64>,
    /// `|det|` below this value is considered singular.
    /// `None` means "not a normal floating point number".
    pub singular_threshold: Option<f64>,
    /// Relative deviation of the inverse above which a warning is logged
    pub precision_warning: f64,
    /// Relative deviation of the inverse above which the check fails
    pub precision_error: f64,
}

impl Default for DetManipOptions {
    fn default() -> Self {
        Self {
            check_interval: None,
            singular_threshold: None,
            precision_warning: 1e-8,
            precision_error: 1e-5,
        }
    }
}

impl DetManipOptions {
    /// Enable the periodic drift check every `n` committed operations
    pub fn with_check_interval(mut self, n: u64) -> Self {
        self.check_interval = Some(n);
        self
    }

    /// Use an absolute threshold on `|det|` for singularity detection
    pub fn with_singular_threshold(mut self, threshold: f64) -> Self {
        self.singular_threshold = Some(threshold);
        self
    }

    /// Whether `|det|` counts as zero
    pub fn is_singular(&self, abs_det: f64) -> bool {
        match self.singular_threshold {
            Some(threshold) => abs_det < threshold,
            None => !abs_det.is_normal(),
        }
    }
}
