//! Toy Metropolis walk over the expansion order of a determinant.
//!
//! Each configuration is a set of imaginary times `tau_1 .. tau_n`; its weight
//! is `(beta U)^n / n! * det M` with `M[i][j] = g(tau_i - tau_j)`. Moves insert
//! or remove one time, and the acceptance ratio only needs the determinant
//! ratio returned by the try.
//!
//! Run with `cargo run --example metropolis_walk`.

use detmanip::{DetManip, DetManipOptions, DeterminantManipulator};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const BETA: f64 = 10.0;
const COUPLING: f64 = 0.5;

const ENERGY: f64 = 0.3;

/// Antiperiodic free propagator of a single level
fn g(tau_x: &f64, tau_y: &f64) -> f64 {
    let tau = tau_x - tau_y;
    let norm = 1.0 + (-BETA * ENERGY).exp();
    if tau > 0.0 {
        -(-ENERGY * tau).exp() / norm
    } else {
        (-ENERGY * (tau + BETA)).exp() / norm
    }
}

fn main() -> detmanip::Result<()> {
    let options = DetManipOptions::default().with_check_interval(200);
    let mut d = DetManip::with_options(g, 32, options);
    let mut rng = ChaCha8Rng::seed_from_u64(2024);

    let n_steps = 100_000;
    let mut accepted = 0usize;
    let mut order_sum = 0usize;

    for _ in 0..n_steps {
        let n = d.size();
        let insert = rng.random::<bool>();

        let ratio = if insert {
            let tau = rng.random::<f64>() * BETA;
            let r = d.try_insert(n, n, tau, tau);
            r * BETA * COUPLING / (n + 1) as f64
        } else if n > 0 {
            let k = rng.random_range(0..n);
            let r = d.try_remove(k, k);
            r * n as f64 / (BETA * COUPLING)
        } else {
            order_sum += n;
            continue;
        };

        if rng.random::<f64>() < ratio.abs() {
            d.complete_operation()?;
            accepted += 1;
        } else {
            d.reject_last_try();
        }
        order_sum += d.size();
    }

    d.regenerate()?;
    println!("accepted {accepted} of {n_steps} moves");
    println!(
        "average expansion order {:.3}",
        order_sum as f64 / n_steps as f64
    );
    println!("final order {} with det {:.6e}", d.size(), d.determinant());
    Ok(())
}
