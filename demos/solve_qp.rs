//! Minimal CLI front-end: solves one hard-coded QP and prints the iterate
//! and diagnostics, mapping the outcome to a process exit code.
//!
//! ```text
//! minimize    (1/2)(x0^2 + x1^2) - x0 - 3 x1
//! subject to  x0 + x1 = 1
//!             0 <= x0 <= 1
//!             0 <= x1 <= 1
//! ```

use nalgebra::{DMatrix, DVector};
use proxqp::{Dense, Dims, PrecondMode, QpData, Settings, Solver, Status};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let dims = Dims::new(2, 1, 2);
    let mut solver = Solver::<f64, Dense>::new(dims, Settings::default());

    let data = QpData {
        h: Some(DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0])),
        g: Some(DVector::from_vec(vec![-1.0, -3.0])),
        a: Some(DMatrix::from_row_slice(1, 2, &[1.0, 1.0])),
        b: Some(DVector::from_vec(vec![1.0])),
        c: Some(DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0])),
        l: Some(DVector::from_vec(vec![0.0, 0.0])),
        u: Some(DVector::from_vec(vec![1.0, 1.0])),
    };

    if let Err(e) = solver.setup(data, PrecondMode::Execute) {
        eprintln!("setup failed: {e}");
        return ExitCode::from(2);
    }

    match solver.solve() {
        Ok(results) => {
            println!("x = {:?}", results.x.as_slice());
            println!("y = {:?}", results.y.as_slice());
            println!("z = {:?}", results.z.as_slice());
            println!(
                "outer_iters = {}, inner_iters = {}, mu_updates = {}",
                results.info.outer_iters, results.info.inner_iters, results.info.mu_updates
            );
            println!(
                "primal_residual = {:.3e}, dual_residual = {:.3e}",
                results.info.primal_residual, results.info.dual_residual
            );
            match results.info.status {
                Status::Solved => ExitCode::SUCCESS,
                Status::MaxIterReached => ExitCode::from(1),
            }
        }
        Err(e) => {
            eprintln!("solve failed: {e}");
            match e {
                proxqp::Error::DimensionMismatch { .. } => ExitCode::from(2),
                proxqp::Error::NotPSD { .. } => ExitCode::from(3),
                _ => ExitCode::from(1),
            }
        }
    }
}
