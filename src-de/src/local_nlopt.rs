// NLOPT-specific local search

use std::cell::Cell;

use ndarray::Array1;
use nlopt::{Algorithm, FailState, Nlopt, SuccessState, Target};

use crate::local::{LocalAlgorithm, LocalConfig, LocalReport};
use crate::{Bounds, OptimError};

fn nlopt_algorithm(algo: LocalAlgorithm) -> Algorithm {
	match algo {
		LocalAlgorithm::Lbfgs => Algorithm::Lbfgs,
		LocalAlgorithm::Slsqp => Algorithm::Slsqp,
		LocalAlgorithm::Bobyqa => Algorithm::Bobyqa,
		LocalAlgorithm::Cobyla => Algorithm::Cobyla,
		LocalAlgorithm::Neldermead => Algorithm::Neldermead,
		LocalAlgorithm::Sbplx => Algorithm::Sbplx,
	}
}

fn solver_error(state: FailState) -> OptimError {
	OptimError::Solver { message: format!("{:?}", state) }
}

/// Central differences; returns the number of evaluations used.
fn central_gradient<F>(func: &F, x: &[f64], step: f64, grad: &mut [f64]) -> usize
where
	F: Fn(&Array1<f64>) -> f64,
{
	let mut xp = Array1::from(x.to_vec());
	for i in 0..x.len() {
		let h = step * x[i].abs().max(1.0);
		xp[i] = x[i] + h;
		let fp = func(&xp);
		xp[i] = x[i] - h;
		let fm = func(&xp);
		xp[i] = x[i];
		grad[i] = (fp - fm) / (2.0 * h);
	}
	2 * x.len()
}

/// Minimise `func` inside `bounds` from `x0` with an NLopt local algorithm.
///
/// `x0` is projected onto the bounds first. A run stopped by its evaluation
/// budget returns its best point with `success == false`; a run limited by
/// roundoff is considered converged.
///
/// # Errors
/// Returns an error on a dimension mismatch or when NLopt rejects the
/// problem.
pub fn nlopt_minimize<F>(func: &F, x0: &Array1<f64>, bounds: &Bounds, config: &LocalConfig) -> Result<LocalReport, OptimError>
where
	F: Fn(&Array1<f64>) -> f64,
{
	bounds.check_dimension(x0)?;
	let calls = Cell::new(0usize);
	let evals = Cell::new(0usize);
	let step = config.fd_step;

	let objective = |x: &[f64], gradient: Option<&mut [f64]>, _: &mut ()| -> f64 {
		calls.set(calls.get() + 1);
		let mut nfev = 1;
		if let Some(g) = gradient {
			nfev += central_gradient(func, x, step, g);
		}
		evals.set(evals.get() + nfev);
		let f = func(&Array1::from(x.to_vec()));
		if f.is_finite() { f } else { f64::MAX }
	};

	let mut optimizer = Nlopt::new(nlopt_algorithm(config.algorithm), bounds.len(), objective, Target::Minimize, ());
	optimizer.set_lower_bounds(&bounds.lower.to_vec()).map_err(solver_error)?;
	optimizer.set_upper_bounds(&bounds.upper.to_vec()).map_err(solver_error)?;
	optimizer.set_maxeval(config.maxeval as u32).map_err(solver_error)?;
	optimizer.set_ftol_rel(config.ftol_rel).map_err(solver_error)?;
	optimizer.set_xtol_rel(config.xtol_rel).map_err(solver_error)?;

	let mut x = bounds.clipped(x0).to_vec();
	let (success, message, fun) = match optimizer.optimize(&mut x) {
		Ok((SuccessState::MaxEvalReached, f)) => {
			(false, format!("maximum evaluations reached: {}", config.maxeval), f)
		}
		Ok((SuccessState::MaxTimeReached, f)) => (false, "maximum time reached".to_string(), f),
		Ok((state, f)) => (true, format!("{:?}", state), f),
		Err((FailState::RoundoffLimited, f)) => (true, "RoundoffLimited".to_string(), f),
		Err((state @ (FailState::InvalidArgs | FailState::OutOfMemory), _)) => return Err(solver_error(state)),
		Err((state, f)) => (false, format!("{:?}", state), f),
	};
	log::debug!("{} stopped after {} calls: {} (f={:.6e})", config.algorithm, calls.get(), message, fun);

	Ok(LocalReport { x: Array1::from(x), fun, success, message, nit: calls.get(), nfev: evals.get() })
}

#[cfg(test)]
mod tests {
	use super::*;
	use ndarray::array;

	fn sphere(x: &Array1<f64>) -> f64 {
		x.iter().map(|v| v * v).sum()
	}

	#[test]
	fn test_central_gradient() {
		let mut g = [0.0; 2];
		let n = central_gradient(&sphere, &[1.0, -2.0], 1e-6, &mut g);
		assert_eq!(n, 4);
		assert!((g[0] - 2.0).abs() < 1e-6);
		assert!((g[1] + 4.0).abs() < 1e-6);
	}

	#[test]
	fn test_dimension_is_checked() {
		let b = Bounds::from_pairs(&[(-1.0, 1.0); 2]).unwrap();
		let err = nlopt_minimize(&sphere, &array![0.5], &b, &LocalConfig::default()).unwrap_err();
		assert_eq!(err, OptimError::DimensionMismatch { expected: 2, got: 1 });
	}
}
