use ndarray::Array1;

use crate::{Bounds, DEConfig, DEReport, DifferentialEvolution, OptimError};

/// Convenience function mirroring SciPy's API shape (simplified):
/// - `func`: objective function mapping x -> f(x)
/// - `bounds`: vector of (lower, upper) pairs
/// - `config`: DE configuration
///
/// # Errors
/// Returns an error when the bounds are invalid or `x0` has the wrong length.
pub fn differential_evolution<F>(
	func: &F,
	bounds: &[(f64, f64)],
	config: DEConfig,
) -> Result<DEReport, OptimError>
where
	F: Fn(&Array1<f64>) -> f64 + Sync,
{
	let bounds = Bounds::from_pairs(bounds)?;
	let mut de = DifferentialEvolution::new(func, bounds);
	*de.config_mut() = config;
	de.solve()
}
