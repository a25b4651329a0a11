use ndarray::Array1;

use crate::OptimError;

/// Box constraints `lower <= x <= upper`
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
	/// Lower bounds
	pub lower: Array1<f64>,
	/// Upper bounds
	pub upper: Array1<f64>,
}

impl Bounds {
	/// Build and validate bounds from two vectors.
	///
	/// # Errors
	/// Returns an error when lengths differ, when a bound is not finite,
	/// when `upper < lower` or when there is no parameter at all.
	pub fn new(lower: Array1<f64>, upper: Array1<f64>) -> Result<Self, OptimError> {
		if lower.len() != upper.len() {
			return Err(OptimError::BoundsLengthMismatch { lower: lower.len(), upper: upper.len() });
		}
		if lower.is_empty() {
			return Err(OptimError::EmptyProblem);
		}
		for i in 0..lower.len() {
			if !lower[i].is_finite() || !upper[i].is_finite() {
				return Err(OptimError::NonFiniteBound { index: i });
			}
			if upper[i] < lower[i] {
				return Err(OptimError::InvertedBound { index: i, lower: lower[i], upper: upper[i] });
			}
		}
		Ok(Self { lower, upper })
	}

	/// Build bounds from `(lower, upper)` pairs, SciPy style.
	pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self, OptimError> {
		let lower = pairs.iter().map(|p| p.0).collect::<Array1<f64>>();
		let upper = pairs.iter().map(|p| p.1).collect::<Array1<f64>>();
		Self::new(lower, upper)
	}

	/// Number of parameters
	pub fn len(&self) -> usize {
		self.lower.len()
	}

	/// True when there is no parameter
	pub fn is_empty(&self) -> bool {
		self.lower.is_empty()
	}

	/// Check that `x` has the right dimension.
	pub fn check_dimension(&self, x: &Array1<f64>) -> Result<(), OptimError> {
		if x.len() != self.len() {
			return Err(OptimError::DimensionMismatch { expected: self.len(), got: x.len() });
		}
		Ok(())
	}

	/// Project `x` onto the box in place.
	pub fn clip(&self, x: &mut Array1<f64>) {
		for i in 0..x.len() {
			x[i] = x[i].clamp(self.lower[i], self.upper[i]);
		}
	}

	/// Return a projected copy of `x`.
	pub fn clipped(&self, x: &Array1<f64>) -> Array1<f64> {
		let mut y = x.clone();
		self.clip(&mut y);
		y
	}

	/// True when the parameter has `lower == upper`
	pub fn is_fixed(&self, i: usize) -> bool {
		self.upper[i] - self.lower[i] <= 0.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ndarray::array;

	#[test]
	fn test_bounds_validation() {
		assert!(Bounds::from_pairs(&[(0.0, 1.0), (-2.0, 2.0)]).is_ok());
		assert_eq!(
			Bounds::from_pairs(&[(0.0, 1.0), (3.0, 2.0)]),
			Err(OptimError::InvertedBound { index: 1, lower: 3.0, upper: 2.0 })
		);
		assert_eq!(Bounds::from_pairs(&[]), Err(OptimError::EmptyProblem));
		assert!(matches!(
			Bounds::new(array![0.0], array![1.0, 2.0]),
			Err(OptimError::BoundsLengthMismatch { lower: 1, upper: 2 })
		));
		assert!(matches!(
			Bounds::from_pairs(&[(f64::NEG_INFINITY, 1.0)]),
			Err(OptimError::NonFiniteBound { index: 0 })
		));
	}

	#[test]
	fn test_clip() {
		let b = Bounds::from_pairs(&[(0.0, 1.0), (-2.0, 2.0), (5.0, 5.0)]).unwrap();
		let x = b.clipped(&array![1.5, -3.0, 1.0]);
		assert_eq!(x, array![1.0, -2.0, 5.0]);
		assert!(b.is_fixed(2));
		assert!(!b.is_fixed(0));
	}
}
