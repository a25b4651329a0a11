use thiserror::Error;

/// Errors raised before or by an optimisation run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimError {
	/// Lower and upper bound vectors differ in length.
	#[error("bounds length mismatch: lower={lower}, upper={upper}")]
	BoundsLengthMismatch {
		/// Length of the lower bounds.
		lower: usize,
		/// Length of the upper bounds.
		upper: usize,
	},

	/// A bound pair has `upper < lower`.
	#[error("bound[{index}] has upper {upper} < lower {lower}")]
	InvertedBound {
		/// Parameter index.
		index: usize,
		/// Lower bound.
		lower: f64,
		/// Upper bound.
		upper: f64,
	},

	/// A bound is NaN or infinite.
	#[error("bound[{index}] is not finite")]
	NonFiniteBound {
		/// Parameter index.
		index: usize,
	},

	/// The starting point does not match the problem dimension.
	#[error("dimension mismatch: expected {expected} parameters, got {got}")]
	DimensionMismatch {
		/// Number of parameters in the bounds.
		expected: usize,
		/// Number of parameters provided.
		got: usize,
	},

	/// No parameters to optimise.
	#[error("empty problem: no parameters to optimise")]
	EmptyProblem,

	/// The local solver rejected the problem.
	#[error("local solver failed: {message}")]
	Solver {
		/// Solver status.
		message: String,
	},
}
