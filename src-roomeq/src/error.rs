//! Error types for the roomeq crate.
//!
//! Configuration and consistency problems abort a call through [`Result`].
//! Measurement quality and optimiser convergence travel as data next to the
//! result (see [`crate::quality::MeasurementWarning`] and
//! [`crate::peq::OptimizerInfo`]).

use thiserror::Error;

/// Error type for roomeq operations.
#[derive(Debug, Error)]
pub enum RoomEqError {
	/// The sample rate is not one of the supported rates.
	#[error("invalid sample rate {fs} Hz, expected one of {valid:?}")]
	InvalidSampleRate {
		/// Requested sample rate.
		fs: u32,
		/// Accepted sample rates.
		valid: &'static [u32],
	},

	/// A size that must be a power of two is not.
	#[error("{what} must be a power of two >= {min}, got {value}")]
	NotPowerOfTwo {
		/// Name of the parameter.
		what: &'static str,
		/// Offending value.
		value: usize,
		/// Smallest accepted value.
		min: usize,
	},

	/// A strategy or mode name that is not recognised.
	#[error("unknown {kind} '{name}'")]
	UnknownName {
		/// Kind of name (strategy, system type, ...).
		kind: &'static str,
		/// The rejected name.
		name: String,
	},

	/// A `(min, max)` pair with `min > max`.
	#[error("invalid bounds for {what}: min {min} > max {max}")]
	InvalidBounds {
		/// Name of the bounded parameter.
		what: &'static str,
		/// Lower bound.
		min: f64,
		/// Upper bound.
		max: f64,
	},

	/// A configuration value outside its accepted range.
	#[error("invalid value for {what}: {message}")]
	InvalidParameter {
		/// Name of the parameter.
		what: &'static str,
		/// What is wrong with it.
		message: String,
	},

	/// A frequency axis that is not strictly increasing.
	#[error("frequency axis is not strictly increasing at index {index}")]
	NonIncreasingFrequencies {
		/// First index where `freq[index] <= freq[index - 1]`.
		index: usize,
	},

	/// Two arrays that must have the same length do not.
	#[error("length mismatch for {what}: expected {expected}, got {got}")]
	LengthMismatch {
		/// What was compared.
		what: &'static str,
		/// Expected length.
		expected: usize,
		/// Actual length.
		got: usize,
	},

	/// A curve or buffer with no usable data.
	#[error("empty input: {what}")]
	EmptyInput {
		/// What was empty.
		what: String,
	},

	/// A file that could not be parsed.
	#[error("failed to parse '{path}': {message}")]
	Parse {
		/// Path of the file.
		path: String,
		/// Description of the failure.
		message: String,
	},

	/// An even-length half spectrum where an odd one is needed.
	#[error("half spectrum must have an odd length, got {len}")]
	EvenSpectrum {
		/// Length of the half spectrum.
		len: usize,
	},

	/// The inverse FFT of a supposedly hermitian spectrum is not real.
	#[error("impulse response has a non negligible imaginary part (max {max_imag:.3e})")]
	ImaginaryResidual {
		/// Largest absolute imaginary sample.
		max_imag: f64,
	},

	/// The optimiser could not even start.
	#[error("optimization failed: {message}")]
	OptimizationFailed {
		/// Error message describing the failure.
		message: String,
	},

	/// I/O error wrapper.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// CSV error wrapper.
	#[error("CSV error: {0}")]
	Csv(#[from] csv::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// WAV error wrapper.
	#[error("WAV error: {0}")]
	Wav(#[from] hound::Error),
}

/// Result type alias for roomeq operations.
pub type Result<T> = std::result::Result<T, RoomEqError>;

impl RoomEqError {
	/// Returns true if the error comes from invalid user input or configuration.
	pub fn is_configuration_error(&self) -> bool {
		matches!(
			self,
			RoomEqError::InvalidSampleRate { .. }
				| RoomEqError::NotPowerOfTwo { .. }
				| RoomEqError::UnknownName { .. }
				| RoomEqError::InvalidBounds { .. }
				| RoomEqError::InvalidParameter { .. }
				| RoomEqError::NonIncreasingFrequencies { .. }
				| RoomEqError::LengthMismatch { .. }
				| RoomEqError::EmptyInput { .. }
		)
	}

	/// Returns true if the error is an internal consistency failure.
	pub fn is_internal_error(&self) -> bool {
		matches!(self, RoomEqError::EvenSpectrum { .. } | RoomEqError::ImaginaryResidual { .. })
	}

	/// Returns true if this is a file/IO error.
	pub fn is_io_error(&self) -> bool {
		matches!(
			self,
			RoomEqError::Io(_)
				| RoomEqError::Csv(_)
				| RoomEqError::Json(_)
				| RoomEqError::Wav(_)
				| RoomEqError::Parse { .. }
		)
	}
}

impl From<roomeq_de::OptimError> for RoomEqError {
	fn from(e: roomeq_de::OptimError) -> Self {
		RoomEqError::OptimizationFailed { message: e.to_string() }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_error_categories() {
		let e = RoomEqError::InvalidBounds { what: "q", min: 2.0, max: 1.0 };
		assert!(e.is_configuration_error());
		assert!(!e.is_internal_error());
		assert_eq!(e.to_string(), "invalid bounds for q: min 2 > max 1");

		let e = RoomEqError::EvenSpectrum { len: 16 };
		assert!(e.is_internal_error());
		assert!(!e.is_configuration_error());

		let e: RoomEqError = std::io::Error::other("boom").into();
		assert!(e.is_io_error());
	}
}
