use ndarray::Array1;

use crate::error::{Result, RoomEqError};
use crate::read::{geomspace, interpolate, interpolate_log_space};

/// Frequency response data: the common currency between all stages.
///
/// `spl` holds dB values unless stated otherwise by the producer.
/// `phase` is in degrees when present.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
	/// Frequencies in Hz, strictly increasing
	pub freq: Array1<f64>,
	/// Magnitude, same length as `freq`
	pub spl: Array1<f64>,
	/// Optional phase in degrees, same length as `freq`
	pub phase: Option<Array1<f64>>,
}

impl Curve {
	/// Build a magnitude-only curve and check its invariants.
	pub fn new(freq: Array1<f64>, spl: Array1<f64>) -> Result<Self> {
		let curve = Curve { freq, spl, phase: None };
		curve.validate()?;
		Ok(curve)
	}

	/// Build a curve with phase and check its invariants.
	pub fn with_phase(freq: Array1<f64>, spl: Array1<f64>, phase: Array1<f64>) -> Result<Self> {
		let curve = Curve { freq, spl, phase: Some(phase) };
		curve.validate()?;
		Ok(curve)
	}

	/// Check non emptiness, matching lengths and a strictly increasing axis.
	pub fn validate(&self) -> Result<()> {
		if self.freq.is_empty() {
			return Err(RoomEqError::EmptyInput { what: "curve".into() });
		}
		if self.spl.len() != self.freq.len() {
			return Err(RoomEqError::LengthMismatch {
				what: "curve magnitude",
				expected: self.freq.len(),
				got: self.spl.len(),
			});
		}
		if let Some(phase) = &self.phase {
			if phase.len() != self.freq.len() {
				return Err(RoomEqError::LengthMismatch {
					what: "curve phase",
					expected: self.freq.len(),
					got: phase.len(),
				});
			}
		}
		check_increasing(&self.freq)
	}

	/// Number of points
	pub fn len(&self) -> usize {
		self.freq.len()
	}

	/// True when the curve has no point
	pub fn is_empty(&self) -> bool {
		self.freq.is_empty()
	}

	/// Resample the magnitude (and phase) onto `freq`, clamped at both ends.
	pub fn resample(&self, freq: &Array1<f64>) -> Curve {
		Curve {
			freq: freq.clone(),
			spl: interpolate(freq, &self.freq, &self.spl),
			phase: self.phase.as_ref().map(|p| interpolate(freq, &self.freq, p)),
		}
	}

	/// Copy of the curve with `db` added to the magnitude.
	pub fn shifted(&self, db: f64) -> Curve {
		Curve { freq: self.freq.clone(), spl: &self.spl + db, phase: self.phase.clone() }
	}

	/// Largest magnitude value, ignoring NaN.
	pub fn max_spl(&self) -> f64 {
		self.spl.iter().cloned().filter(|v| !v.is_nan()).fold(f64::NEG_INFINITY, f64::max)
	}

	/// Mean level between `hz_ini` and `hz_end`.
	///
	/// The curve is read on 100 geometrically spaced points, interpolating
	/// over `log10(f)`.
	pub fn flat_region_average(&self, hz_ini: f64, hz_end: f64) -> f64 {
		let grid = geomspace(hz_ini, hz_end, 100);
		interpolate_log_space(&grid, &self.freq, &self.spl).mean().unwrap_or(0.0)
	}
}

/// Check that `freq` is strictly increasing.
pub fn check_increasing(freq: &Array1<f64>) -> Result<()> {
	for i in 1..freq.len() {
		if !(freq[i] > freq[i - 1]) {
			return Err(RoomEqError::NonIncreasingFrequencies { index: i });
		}
	}
	Ok(())
}

/// Average several dB curves on the linear magnitude.
///
/// Curves on a different grid are interpolated onto the grid of the first one.
pub fn average_curves(curves: &[Curve]) -> Result<Curve> {
	let first = curves
		.first()
		.ok_or_else(|| RoomEqError::EmptyInput { what: "no curve to average".into() })?;
	if curves.len() == 1 {
		return Ok(Curve { phase: None, ..first.clone() });
	}
	let mut acc = Array1::<f64>::zeros(first.len());
	for c in curves {
		c.validate()?;
		let spl = if c.freq == first.freq { c.spl.clone() } else { c.resample(&first.freq).spl };
		acc += &spl.mapv(|db| 10f64.powf(db / 20.0));
	}
	let n = curves.len() as f64;
	log::info!("averaged {} curves on {} points", curves.len(), first.len());
	Curve::new(first.freq.clone(), acc.mapv(|m| 20.0 * (m / n).log10()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use ndarray::array;

	#[test]
	fn test_validate_rejects_bad_axes() {
		assert!(Curve::new(array![1.0, 2.0, 3.0], array![0.0, 0.0, 0.0]).is_ok());
		assert!(matches!(
			Curve::new(array![1.0, 2.0, 2.0], array![0.0, 0.0, 0.0]),
			Err(RoomEqError::NonIncreasingFrequencies { index: 2 })
		));
		assert!(matches!(
			Curve::new(array![1.0, 2.0], array![0.0]),
			Err(RoomEqError::LengthMismatch { expected: 2, got: 1, .. })
		));
		assert!(Curve::with_phase(array![1.0, 2.0], array![0.0, 0.0], array![0.0]).is_err());
	}

	#[test]
	fn test_average_of_identical_curves_is_identity() {
		let c = Curve::new(array![10.0, 100.0, 1000.0], array![-3.0, 0.0, 6.0]).unwrap();
		let avg = average_curves(&[c.clone(), c.clone(), c.clone()]).unwrap();
		for i in 0..3 {
			assert!((avg.spl[i] - c.spl[i]).abs() < 1e-12);
		}
	}

	#[test]
	fn test_flat_region_average() {
		let c = Curve::new(array![20.0, 200.0, 4000.0, 20000.0], array![-10.0, 3.0, 3.0, 12.0]).unwrap();
		assert!((c.flat_region_average(200.0, 4000.0) - 3.0).abs() < 1e-9);
	}

	#[test]
	fn test_average_is_on_linear_magnitude() {
		let a = Curve::new(array![10.0, 20.0], array![0.0, 0.0]).unwrap();
		let b = Curve::new(array![10.0, 20.0], array![-200.0, -200.0]).unwrap();
		let avg = average_curves(&[a, b]).unwrap();
		// (1 + ~0) / 2 -> -6.02 dB
		assert!((avg.spl[0] + 6.0206).abs() < 1e-3, "{}", avg.spl[0]);
	}
}
