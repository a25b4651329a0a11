//! Mapping between optimiser vectors and peaking filter sets.
//!
//! A vector holds one `[log10(fc), Q, gain]` triplet per filter.

use crate::iir::{Biquad, Peq, peq_spl};
use ndarray::Array1;

/// Convert parameter vector to Peq structure
///
/// # Arguments
/// * `x` - Parameter vector with triplets [log10(freq), Q, gain] for each filter
/// * `srate` - Sample rate in Hz
///
/// # Returns
/// A Peq holding one peaking filter per triplet
pub fn x2peq(x: &[f64], srate: f64) -> Peq {
	x.chunks_exact(3).map(|p| Biquad::peak(10f64.powf(p[0]), srate, p[1], p[2])).collect()
}

/// Convert Peq structure back to parameter vector
pub fn peq2x(peq: &[Biquad]) -> Vec<f64> {
	let mut x = Vec::with_capacity(peq.len() * 3);
	for filter in peq {
		x.push(filter.freq.log10());
		x.push(filter.q);
		x.push(filter.db_gain);
	}
	x
}

/// Combined dB response of the filters described by `x` at `freqs`.
pub fn x2spl(freqs: &Array1<f64>, x: &[f64], srate: f64) -> Array1<f64> {
	peq_spl(freqs, &x2peq(x, srate))
}

/// `(fc, Q, gain)` triplets with the frequency back in Hz.
pub fn x2params(x: &[f64]) -> Vec<(f64, f64, f64)> {
	x.chunks_exact(3).map(|p| (10f64.powf(p[0]), p[1], p[2])).collect()
}

/// Optimiser vector from `(fc, Q, gain)` triplets.
pub fn params2x(params: &[(f64, f64, f64)]) -> Array1<f64> {
	params.iter().flat_map(|&(fc, q, gain)| [fc.log10(), q, gain]).collect()
}

/// Box bounds in optimiser space, repeated for `n` filters.
pub fn x_bounds(n: usize, fc: (f64, f64), q: (f64, f64), gain: (f64, f64)) -> Vec<(f64, f64)> {
	let triplet = [(fc.0.log10(), fc.1.log10()), q, gain];
	(0..n).flat_map(|_| triplet).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use ndarray::array;

	#[test]
	fn test_x2peq_and_back() {
		let x = [2.0, 1.5, -3.0, 3.0, 0.7, 2.0];
		let peq = x2peq(&x, 48000.0);
		assert_eq!(peq.len(), 2);
		assert!((peq[0].freq - 100.0).abs() < 1e-9);
		assert!((peq[1].freq - 1000.0).abs() < 1e-9);
		let back = peq2x(&peq);
		for (a, b) in back.iter().zip(x.iter()) {
			assert!((a - b).abs() < 1e-12);
		}
	}

	#[test]
	fn test_x2spl_peaks_at_gain() {
		let x = [3.0, 2.0, 6.0];
		let spl = x2spl(&array![1000.0, 20.0], &x, 48000.0);
		assert!((spl[0] - 6.0).abs() < 1e-6);
		assert!(spl[1].abs() < 0.05);
	}

	#[test]
	fn test_bounds_layout() {
		let b = x_bounds(2, (20.0, 20000.0), (0.1, 7.2), (-18.0, 3.0));
		assert_eq!(b.len(), 6);
		assert!((b[0].0 - 20f64.log10()).abs() < 1e-12);
		assert!((b[3].1 - 20000f64.log10()).abs() < 1e-12);
		assert_eq!(b[4], (0.1, 7.2));
		let x = params2x(&[(100.0, 1.0, -2.0)]);
		assert_eq!(x2params(x.as_slice().unwrap())[0].2, -2.0);
	}
}
