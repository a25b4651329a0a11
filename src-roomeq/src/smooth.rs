//! Fractional octave smoothing with a frequency dependent resolution.
//!
//! Each bin is replaced by the mean of the piecewise linear curve over
//! `[f·2^(-1/2N), f·2^(1/2N)]`. Above the transition frequency the result is
//! blended toward 1/1 octave smoothing, reaching it at the last bin.
//! Outside the sampled range the curve is extended flat.

use ndarray::Array1;
use rayon::prelude::*;

use crate::Curve;
use crate::config::SmoothingProfile;
use crate::error::Result;

// Running integral of the piecewise linear interpolant, clamped at both ends.
struct Integral<'a> {
	freq: &'a [f64],
	values: &'a [f64],
	prefix: Vec<f64>,
}

impl<'a> Integral<'a> {
	fn new(freq: &'a [f64], values: &'a [f64]) -> Self {
		let mut prefix = Vec::with_capacity(freq.len());
		prefix.push(0.0);
		for i in 1..freq.len() {
			let area = 0.5 * (values[i] + values[i - 1]) * (freq[i] - freq[i - 1]);
			prefix.push(prefix[i - 1] + area);
		}
		Integral { freq, values, prefix }
	}

	// ∫ from freq[0] to x
	fn at(&self, x: f64) -> f64 {
		let n = self.freq.len();
		if x <= self.freq[0] {
			return (x - self.freq[0]) * self.values[0];
		}
		if x >= self.freq[n - 1] {
			return self.prefix[n - 1] + (x - self.freq[n - 1]) * self.values[n - 1];
		}
		let j = self.freq.partition_point(|&f| f <= x) - 1;
		let dx = x - self.freq[j];
		let slope = (self.values[j + 1] - self.values[j]) / (self.freq[j + 1] - self.freq[j]);
		self.prefix[j] + self.values[j] * dx + 0.5 * slope * dx * dx
	}

	fn mean(&self, f: f64, noct: f64) -> f64 {
		let half = 2f64.powf(0.5 / noct);
		let (lo, hi) = (f / half, f * half);
		(self.at(hi) - self.at(lo)) / (hi - lo)
	}
}

fn fraction_smooth(integral: &Integral, freq: &[f64], values: &[f64], noct: f64) -> Vec<f64> {
	freq.par_iter()
		.zip(values.par_iter())
		.map(|(&f, &v)| if f > 0.0 { integral.mean(f, noct) } else { v })
		.collect()
}

/// Weight of the octave smoothed curve at `f`.
fn blend_weight(f: f64, f0: f64, f_last: f64, exponent: f64) -> f64 {
	if f <= f0 || f_last <= f0 {
		return 0.0;
	}
	let w = (f / f0).log2() / (f_last / f0).log2();
	w.clamp(0.0, 1.0).powf(exponent)
}

/// Smooth `values` sampled at `freq` according to `profile`.
///
/// `freq` must be strictly increasing and as long as `values`; a 0 Hz bin is
/// passed through unchanged.
pub fn smooth(freq: &Array1<f64>, values: &Array1<f64>, profile: &SmoothingProfile) -> Array1<f64> {
	if freq.is_empty() {
		return values.clone();
	}
	let f = freq.to_vec();
	let v = values.to_vec();
	let integral = Integral::new(&f, &v);
	let fine = fraction_smooth(&integral, &f, &v, profile.fine_fraction_oct);

	let Some(f0) = profile.transition_start_hz else {
		return Array1::from_vec(fine);
	};
	let octave = fraction_smooth(&integral, &f, &v, 1.0);
	let f_last = f[f.len() - 1];
	let p = profile.transition_speed.exponent();
	let out: Vec<f64> = f
		.par_iter()
		.enumerate()
		.map(|(i, &fi)| {
			let w = blend_weight(fi, f0, f_last, p);
			(1.0 - w) * fine[i] + w * octave[i]
		})
		.collect();
	Array1::from_vec(out)
}

/// Constant `1/noct` octave smoothing.
pub fn smooth_constant(freq: &Array1<f64>, values: &Array1<f64>, noct: f64) -> Array1<f64> {
	smooth(freq, values, &SmoothingProfile::constant(noct))
}

/// Smooth the magnitude of a curve; the phase is dropped.
pub fn smooth_curve(curve: &Curve, profile: &SmoothingProfile) -> Result<Curve> {
	curve.validate()?;
	profile.validate()?;
	Curve::new(curve.freq.clone(), smooth(&curve.freq, &curve.spl, profile))
}
