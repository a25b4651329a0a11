//! Logarithmic sine sweep used as the measurement excitation.
//!
//! The sweep occupies the first `3N/4` samples, the last `N/4` are a silent
//! pad that absorbs the playback/capture latency. Both ends are faded with a
//! half Hann window between `f_start..f1` and `f2..f_stop`.

use ndarray::Array1;
use std::f64::consts::PI;

use crate::config::MeasurementConfig;
use crate::error::Result;

/// An immutable excitation sweep and its tapered playback version.
#[derive(Debug, Clone)]
pub struct Sweep {
	/// Sample rate in Hz
	pub fs: u32,
	/// Total length in samples
	pub n: usize,
	/// Number of sweep samples before the zero pad
	pub ns: usize,
	pub f_start: f64,
	pub f1: f64,
	pub f2: f64,
	pub f_stop: f64,
	/// Raw sweep, zero in the pad
	pub raw: Array1<f64>,
	/// Faded sweep sent to the DAC (before level scaling)
	pub tapered: Array1<f64>,
	/// End of the fade in
	pub index_f1: usize,
	/// Start of the fade out
	pub index_f2: usize,
}

impl Sweep {
	/// Build the sweep described by `config`.
	pub fn from_config(config: &MeasurementConfig) -> Result<Self> {
		config.validate()?;
		Ok(Self::build(config.fs, config.n, config.f_start, config.f1, config.f2(), config.f_stop()))
	}

	/// Build a sweep of `n` samples from `f_start` to `f_stop`.
	///
	/// Arguments are assumed valid, see [`MeasurementConfig::validate`].
	pub fn build(fs: u32, n: usize, f_start: f64, f1: f64, f2: f64, f_stop: f64) -> Self {
		let fsf = fs as f64;
		let npad = n / 4;
		let ns = n - npad;
		let ts_dur = ns as f64 / fsf;
		// time for the frequency to grow by a factor e
		let ls = ts_dur / (f_stop / f_start).ln();

		let index_f1 = ((fsf * ls * (f1 / f_start).ln()).round() as usize + 1).min(ns);
		let index_f2 = ((fsf * ls * (f2 / f_start).ln()).round() as usize + 1).clamp(index_f1, ns);

		let t = Array1::linspace(0.0, ts_dur, ns);
		let mut raw = Array1::<f64>::zeros(n);
		for (i, &ti) in t.iter().enumerate() {
			raw[i] = (2.0 * PI * f_start * ls * ((ti / ls).exp() - 1.0)).sin();
		}

		let mut window = Array1::<f64>::ones(n);
		for k in 0..index_f1 {
			window[k] = 0.5 * (1.0 - (PI * k as f64 / index_f1 as f64).cos());
		}
		let fade_out = ns - index_f2;
		for k in 0..fade_out {
			window[index_f2 + k] = 0.5 * (1.0 + (PI * k as f64 / fade_out as f64).cos());
		}
		window.slice_mut(ndarray::s![ns..]).fill(0.0);

		let tapered = &window * &raw;
		log::debug!(
			"sweep {}..{} Hz, N={} Ns={} fades at {} and {} samples",
			f_start,
			f_stop,
			n,
			ns,
			index_f1,
			index_f2
		);
		Sweep { fs, n, ns, f_start, f1, f2, f_stop, raw, tapered, index_f1, index_f2 }
	}

	/// Raw sweep with the low frequency fade in only, the deconvolution
	/// denominator.
	pub fn pre_tapered(&self) -> Array1<f64> {
		let mut out = self.raw.clone();
		for k in 0..self.index_f1 {
			out[k] *= 0.5 * (1.0 - (PI * k as f64 / self.index_f1 as f64).cos());
		}
		out
	}

	/// Length of the silent pad in samples.
	pub fn pad(&self) -> usize {
		self.n - self.ns
	}

	/// Playback buffers, one per output channel.
	///
	/// The first channel carries `sig_frac * tapered`; a second channel
	/// (reference loop) carries the same signal in anti phase.
	pub fn playback(&self, sig_frac: f64, channels: usize) -> Vec<Array1<f64>> {
		let main = &self.tapered * sig_frac;
		if channels >= 2 {
			let inverted = -&main;
			vec![main, inverted]
		} else {
			vec![main]
		}
	}

	/// Synthetic reference used when only one channel was captured.
	pub fn reference_for_mono(&self, sig_frac: f64) -> Array1<f64> {
		&self.tapered * (0.5 * sig_frac)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn small() -> Sweep {
		Sweep::build(48000, 1 << 14, 5.0, 10.0, 0.91 * 24000.0, 24000.0)
	}

	#[test]
	fn test_sweep_layout() {
		let s = small();
		assert_eq!(s.ns, 12288);
		assert_eq!(s.pad(), 4096);
		assert_eq!(s.raw.len(), s.n);
		assert!(s.raw.slice(ndarray::s![s.ns..]).iter().all(|&v| v == 0.0));
		assert!(s.tapered.slice(ndarray::s![s.ns..]).iter().all(|&v| v == 0.0));
		assert!(s.index_f1 > 1 && s.index_f1 < s.index_f2 && s.index_f2 < s.ns);
		assert_eq!(s.tapered[0], 0.0);
	}

	#[test]
	fn test_taper_is_unity_in_the_middle() {
		let s = small();
		let mid = (s.index_f1 + s.index_f2) / 2;
		assert_eq!(s.tapered[mid], s.raw[mid]);
		assert!(s.tapered.iter().all(|v| v.abs() <= 1.0));
	}

	#[test]
	fn test_playback_channels() {
		let s = small();
		let p = s.playback(0.5, 2);
		assert_eq!(p.len(), 2);
		let mid = s.n / 3;
		assert_eq!(p[0][mid], 0.5 * s.tapered[mid]);
		assert_eq!(p[1][mid], -p[0][mid]);
		assert_eq!(s.playback(0.5, 1).len(), 1);
		assert_eq!(s.reference_for_mono(0.5)[mid], 0.25 * s.tapered[mid]);
	}

	#[test]
	fn test_pre_tapered_keeps_the_high_end() {
		let s = small();
		let lw = s.pre_tapered();
		let k = s.index_f2 + 10;
		assert_eq!(lw[k], s.raw[k]);
		assert!(lw[s.index_f1 / 2].abs() <= s.raw[s.index_f1 / 2].abs());
	}

	#[test]
	fn test_from_config_validates() {
		let cfg = MeasurementConfig { n: 1 << 12, ..Default::default() };
		let s = Sweep::from_config(&cfg).unwrap();
		assert_eq!(s.n, 4096);
		let bad = MeasurementConfig { f1: 1.0, ..Default::default() };
		assert!(Sweep::from_config(&bad).is_err());
	}
}
