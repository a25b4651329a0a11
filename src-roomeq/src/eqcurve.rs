//! Equalization curve derived from a measured room response.
//!
//! The measurement is smoothed, referenced to its mean level in a band and
//! inverted. Boost is confined to the positive gain windows.

use ndarray::{Array1, s};

use crate::Curve;
use crate::config::{EqConfig, GainWindow};
use crate::error::{Result, RoomEqError};
use crate::smooth::{smooth, smooth_constant};

/// Gain curve (dB) to apply, with the values it was derived from.
#[derive(Debug, Clone)]
pub struct EqualizationCurve {
	/// EQ gain in dB
	pub curve: Curve,
	/// Level (dB) of the measurement moved to 0 dB
	pub ref_level: f64,
	/// Measurement minus the reference level
	pub normalized: Curve,
	/// 1/1 octave smoothed measurement minus the reference level
	pub octave: Curve,
	/// Target curve minus the reference level
	pub target: Curve,
	pub low_window: Option<GainWindow>,
	pub high_window: Option<GainWindow>,
	pub no_pos: bool,
}

fn nearest_index(freq: &Array1<f64>, f: f64) -> usize {
	let mut best = 0;
	for (i, &fi) in freq.iter().enumerate() {
		if (fi - f).abs() < (freq[best] - f).abs() {
			best = i;
		}
	}
	best
}

/// Weighted level of `octave_smoothed` between the bins nearest to `band`.
///
/// Weights decay from 1 at the low edge to `10^ln(0.5)` at the high edge.
pub fn reference_level(freq: &Array1<f64>, octave_smoothed: &Array1<f64>, band: (f64, f64)) -> Result<f64> {
	let i1 = nearest_index(freq, band.0);
	let i2 = nearest_index(freq, band.1);
	if i2 <= i1 {
		return Err(RoomEqError::InvalidParameter {
			what: "ref_band",
			message: format!("no frequency bin between {} and {} Hz", band.0, band.1),
		});
	}
	let part = octave_smoothed.slice(s![i1..i2]);
	let weights = Array1::logspace(10.0, 1f64.ln(), 0.5f64.ln(), part.len());
	let level = part.dot(&weights) / weights.sum();
	Ok((level * 100.0).round() / 100.0)
}

fn gauss_oct(f: f64, w: &GainWindow) -> f64 {
	let sigma = w.span_oct / 3.0;
	let x = (f / w.center_hz).log2() / sigma;
	(-0.5 * x * x).exp()
}

/// Unit height window applied to positive gains.
///
/// The low window only acts below its center, the high one above its center;
/// elsewhere the weight is 1.
pub fn positive_gain_window(freq: &Array1<f64>, low: Option<&GainWindow>, high: Option<&GainWindow>) -> Array1<f64> {
	freq.mapv(|f| {
		if f <= 0.0 {
			return low.map_or(1.0, |_| 0.0);
		}
		let mut w = 1.0;
		if let Some(l) = low {
			if f < l.center_hz {
				w *= gauss_oct(f, l);
			}
		}
		if let Some(h) = high {
			if f > h.center_hz {
				w *= gauss_oct(f, h);
			}
		}
		w
	})
}

/// Derive the EQ curve that flattens `measured` (dB) toward its reference level.
pub fn build(measured: &Curve, config: &EqConfig) -> Result<EqualizationCurve> {
	measured.validate()?;
	config.validate()?;
	let freq = &measured.freq;
	let mag = &measured.spl;

	let rmag = smooth_constant(freq, mag, 1.0);
	let ref_level = match config.ref_level {
		Some(level) => {
			log::info!("given ref level: {} dB --> 0 dB", level);
			level
		}
		None => {
			let level = reference_level(freq, &rmag, config.ref_band)?;
			log::info!("estimated ref level: {} dB --> 0 dB", level);
			level
		}
	};

	log::debug!(
		"target smoothing 1/{} oct, transition at {:.1} Hz ({:?})",
		config.noct,
		config.transition_hz(),
		config.speed
	);
	let target = smooth(freq, mag, &config.target_profile()) - ref_level;
	let rmag = rmag - ref_level;
	let normalized = mag - ref_level;

	let eq = -&target;
	let mut pos = eq.mapv(|v| v.max(0.0));
	let neg = eq.mapv(|v| v.min(0.0));
	if config.no_pos {
		pos.fill(0.0);
	} else {
		pos *= &positive_gain_window(freq, config.low_window.as_ref(), config.high_window.as_ref());
	}
	let eq = smooth_constant(freq, &(pos + neg), config.final_noct);

	Ok(EqualizationCurve {
		curve: Curve::new(freq.clone(), eq)?,
		ref_level,
		normalized: Curve::new(freq.clone(), normalized)?,
		octave: Curve::new(freq.clone(), rmag)?,
		target: Curve::new(freq.clone(), target)?,
		low_window: config.low_window,
		high_window: config.high_window,
		no_pos: config.no_pos,
	})
}
