use ndarray::Array1;
use serde::Serialize;
use std::fmt;

use crate::Curve;

/// Non fatal problems found while measuring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MeasurementWarning {
	/// The latency does not fit in the silent pad
	PoorTimeClearance { offset: i64, pad: usize },
	/// The reference channel is too weak, the DUT channel was used to align
	WeakReference,
	/// A captured channel peaks at or above the clip warning level
	CaptureNearFullScale { channel: &'static str, peak_dbfs: f64 },
	/// The measured response peaks above 0 dB
	Clipping { max_db: f64 },
	/// The measured response peaks above the clip warning level
	CloseToClipping { max_db: f64 },
	/// The measured response peaks below -20 dB
	TooLow { max_db: f64 },
}

impl fmt::Display for MeasurementWarning {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			MeasurementWarning::PoorTimeClearance { offset, pad } => {
				write!(f, "POOR TIME CLEARANCE: offset {} samples exceeds the {} samples pad", offset, pad)
			}
			MeasurementWarning::WeakReference => {
				write!(f, "bad level on REF channel, DUT channel used to estimate clearance")
			}
			MeasurementWarning::CaptureNearFullScale { channel, peak_dbfs } => {
				write!(f, "{} channel max level {:.1} dBFS", channel, peak_dbfs)
			}
			MeasurementWarning::Clipping { max_db } => write!(f, "CLIPPING DETECTED: +{:.1} dB", max_db),
			MeasurementWarning::CloseToClipping { max_db } => {
				write!(f, "CLOSE TO CLIPPING: {:.1} dB", max_db)
			}
			MeasurementWarning::TooLow { max_db } => write!(f, "TOO LOW: {:.1} dB", max_db),
		}
	}
}

/// Peak and RMS level of one captured channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelLevel {
	/// `20 log10(max |x|)`
	pub peak_dbfs: f64,
	/// RMS expressed in 16 bit LSBs, `sqrt(2^30 Σx² / N)` rounded to 2 decimals
	pub rms_lsbs: f64,
}

impl ChannelLevel {
	pub fn of(x: &Array1<f64>) -> Self {
		let peak = x.iter().fold(0.0f64, |m, v| m.max(v.abs()));
		let n = x.len().max(1) as f64;
		let rms = (2f64.powi(30) * x.dot(x) / n).sqrt();
		ChannelLevel { peak_dbfs: 20.0 * peak.log10(), rms_lsbs: (rms * 100.0).round() / 100.0 }
	}
}

/// Check the captured levels of the DUT and REF channels.
pub fn check_levels(
	dut: &Array1<f64>,
	reference: &Array1<f64>,
	clip_warning_db: f64,
) -> (ChannelLevel, ChannelLevel, Vec<MeasurementWarning>) {
	let d = ChannelLevel::of(dut);
	let r = ChannelLevel::of(reference);
	log::info!("DUT channel max level: {:6.1} dBFS RMS_LSBs: {}", d.peak_dbfs, d.rms_lsbs);
	log::info!("REF channel max level: {:6.1} dBFS RMS_LSBs: {}", r.peak_dbfs, r.rms_lsbs);
	let mut warnings = Vec::new();
	for (channel, level) in [("DUT", d), ("REF", r)] {
		if level.peak_dbfs >= clip_warning_db {
			let w = MeasurementWarning::CaptureNearFullScale { channel, peak_dbfs: level.peak_dbfs };
			log::warn!("{}", w);
			warnings.push(w);
		}
	}
	(d, r, warnings)
}

/// Classify the maximum of a measured response.
///
/// Returns `None` when the level is fine.
pub fn check_spectrum_level(curve: &Curve, clip_warning_db: f64) -> Option<MeasurementWarning> {
	let max_db = curve.max_spl();
	let warning = if max_db > 0.0 {
		Some(MeasurementWarning::Clipping { max_db })
	} else if max_db > clip_warning_db {
		Some(MeasurementWarning::CloseToClipping { max_db })
	} else if max_db < -20.0 {
		Some(MeasurementWarning::TooLow { max_db })
	} else {
		None
	};
	match &warning {
		Some(w) => log::warn!("{}", w),
		None => log::info!("level OK: {:.1} dB", max_db),
	}
	warning
}

#[cfg(test)]
mod tests {
	use super::*;
	use ndarray::array;

	#[test]
	fn test_channel_level() {
		let x = array![0.5, -0.5, 0.5, -0.5];
		let l = ChannelLevel::of(&x);
		assert!((l.peak_dbfs + 6.0206).abs() < 1e-3);
		// sqrt(2^30 * 0.25) = 16384
		assert_eq!(l.rms_lsbs, 16384.0);
	}

	#[test]
	fn test_check_levels_warns_near_full_scale() {
		let loud = array![0.9, -0.9];
		let quiet = array![0.1, -0.1];
		let (_, _, w) = check_levels(&loud, &quiet, -3.0);
		assert_eq!(w.len(), 1);
		assert!(matches!(w[0], MeasurementWarning::CaptureNearFullScale { channel: "DUT", .. }));
	}

	#[test]
	fn test_spectrum_level_classes() {
		let f = array![10.0, 100.0];
		let at = |db: f64| Curve::new(f.clone(), array![db - 10.0, db]).unwrap();
		assert!(matches!(check_spectrum_level(&at(1.0), -3.0), Some(MeasurementWarning::Clipping { .. })));
		assert!(matches!(
			check_spectrum_level(&at(-1.0), -3.0),
			Some(MeasurementWarning::CloseToClipping { .. })
		));
		assert!(matches!(check_spectrum_level(&at(-25.0), -3.0), Some(MeasurementWarning::TooLow { .. })));
		assert_eq!(check_spectrum_level(&at(-10.0), -3.0), None);
	}
}
