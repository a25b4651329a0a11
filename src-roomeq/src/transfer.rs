//! Transfer function estimation by frequency domain deconvolution.
//!
//! The captured signals are aligned against the sweep with an FFT cross
//! correlation, then divided by the spectrum of the latency compensated
//! sweep.

use ndarray::{Array1, s};
use num_complex::Complex64;
use rustfft::FftPlanner;

use crate::Curve;
use crate::config::MeasurementConfig;
use crate::error::{Result, RoomEqError};
use crate::quality::{MeasurementWarning, check_levels, check_spectrum_level};
use crate::read::{interpolate_log_space, logspaced_semispectrum};
use crate::smooth::smooth_constant;
use crate::sweep::Sweep;

/// Device under test and reference channels, both `N` samples long.
#[derive(Debug, Clone)]
pub struct CapturedPair {
	pub dut: Array1<f64>,
	pub reference: Array1<f64>,
}

impl CapturedPair {
	pub fn new(dut: Array1<f64>, reference: Array1<f64>) -> Result<Self> {
		if dut.len() != reference.len() {
			return Err(RoomEqError::LengthMismatch {
				what: "captured reference channel",
				expected: dut.len(),
				got: reference.len(),
			});
		}
		Ok(CapturedPair { dut, reference })
	}

	/// Pair built from a single captured channel; the reference is synthesised
	/// from the sweep.
	pub fn from_mono(dut: Array1<f64>, sweep: &Sweep, sig_frac: f64) -> Self {
		let reference = sweep.reference_for_mono(sig_frac);
		CapturedPair { dut, reference }
	}

	/// Pair from the channels of a recording: channel 0 is the DUT, channel 1
	/// (when present) the reference loop.
	///
	/// Buffers are truncated or zero padded to the sweep length.
	pub fn from_channels(channels: &[Array1<f64>], sweep: &Sweep, sig_frac: f64) -> Result<Self> {
		let fit = |x: &Array1<f64>| {
			let mut out = Array1::<f64>::zeros(sweep.n);
			let k = x.len().min(sweep.n);
			out.slice_mut(s![..k]).assign(&x.slice(s![..k]));
			out
		};
		match channels {
			[] => Err(RoomEqError::EmptyInput { what: "captured recording has no channel".into() }),
			[dut] => Ok(Self::from_mono(fit(dut), sweep, sig_frac)),
			[dut, reference, ..] => Ok(CapturedPair { dut: fit(dut), reference: fit(reference) }),
		}
	}
}

/// Whole complex spectrum of the DUT, aligned and calibrated.
#[derive(Debug, Clone)]
pub struct TransferFunction {
	/// DUT transfer function, `N` bins
	pub spectrum: Array1<Complex64>,
	/// Reference loop transfer function, kept for diagnostics
	pub ref_spectrum: Array1<Complex64>,
	/// DUT over reference loop; the playback chain cancels out, noisy where
	/// the sweep has no energy
	pub dut_ref: Array1<Complex64>,
	/// Latency in samples; negative when playback lags capture
	pub offset: i64,
	/// The latency fits in the silent pad
	pub time_clearance_ok: bool,
	/// Sample rate in Hz
	pub fs: u32,
}

/// Outcome of a full measurement: spectra, reduced curves and warnings.
#[derive(Debug, Clone)]
pub struct Measurement {
	pub transfer: TransferFunction,
	/// Reduced DUT curve in dB
	pub dut: Curve,
	/// Reduced reference curve in dB
	pub reference: Curve,
	/// Reduced DUT over reference curve in dB
	pub dut_ref: Curve,
	pub warnings: Vec<MeasurementWarning>,
}

fn fft(x: &Array1<f64>, len: usize) -> Vec<Complex64> {
	let mut buf: Vec<Complex64> = x.iter().map(|&v| Complex64::new(v, 0.0)).collect();
	buf.resize(len, Complex64::new(0.0, 0.0));
	let mut planner = FftPlanner::<f64>::new();
	planner.plan_fft_forward(len).process(&mut buf);
	buf
}

fn peak_abs(x: &Array1<f64>) -> f64 {
	x.iter().fold(0.0f64, |m, v| m.max(v.abs()))
}

/// Latency of `captured` relative to `sweep`, in samples.
///
/// The correlation is searched over lags `-N/2..N/2` and the peak of its
/// absolute value gives the offset.
pub fn estimate_offset(sweep: &Array1<f64>, captured: &Array1<f64>) -> i64 {
	let n = sweep.len();
	let len = 2 * n.max(captured.len()).next_power_of_two();
	let a = fft(sweep, len);
	let b = fft(captured, len);
	let mut prod: Vec<Complex64> = a.iter().zip(b.iter()).map(|(x, y)| x * y.conj()).collect();
	let mut planner = FftPlanner::<f64>::new();
	planner.plan_fft_inverse(len).process(&mut prod);

	let half = (n / 2) as i64;
	let mut best = (0i64, f64::NEG_INFINITY);
	for lag in -half..half {
		let idx = lag.rem_euclid(len as i64) as usize;
		let v = prod[idx].re.abs();
		if v > best.1 {
			best = (lag, v);
		}
	}
	-best.0
}

/// Estimate the transfer function of the device under test.
///
/// Returns the best effort result together with the measurement warnings;
/// a poor time clearance is reported, not raised.
pub fn estimate(
	sweep: &Sweep,
	captured: &CapturedPair,
	config: &MeasurementConfig,
) -> Result<(TransferFunction, Vec<MeasurementWarning>)> {
	let n = sweep.n;
	for (what, x) in [("captured DUT channel", &captured.dut), ("captured reference channel", &captured.reference)] {
		if x.len() != n {
			return Err(RoomEqError::LengthMismatch { what, expected: n, got: x.len() });
		}
	}
	let cal = &config.calibration;
	let cf = cal.calibration_factor(config.system_type);
	let mut warnings = Vec::new();

	let (offset, time_clearance_ok) = if config.check_clearance {
		let aligned_on = if peak_abs(&captured.reference) < 0.1 * peak_abs(&captured.dut) {
			log::warn!("{}", MeasurementWarning::WeakReference);
			warnings.push(MeasurementWarning::WeakReference);
			&captured.dut
		} else {
			&captured.reference
		};
		let offset = estimate_offset(&sweep.raw, aligned_on);
		log::info!("record offset: {} samples ({:.3} s)", offset, offset as f64 / sweep.fs as f64);
		if offset < 0 {
			log::info!("negative offset means the player lags the recorder");
		}
		let ok = (offset.unsigned_abs() as usize) <= sweep.pad();
		if !ok {
			let w = MeasurementWarning::PoorTimeClearance { offset, pad: sweep.pad() };
			log::warn!("{}", w);
			warnings.push(w);
		}
		(offset, ok)
	} else {
		(0, true)
	};

	// delay the sweep by the latency so the captured signals line up with it
	let pre = sweep.pre_tapered();
	let mut aligned = Array1::<f64>::zeros(n);
	for i in 0..n {
		let src = (i as i64 - offset).rem_euclid(n as i64) as usize;
		aligned[i] = pre[src];
	}

	let sweep_spec = fft(&aligned, n);
	let ref_spec = fft(&captured.reference, n);
	let dut_spec = fft(&captured.dut, n);
	let zero = Complex64::new(0.0, 0.0);
	let divide = |num: &[Complex64], scale: f64| -> Array1<Complex64> {
		num.iter()
			.zip(sweep_spec.iter())
			.map(|(x, w)| {
				let den = w * (cal.s_dac * cal.sig_frac);
				if den.norm() == 0.0 { zero } else { x * scale / den }
			})
			.collect()
	};
	let spectrum = divide(&dut_spec, cal.s_adc * cf);
	let ref_spectrum = divide(&ref_spec, cal.s_adc);
	let dut_ref = dut_spec
		.iter()
		.zip(ref_spec.iter())
		.map(|(d, r)| if r.norm() == 0.0 { zero } else { d * cf / r })
		.collect();

	Ok((TransferFunction { spectrum, ref_spectrum, dut_ref, offset, time_clearance_ok, fs: sweep.fs }, warnings))
}

/// Reduce the positive half of `spectrum` to a log spaced dB curve.
///
/// The magnitude is smoothed on the linear scale when `smooth_noct` is set.
pub fn spectrum_to_curve(
	spectrum: &Array1<Complex64>,
	fs: u32,
	frd_points: usize,
	smooth_noct: Option<f64>,
) -> Result<Curve> {
	let n = spectrum.len();
	if n < 4 {
		return Err(RoomEqError::EmptyInput { what: "spectrum too short".into() });
	}
	let half = n / 2;
	let freq = Array1::from_shape_fn(half + 1, |k| k as f64 * fs as f64 / n as f64);
	let mag = Array1::from_shape_fn(half + 1, |k| spectrum[k].norm());
	let (grid, mut reduced) = logspaced_semispectrum(&freq, &mag, frd_points);
	if let Some(noct) = smooth_noct {
		reduced = smooth_constant(&grid, &reduced, noct);
	}
	Curve::new(grid, reduced.mapv(|m| 20.0 * m.log10()))
}

impl TransferFunction {
	/// DUT curve in dB on `frd_points` log spaced points.
	pub fn to_frd(&self, frd_points: usize, smooth_noct: Option<f64>) -> Result<Curve> {
		spectrum_to_curve(&self.spectrum, self.fs, frd_points, smooth_noct)
	}

	/// Reference loop curve in dB, for diagnostics.
	pub fn reference_frd(&self, frd_points: usize, smooth_noct: Option<f64>) -> Result<Curve> {
		spectrum_to_curve(&self.ref_spectrum, self.fs, frd_points, smooth_noct)
	}

	/// DUT over reference curve in dB, for diagnostics.
	pub fn dut_ref_frd(&self, frd_points: usize, smooth_noct: Option<f64>) -> Result<Curve> {
		spectrum_to_curve(&self.dut_ref, self.fs, frd_points, smooth_noct)
	}
}

/// Normalise a microphone response so its 200-4000 Hz band sits at 0 dB.
pub fn normalize_mic_response(mic: &Curve) -> Curve {
	let offset = mic.flat_region_average(200.0, 4000.0);
	log::debug!("mic response flat region at {:.2} dB", offset);
	mic.shifted(-offset)
}

/// Subtract a microphone response (dB) from `curve`, interpolating over log f.
pub fn apply_mic_correction(curve: &Curve, mic: &Curve) -> Result<Curve> {
	mic.validate()?;
	let mic_db = interpolate_log_space(&curve.freq, &mic.freq, &mic.spl);
	log::info!("mic correction applied");
	Curve::new(curve.freq.clone(), &curve.spl - &mic_db)
}

/// Run the whole measurement chain on a capture: alignment, deconvolution,
/// reduction, optional mic correction and level checks.
pub fn measure(
	sweep: &Sweep,
	captured: &CapturedPair,
	config: &MeasurementConfig,
	mic: Option<&Curve>,
) -> Result<Measurement> {
	config.validate()?;
	let (_, _, mut warnings) = check_levels(&captured.dut, &captured.reference, config.clip_warning_db);
	let (transfer, w) = estimate(sweep, captured, config)?;
	warnings.extend(w);

	let mut dut = transfer.to_frd(config.frd_points, config.smooth_noct)?;
	let reference = transfer.reference_frd(config.frd_points, config.smooth_noct)?;
	let dut_ref = transfer.dut_ref_frd(config.frd_points, config.smooth_noct)?;
	if let Some(mic) = mic {
		dut = apply_mic_correction(&dut, &normalize_mic_response(mic))?;
	}
	if let Some(w) = check_spectrum_level(&dut, config.clip_warning_db) {
		warnings.push(w);
	}
	Ok(Measurement { transfer, dut, reference, dut_ref, warnings })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::SystemType;
	use ndarray::array;

	fn config(n: usize) -> MeasurementConfig {
		MeasurementConfig { n, ..Default::default() }
	}

	fn delayed(x: &Array1<f64>, d: usize) -> Array1<f64> {
		let mut out = Array1::<f64>::zeros(x.len());
		out.slice_mut(s![d..]).assign(&x.slice(s![..x.len() - d]));
		out
	}

	#[test]
	fn test_offset_of_a_delayed_sweep() {
		let cfg = config(1 << 14);
		let sweep = Sweep::from_config(&cfg).unwrap();
		for d in [0usize, 37, 1000] {
			let cap = delayed(&sweep.tapered, d);
			assert_eq!(estimate_offset(&sweep.raw, &cap), d as i64);
		}
	}

	#[test]
	fn test_offset_sign_is_kept_for_anti_phase_reference() {
		let cfg = config(1 << 14);
		let sweep = Sweep::from_config(&cfg).unwrap();
		let cap = -&delayed(&sweep.tapered, 120);
		assert_eq!(estimate_offset(&sweep.raw, &cap), 120);
	}

	#[test]
	fn test_loopback_is_flat() {
		let cfg = config(1 << 14);
		let sweep = Sweep::from_config(&cfg).unwrap();
		let play = sweep.playback(cfg.calibration.sig_frac, 2);
		let cap = CapturedPair::new(delayed(&play[0], 200), delayed(&play[1], 200)).unwrap();
		let (tf, warnings) = estimate(&sweep, &cap, &cfg).unwrap();
		assert_eq!(tf.offset, 200);
		assert!(tf.time_clearance_ok);
		assert!(warnings.is_empty(), "{:?}", warnings);
		let frd = tf.to_frd(200, None).unwrap();
		for (f, db) in frd.freq.iter().zip(frd.spl.iter()) {
			if *f > 50.0 && *f < 15000.0 {
				assert!(db.abs() < 0.5, "{} Hz: {} dB", f, db);
			}
		}
	}

	#[test]
	fn test_latency_is_removed_from_the_phase() {
		let cfg = config(1 << 14);
		let sweep = Sweep::from_config(&cfg).unwrap();
		let play = sweep.playback(cfg.calibration.sig_frac, 2);
		let d = 300;
		let cap = CapturedPair::new(delayed(&play[0], d), delayed(&play[1], d)).unwrap();
		let (tf, _) = estimate(&sweep, &cap, &cfg).unwrap();
		assert_eq!(tf.offset, d as i64);
		// a residual delay of d samples would turn the phase by 2π·f·d/fs
		let n = sweep.n as f64;
		for f in [1000.0, 3000.0, 8000.0] {
			let k = (f * n / sweep.fs as f64).round() as usize;
			let phase = tf.spectrum[k].arg();
			assert!(phase.abs() < 0.1, "{} Hz: {} rad", f, phase);
		}
	}

	#[test]
	fn test_dut_over_reference() {
		let cfg = MeasurementConfig { system_type: SystemType::Electronic, ..config(1 << 14) };
		let sweep = Sweep::from_config(&cfg).unwrap();
		let play = sweep.playback(cfg.calibration.sig_frac, 2);
		// the DUT is the reference loop with 6 dB of gain and a polarity flip
		let reference = delayed(&play[1], 100);
		let dut = reference.mapv(|v| -2.0 * v);
		let (tf, _) = estimate(&sweep, &CapturedPair::new(dut, reference).unwrap(), &cfg).unwrap();
		let frd = tf.dut_ref_frd(200, None).unwrap();
		let expected = 20.0 * 2f64.log10();
		for (f, db) in frd.freq.iter().zip(frd.spl.iter()) {
			if *f > 50.0 && *f < 15000.0 {
				assert!((db - expected).abs() < 1e-3, "{} Hz: {} dB", f, db);
			}
		}
	}

	#[test]
	fn test_clearance_flag() {
		let cfg = config(1 << 14);
		let sweep = Sweep::from_config(&cfg).unwrap();
		let late = sweep.pad() + 500;
		let cap = CapturedPair::new(delayed(&sweep.tapered, late), delayed(&sweep.tapered, late)).unwrap();
		let (tf, warnings) = estimate(&sweep, &cap, &cfg).unwrap();
		assert!(!tf.time_clearance_ok);
		assert_eq!(tf.offset, late as i64);
		assert!(warnings.iter().any(|w| matches!(w, MeasurementWarning::PoorTimeClearance { .. })));

		let no_check = MeasurementConfig { check_clearance: false, ..cfg };
		let (tf, _) = estimate(&sweep, &cap, &no_check).unwrap();
		assert_eq!(tf.offset, 0);
		assert!(tf.time_clearance_ok);
	}

	#[test]
	fn test_weak_reference_falls_back_to_dut() {
		let cfg = config(1 << 13);
		let sweep = Sweep::from_config(&cfg).unwrap();
		let cap = CapturedPair::new(delayed(&sweep.tapered, 50), Array1::zeros(sweep.n)).unwrap();
		let (tf, warnings) = estimate(&sweep, &cap, &cfg).unwrap();
		assert_eq!(tf.offset, 50);
		assert!(warnings.contains(&MeasurementWarning::WeakReference));
	}

	#[test]
	fn test_length_mismatch() {
		let cfg = config(1 << 12);
		let sweep = Sweep::from_config(&cfg).unwrap();
		let cap = CapturedPair { dut: Array1::zeros(100), reference: Array1::zeros(100) };
		assert!(matches!(estimate(&sweep, &cap, &cfg), Err(RoomEqError::LengthMismatch { .. })));
		assert!(CapturedPair::new(Array1::zeros(3), Array1::zeros(4)).is_err());
	}

	#[test]
	fn test_mic_correction() {
		let curve = Curve::new(array![100.0, 1000.0, 10000.0], array![0.0, 0.0, 0.0]).unwrap();
		let mic = Curve::new(array![10.0, 200.0, 4000.0, 20000.0], array![5.0, 2.0, 2.0, -1.0]).unwrap();
		let norm = normalize_mic_response(&mic);
		let out = apply_mic_correction(&curve, &norm).unwrap();
		assert!(out.spl[1].abs() < 1e-9);
		assert!(out.spl[2] > 0.0);
		assert!(out.spl[0] < 0.0);
	}
}
