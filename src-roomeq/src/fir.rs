//! Minimum phase FIR synthesis from a magnitude only EQ curve.
//!
//! The curve is resampled on `m/2 + 1` linear bins, given a minimum phase
//! through the folded real cepstrum, and brought back to the time domain.
//! A linear phase variant is rebuilt from the minimum phase magnitude.

use ndarray::Array1;
use num_complex::Complex64;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use crate::Curve;
use crate::config::{EqConfig, MIN_TAPS, check_sample_rate};
use crate::error::{Result, RoomEqError};
use crate::read::{create_log_frequency_grid, interpolate, write_pcm_f32};

/// Floor applied to the linear gain before taking its log.
const MIN_LINEAR_GAIN: f64 = 1e-12;

/// Largest accepted imaginary residual after the inverse FFT, relative to the
/// peak of the real part.
const MAX_IMAG_RATIO: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseType {
	Minimum,
	Linear,
}

/// A real FIR of fixed length.
#[derive(Debug, Clone)]
pub struct ImpulseResponse {
	pub samples: Array1<f64>,
	pub phase_type: PhaseType,
	pub fs: u32,
}

impl ImpulseResponse {
	pub fn len(&self) -> usize {
		self.samples.len()
	}

	pub fn is_empty(&self) -> bool {
		self.samples.is_empty()
	}
}

fn fft_in_place(buf: &mut [Complex64], inverse: bool) {
	let mut planner = FftPlanner::<f64>::new();
	let plan = if inverse { planner.plan_fft_inverse(buf.len()) } else { planner.plan_fft_forward(buf.len()) };
	plan.process(buf);
	if inverse {
		let scale = 1.0 / buf.len() as f64;
		buf.iter_mut().for_each(|v| *v *= scale);
	}
}

/// Resample `curve` (dB) on `taps/2 + 1` linear bins from 0 Hz to `fs/2`.
///
/// Missing 0 Hz and Nyquist bins are added, extending the nearest value.
/// The half spectrum must come out with an odd length.
pub fn resample_half_spectrum(curve: &Curve, taps: usize, fs: u32) -> Result<(Array1<f64>, Array1<f64>)> {
	curve.validate()?;
	let nyquist = fs as f64 / 2.0;
	let mut f: Vec<f64> = curve.freq.to_vec();
	let mut v: Vec<f64> = curve.spl.to_vec();
	if f[0] > 0.0 {
		f.insert(0, 0.0);
		v.insert(0, v[0]);
	}
	if f[f.len() - 1] < nyquist {
		f.push(nyquist);
		v.push(v[v.len() - 1]);
	}
	let bins = taps / 2 + 1;
	if bins % 2 == 0 {
		return Err(RoomEqError::EvenSpectrum { len: bins });
	}
	let new_freq = Array1::linspace(0.0, nyquist, bins);
	let new_db = interpolate(&new_freq, &Array1::from_vec(f), &Array1::from_vec(v));
	Ok((new_freq, new_db))
}

/// Whole spectrum (length `2(n-1)`) from a half spectrum of `n` bins, mirrored.
pub fn whole_spectrum(half: &Array1<f64>) -> Array1<f64> {
	let n = half.len();
	let mut whole = half.to_vec();
	whole.extend(half.iter().skip(1).take(n.saturating_sub(2)).rev());
	Array1::from_vec(whole)
}

/// Minimum phase spectrum with the magnitude `whole_mag`.
///
/// Uses the real cepstrum of `ln|H|`, folded onto positive quefrencies.
pub fn minimum_phase_spectrum(whole_mag: &Array1<f64>) -> Array1<Complex64> {
	let m = whole_mag.len();
	let mut buf: Vec<Complex64> =
		whole_mag.iter().map(|&g| Complex64::new(g.max(MIN_LINEAR_GAIN).ln(), 0.0)).collect();
	fft_in_place(&mut buf, true);
	// fold: keep c[0] and c[m/2], double the causal part, drop the rest
	for (k, c) in buf.iter_mut().enumerate() {
		let re = c.re;
		*c = if k == 0 || 2 * k == m {
			Complex64::new(re, 0.0)
		} else if 2 * k < m {
			Complex64::new(2.0 * re, 0.0)
		} else {
			Complex64::new(0.0, 0.0)
		};
	}
	fft_in_place(&mut buf, false);
	Array1::from_iter(buf.into_iter().map(|c| c.exp()))
}

/// Decreasing half of a Blackman-Harris window of length `2m`.
pub fn semi_blackman_harris(m: usize) -> Array1<f64> {
	let (a0, a1, a2, a3) = (0.35875, 0.48829, 0.14128, 0.01168);
	let l = (2 * m - 1) as f64;
	Array1::from_shape_fn(m, |k| {
		let x = 2.0 * PI * (m + k) as f64 / l;
		a0 - a1 * x.cos() + a2 * (2.0 * x).cos() - a3 * (3.0 * x).cos()
	})
}

/// Modified Bessel function of the first kind, order 0.
fn bessel_i0(x: f64) -> f64 {
	let mut sum = 1.0;
	let mut term = 1.0;
	let q = x * x / 4.0;
	for k in 1..200 {
		term *= q / (k * k) as f64;
		sum += term;
		if term < sum * 1e-17 {
			break;
		}
	}
	sum
}

/// Kaiser window of length `n`.
pub fn kaiser(n: usize, beta: f64) -> Array1<f64> {
	if n == 1 {
		return Array1::ones(1);
	}
	let denom = bessel_i0(beta);
	let last = (n - 1) as f64;
	Array1::from_shape_fn(n, |i| {
		let r = 2.0 * i as f64 / last - 1.0;
		bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / denom
	})
}

fn real_ifft_checked(spectrum: &Array1<Complex64>) -> Result<Array1<f64>> {
	let mut buf = spectrum.to_vec();
	fft_in_place(&mut buf, true);
	let max_re = buf.iter().fold(0.0f64, |m, c| m.max(c.re.abs()));
	let max_imag = buf.iter().fold(0.0f64, |m, c| m.max(c.im.abs()));
	if max_imag > MAX_IMAG_RATIO * max_re.max(f64::MIN_POSITIVE) {
		return Err(RoomEqError::ImaginaryResidual { max_imag });
	}
	Ok(Array1::from_iter(buf.into_iter().map(|c| c.re)))
}

/// Minimum phase FIR of `taps` samples realising the EQ curve `eq` (dB).
pub fn synthesize(eq: &Curve, taps: usize, fs: u32) -> Result<ImpulseResponse> {
	check_sample_rate(fs)?;
	if taps < MIN_TAPS || !taps.is_power_of_two() {
		return Err(RoomEqError::NotPowerOfTwo { what: "taps", value: taps, min: MIN_TAPS });
	}
	let (_, half_db) = resample_half_spectrum(eq, taps, fs)?;
	let half_lin = half_db.mapv(|db| 10f64.powf(db / 20.0));
	let whole = whole_spectrum(&half_lin);
	let spectrum = minimum_phase_spectrum(&whole);
	let imp = real_ifft_checked(&spectrum)?;
	let samples = semi_blackman_harris(taps) * &imp.slice(ndarray::s![..taps]);
	log::info!("minimum phase FIR: {} taps @ {} Hz", taps, fs);
	Ok(ImpulseResponse { samples, phase_type: PhaseType::Minimum, fs })
}

/// Linear phase FIR with the magnitude of `imp`, same length.
///
/// The zero phase impulse is centred and Kaiser windowed.
pub fn to_linear_phase(imp: &ImpulseResponse, kaiser_beta: f64) -> Result<ImpulseResponse> {
	let n = imp.len();
	if n == 0 {
		return Err(RoomEqError::EmptyInput { what: "impulse response".into() });
	}
	let mut buf: Vec<Complex64> = imp.samples.iter().map(|&v| Complex64::new(v, 0.0)).collect();
	fft_in_place(&mut buf, false);
	let mag: Array1<Complex64> = buf.iter().map(|c| Complex64::new(c.norm(), 0.0)).collect();
	let zero_phase = real_ifft_checked(&mag)?;
	let half = n / 2;
	let centred = Array1::from_shape_fn(n, |i| zero_phase[(i + n - half) % n]);
	let samples = centred * &kaiser(n, kaiser_beta);
	log::info!("linear phase FIR: {} taps, kaiser beta {}", n, kaiser_beta);
	Ok(ImpulseResponse { samples, phase_type: PhaseType::Linear, fs: imp.fs })
}

/// Complex response of `h` at `freq` (Hz).
pub fn freq_response(h: &Array1<f64>, freq: &Array1<f64>, fs: u32) -> Array1<Complex64> {
	freq.mapv(|f| {
		let w = -2.0 * PI * f / fs as f64;
		h.iter().enumerate().fold(Complex64::new(0.0, 0.0), |acc, (k, &hk)| {
			acc + Complex64::from_polar(hk, w * k as f64)
		})
	})
}

/// Response of an FIR on 1000 log spaced points from 10 Hz to `fs/2`,
/// magnitude in dB and phase in degrees.
pub fn fir_to_curve(h: &Array1<f64>, fs: u32) -> Result<Curve> {
	if h.is_empty() {
		return Err(RoomEqError::EmptyInput { what: "FIR has no coefficient".into() });
	}
	let freq = create_log_frequency_grid(1000, 10.0, fs as f64 / 2.0);
	let resp = freq_response(h, &freq, fs);
	let db = resp.mapv(|c| 20.0 * c.norm().log10());
	let deg = resp.mapv(|c| c.arg().to_degrees());
	Curve::with_phase(freq, db, deg)
}

/// Channel letter from a measurement file name: `L`, `R`, else `C`.
pub fn channel_from_file_name(path: &Path) -> char {
	let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
	match name.chars().next() {
		Some('L') => 'L',
		Some('R') => 'R',
		_ => 'C',
	}
}

/// Tap count label such as `32Ktaps`.
pub fn ktaps(taps: usize) -> String {
	if taps >= 1024 { format!("{}Ktaps", taps / 1024) } else { format!("{}taps", taps) }
}

/// Directory `<dir>/<fs>_<K>taps` holding the FIRs.
pub fn output_dir(dir: &Path, fs: u32, taps: usize) -> PathBuf {
	dir.join(format!("{}_{}", fs, ktaps(taps)))
}

/// Write `drc.<ch>.pcm` and, when given, `drc.<ch>.lp.pcm`.
///
/// Returns the written paths.
pub fn write_firs(
	dir: &Path,
	channel: char,
	min_phase: &ImpulseResponse,
	linear_phase: Option<&ImpulseResponse>,
) -> Result<Vec<PathBuf>> {
	let out = output_dir(dir, min_phase.fs, min_phase.len());
	std::fs::create_dir_all(&out)?;
	let mut written = Vec::new();
	let mp = out.join(format!("drc.{}.pcm", channel));
	write_pcm_f32(&mp, &min_phase.samples)?;
	written.push(mp);
	if let Some(lp) = linear_phase {
		let path = out.join(format!("drc.{}.lp.pcm", channel));
		write_pcm_f32(&path, &lp.samples)?;
		written.push(path);
	}
	for p in &written {
		log::info!("saving: {}", p.display());
	}
	Ok(written)
}

/// Minimum phase FIR and, if configured, its linear phase variant.
pub fn synthesize_from_config(eq: &Curve, config: &EqConfig) -> Result<(ImpulseResponse, Option<ImpulseResponse>)> {
	let mp = synthesize(eq, config.taps, config.fs)?;
	let lp = if config.linear_phase { Some(to_linear_phase(&mp, config.kaiser_beta)?) } else { None };
	Ok((mp, lp))
}

#[cfg(test)]
mod tests {
	use super::*;
	use ndarray::array;

	fn energy(x: &[f64]) -> f64 {
		x.iter().map(|v| v * v).sum()
	}

	#[test]
	fn test_flat_eq_is_a_delta() {
		let eq = Curve::new(array![20.0, 20000.0], array![0.0, 0.0]).unwrap();
		let imp = synthesize(&eq, 1024, 48000).unwrap();
		assert_eq!(imp.len(), 1024);
		assert!((imp.samples[0] - 1.0).abs() < 1e-3, "{}", imp.samples[0]);
		assert!(imp.samples.iter().skip(1).all(|v| v.abs() < 1e-6));
	}

	#[test]
	fn test_whole_spectrum_mirrors() {
		let w = whole_spectrum(&array![1.0, 2.0, 3.0, 4.0, 5.0]);
		assert_eq!(w, array![1.0, 2.0, 3.0, 4.0, 5.0, 4.0, 3.0, 2.0]);
	}

	#[test]
	fn test_boundary_bins_and_length() {
		let eq = Curve::new(array![100.0, 1000.0], array![-6.0, 3.0]).unwrap();
		let (f, db) = resample_half_spectrum(&eq, 1024, 48000).unwrap();
		assert_eq!(f.len(), 513);
		assert_eq!(f[0], 0.0);
		assert_eq!(f[512], 24000.0);
		assert_eq!(db[0], -6.0);
		assert_eq!(db[512], 3.0);
		assert!(matches!(resample_half_spectrum(&eq, 6, 48000), Err(RoomEqError::EvenSpectrum { len: 4 })));
	}

	#[test]
	fn test_minimum_phase_is_front_loaded_and_matches() {
		let f = create_log_frequency_grid(500, 10.0, 24000.0);
		let db = f.mapv(|x| 6.0 * (-((x / 200.0).log2()).powi(2)).exp() - 4.0 * (-((x / 3000.0).log2()).powi(2)).exp());
		let eq = Curve::new(f.clone(), db.clone()).unwrap();
		let imp = synthesize(&eq, 8192, 48000).unwrap();
		let s = imp.samples.as_slice().unwrap();
		let total = energy(s);
		assert!(energy(&s[..s.len() / 8]) > 0.99 * total);

		let check = create_log_frequency_grid(50, 30.0, 15000.0);
		let resp = fir_to_curve(&imp.samples, 48000).unwrap();
		let got = crate::read::interpolate_log_space(&check, &resp.freq, &resp.spl);
		let want = crate::read::interpolate_log_space(&check, &f, &db);
		for i in 0..check.len() {
			assert!((got[i] - want[i]).abs() < 0.5, "{} Hz: {} vs {}", check[i], got[i], want[i]);
		}
	}

	#[test]
	fn test_linear_phase_keeps_length_and_is_symmetric() {
		let f = create_log_frequency_grid(200, 10.0, 24000.0);
		let db = f.mapv(|x| -3.0 * (-((x / 500.0).log2()).powi(2)).exp());
		let eq = Curve::new(f, db).unwrap();
		let mp = synthesize(&eq, 2048, 48000).unwrap();
		let lp = to_linear_phase(&mp, 1.0).unwrap();
		assert_eq!(lp.len(), mp.len());
		assert_eq!(lp.phase_type, PhaseType::Linear);
		let peak = lp.samples.iter().enumerate().fold((0, 0.0f64), |b, (i, &v)| if v.abs() > b.1 { (i, v.abs()) } else { b });
		assert_eq!(peak.0, 1024);
		// the window is centred on 1023.5, the impulse on 1024
		for k in 1..100 {
			assert!((lp.samples[1024 - k] - lp.samples[1024 + k]).abs() < 1e-3 * peak.1);
		}
	}

	#[test]
	fn test_kaiser_and_bessel() {
		assert!((bessel_i0(0.0) - 1.0).abs() < 1e-15);
		assert!((bessel_i0(1.0) - 1.2660658777520082).abs() < 1e-12);
		let w = kaiser(9, 1.0);
		assert!((w[4] - 1.0).abs() < 1e-12);
		assert!((w[0] - w[8]).abs() < 1e-12);
		assert!((w[0] - 1.0 / 1.2660658777520082).abs() < 1e-12);
	}

	#[test]
	fn test_semi_window_decreases() {
		let w = semi_blackman_harris(64);
		assert!(w[0] > 0.99);
		assert!(w[63] < 1e-3);
		assert!(w.windows(2).into_iter().all(|p| p[1] <= p[0]));
	}

	#[test]
	fn test_output_naming() {
		assert_eq!(channel_from_file_name(Path::new("/tmp/L_room.frd")), 'L');
		assert_eq!(channel_from_file_name(Path::new("R.frd")), 'R');
		assert_eq!(channel_from_file_name(Path::new("sub.frd")), 'C');
		assert_eq!(output_dir(Path::new("out"), 48000, 32768), PathBuf::from("out/48000_32Ktaps"));
	}

	#[test]
	fn test_write_firs() {
		let dir = tempfile::tempdir().unwrap();
		let eq = Curve::new(array![20.0, 20000.0], array![0.0, 0.0]).unwrap();
		let mp = synthesize(&eq, 1024, 44100).unwrap();
		let lp = to_linear_phase(&mp, 1.0).unwrap();
		let paths = write_firs(dir.path(), 'L', &mp, Some(&lp)).unwrap();
		assert_eq!(paths.len(), 2);
		assert!(paths[0].ends_with("44100_1Ktaps/drc.L.pcm"));
		assert!(paths[1].ends_with("44100_1Ktaps/drc.L.lp.pcm"));
		let back = crate::read::read_pcm_f32(&paths[0]).unwrap();
		assert_eq!(back.len(), 1024);
	}
}
