use std::path::Path;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RoomEqError};

/// Sample rates accepted by the EQ and PEQ stages.
pub const VALID_FS: [u32; 5] = [44100, 88200, 48000, 96000, 192000];

/// Smallest FIR tap count accepted by the EQ stage.
pub const MIN_TAPS: usize = 1024;

/// Smallest sweep length accepted by the measurement stage.
pub const MIN_SWEEP_LENGTH: usize = 1 << 10;

/// Check `fs` against [`VALID_FS`].
pub fn check_sample_rate(fs: u32) -> Result<()> {
	if VALID_FS.contains(&fs) {
		Ok(())
	} else {
		Err(RoomEqError::InvalidSampleRate { fs, valid: &VALID_FS })
	}
}

fn check_power_of_two(what: &'static str, value: usize, min: usize) -> Result<()> {
	if value >= min && value.is_power_of_two() {
		Ok(())
	} else {
		Err(RoomEqError::NotPowerOfTwo { what, value, min })
	}
}

fn check_bounds(what: &'static str, (min, max): (f64, f64)) -> Result<()> {
	if min > max || min.is_nan() || max.is_nan() {
		Err(RoomEqError::InvalidBounds { what, min, max })
	} else {
		Ok(())
	}
}

fn check_positive(what: &'static str, value: f64) -> Result<()> {
	if value > 0.0 && value.is_finite() {
		Ok(())
	} else {
		Err(RoomEqError::InvalidParameter { what, message: format!("must be > 0, got {}", value) })
	}
}

/// Signal chain being measured; selects the calibration factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SystemType {
	/// Loudspeaker measured through a microphone, result in Pa/V
	Acoustic,
	/// Electronic loop, unity gain
	#[default]
	Electronic,
	/// Acoustic measurement normalised to the playback level
	LevelDependent,
}

impl FromStr for SystemType {
	type Err = RoomEqError;

	fn from_str(s: &str) -> Result<Self> {
		match s.to_ascii_lowercase().as_str() {
			"acoustic" => Ok(SystemType::Acoustic),
			"electronic" => Ok(SystemType::Electronic),
			"level-dependent" | "level_dependent" => Ok(SystemType::LevelDependent),
			_ => Err(RoomEqError::UnknownName { kind: "system type", name: s.to_string() }),
		}
	}
}

/// Gains of the measurement chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConstants {
	/// Power amplifier gain
	pub power_amp_gain: f64,
	/// Microphone sensitivity in V/Pa
	pub mic_cal: f64,
	/// Microphone preamplifier gain
	pub mic_preamp_gain: f64,
	/// Voltage at the speaker terminals for a full scale DAC output
	pub vw: f64,
	/// Gain of an electronic device under test
	pub electronic_gain: f64,
	/// DAC scaling (V per full scale)
	pub s_dac: f64,
	/// ADC scaling (full scale per V)
	pub s_adc: f64,
	/// SPL reference pressure in Pa
	pub po: f64,
	/// Fraction of full scale used to play the sweep
	pub sig_frac: f64,
}

impl Default for CalibrationConstants {
	fn default() -> Self {
		Self {
			power_amp_gain: 10.0,
			mic_cal: 0.012,
			mic_preamp_gain: 10.0,
			vw: 1.0,
			electronic_gain: 1.0,
			s_dac: 1.0,
			s_adc: 1.0,
			po: 2e-5,
			sig_frac: 0.5,
		}
	}
}

impl CalibrationConstants {
	/// Factor applied to the DUT spectrum before deconvolution.
	pub fn calibration_factor(&self, system: SystemType) -> f64 {
		match system {
			SystemType::Acoustic => {
				self.vw / (self.power_amp_gain * self.mic_cal * self.mic_preamp_gain * self.po)
			}
			SystemType::Electronic => 1.0 / self.electronic_gain,
			SystemType::LevelDependent => {
				1.0 / (self.sig_frac * self.mic_cal * self.mic_preamp_gain * self.po)
			}
		}
	}

	/// Every constant must be positive; `sig_frac` must not exceed 1.
	pub fn validate(&self) -> Result<()> {
		check_positive("power_amp_gain", self.power_amp_gain)?;
		check_positive("mic_cal", self.mic_cal)?;
		check_positive("mic_preamp_gain", self.mic_preamp_gain)?;
		check_positive("vw", self.vw)?;
		check_positive("electronic_gain", self.electronic_gain)?;
		check_positive("s_dac", self.s_dac)?;
		check_positive("s_adc", self.s_adc)?;
		check_positive("po", self.po)?;
		check_positive("sig_frac", self.sig_frac)?;
		if self.sig_frac > 1.0 {
			return Err(RoomEqError::InvalidParameter {
				what: "sig_frac",
				message: format!("must be <= 1, got {}", self.sig_frac),
			});
		}
		Ok(())
	}
}

/// Parameters of a sweep measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
	/// Sample rate in Hz
	pub fs: u32,
	/// Total sweep length in samples, zero pad included
	pub n: usize,
	/// Start frequency of the logarithmic sweep
	pub f_start: f64,
	/// End of the fade in
	pub f1: f64,
	/// Start of the fade out, `0.91 * fs / 2` when unset
	pub f2: Option<f64>,
	/// Kind of system under test
	pub system_type: SystemType,
	/// Measurement chain gains
	pub calibration: CalibrationConstants,
	/// Number of log spaced points of the reduced curve
	pub frd_points: usize,
	/// Smoothing of the reduced curve (fraction of octave), none when unset
	pub smooth_noct: Option<f64>,
	/// Peak level (dBFS) above which a capture is reported close to clipping
	pub clip_warning_db: f64,
	/// Check the latency against the zero pad
	pub check_clearance: bool,
	/// Number of playback channels (the second one feeds the reference loop)
	pub output_channels: usize,
}

impl Default for MeasurementConfig {
	fn default() -> Self {
		Self {
			fs: 48000,
			n: 1 << 18,
			f_start: 5.0,
			f1: 10.0,
			f2: None,
			system_type: SystemType::Electronic,
			calibration: CalibrationConstants::default(),
			frd_points: 1000,
			smooth_noct: Some(24.0),
			clip_warning_db: -3.0,
			check_clearance: true,
			output_channels: 2,
		}
	}
}

impl MeasurementConfig {
	/// Start of the fade out, resolved against the sample rate.
	pub fn f2(&self) -> f64 {
		self.f2.unwrap_or(0.91 * self.fs as f64 / 2.0)
	}

	/// End frequency of the sweep (Nyquist).
	pub fn f_stop(&self) -> f64 {
		self.fs as f64 / 2.0
	}

	/// Check sizes and the ordering `0 < f_start < f1 < f2 < fs/2`.
	pub fn validate(&self) -> Result<()> {
		if self.fs == 0 {
			return Err(RoomEqError::InvalidSampleRate { fs: self.fs, valid: &VALID_FS });
		}
		check_power_of_two("sweep length", self.n, MIN_SWEEP_LENGTH)?;
		check_positive("f_start", self.f_start)?;
		let f2 = self.f2();
		if !(self.f_start < self.f1 && self.f1 < f2 && f2 < self.f_stop()) {
			return Err(RoomEqError::InvalidParameter {
				what: "sweep frequencies",
				message: format!(
					"expected f_start < f1 < f2 < fs/2, got {} < {} < {} < {}",
					self.f_start,
					self.f1,
					f2,
					self.f_stop()
				),
			});
		}
		if self.frd_points < 2 {
			return Err(RoomEqError::InvalidParameter {
				what: "frd_points",
				message: format!("need at least 2 points, got {}", self.frd_points),
			});
		}
		if let Some(noct) = self.smooth_noct {
			check_positive("smooth_noct", noct)?;
		}
		if !(1..=2).contains(&self.output_channels) {
			return Err(RoomEqError::InvalidParameter {
				what: "output_channels",
				message: format!("must be 1 or 2, got {}", self.output_channels),
			});
		}
		self.calibration.validate()
	}
}

/// How fast the smoothing widens above the transition frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransitionSpeed {
	Slow,
	#[default]
	Medium,
	Fast,
}

impl TransitionSpeed {
	/// Exponent of the blending law between fine and octave smoothing.
	pub fn exponent(self) -> f64 {
		match self {
			TransitionSpeed::Slow => 2.0,
			TransitionSpeed::Medium => 1.0,
			TransitionSpeed::Fast => 0.5,
		}
	}
}

impl FromStr for TransitionSpeed {
	type Err = RoomEqError;

	fn from_str(s: &str) -> Result<Self> {
		match s.to_ascii_lowercase().as_str() {
			"slow" => Ok(TransitionSpeed::Slow),
			"medium" => Ok(TransitionSpeed::Medium),
			"fast" => Ok(TransitionSpeed::Fast),
			_ => Err(RoomEqError::UnknownName { kind: "transition speed", name: s.to_string() }),
		}
	}
}

/// Resolution of a smoothing pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothingProfile {
	/// Fraction of octave below the transition, e.g. 24 for 1/24 oct
	pub fine_fraction_oct: f64,
	/// Frequency where the resolution starts to widen, none for constant
	pub transition_start_hz: Option<f64>,
	/// Blending law above the transition
	pub transition_speed: TransitionSpeed,
}

impl SmoothingProfile {
	/// Constant `1/noct` octave smoothing.
	pub fn constant(noct: f64) -> Self {
		Self { fine_fraction_oct: noct, transition_start_hz: None, transition_speed: TransitionSpeed::Medium }
	}

	/// `1/noct` octave below `f0`, widening to one octave at Nyquist.
	pub fn variable(noct: f64, f0: f64, speed: TransitionSpeed) -> Self {
		Self { fine_fraction_oct: noct, transition_start_hz: Some(f0), transition_speed: speed }
	}

	pub fn validate(&self) -> Result<()> {
		check_positive("fine_fraction_oct", self.fine_fraction_oct)?;
		if let Some(f0) = self.transition_start_hz {
			check_positive("transition_start_hz", f0)?;
		}
		Ok(())
	}
}

/// A one sided Gaussian gain window, in octaves around `center_hz`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainWindow {
	/// Center frequency in Hz
	pub center_hz: f64,
	/// Width in octaves (the window is ~0 at `span_oct` from the center)
	pub span_oct: f64,
}

/// Parameters of the EQ curve and FIR synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqConfig {
	/// FIR length in taps
	pub taps: usize,
	/// Sample rate in Hz
	pub fs: u32,
	/// Band used to estimate the reference level
	pub ref_band: (f64, f64),
	/// Manual reference level in dB; replaces the automatic estimate
	pub ref_level: Option<f64>,
	/// Fine smoothing fraction of octave for the target
	pub noct: f64,
	/// Schroeder frequency in Hz
	pub schroeder_hz: f64,
	/// Octaves below Schroeder where the smoothing starts to widen
	pub oct_below_schroeder: f64,
	/// Widening law above the transition
	pub speed: TransitionSpeed,
	/// Window limiting positive gain in the low end
	pub low_window: Option<GainWindow>,
	/// Window limiting positive gain in the high end
	pub high_window: Option<GainWindow>,
	/// Drop every positive gain
	pub no_pos: bool,
	/// Fraction of octave of the final smoothing
	pub final_noct: f64,
	/// Kaiser beta of the linear phase variant
	pub kaiser_beta: f64,
	/// Also produce the linear phase FIR
	pub linear_phase: bool,
}

impl Default for EqConfig {
	fn default() -> Self {
		Self {
			taps: 1 << 15,
			fs: 48000,
			ref_band: (500.0, 2000.0),
			ref_level: None,
			noct: 96.0,
			schroeder_hz: 200.0,
			oct_below_schroeder: 2.0,
			speed: TransitionSpeed::Medium,
			low_window: Some(GainWindow { center_hz: 1000.0, span_oct: 5.0 }),
			high_window: Some(GainWindow { center_hz: 1000.0, span_oct: 5.0 }),
			no_pos: false,
			final_noct: 24.0,
			kaiser_beta: 1.0,
			linear_phase: true,
		}
	}
}

impl EqConfig {
	/// Load a configuration from JSON; missing fields take their default value.
	pub fn from_json_file(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path)?;
		let cfg: EqConfig = serde_json::from_str(&text)?;
		cfg.validate()?;
		Ok(cfg)
	}

	/// Transition frequency `schroeder / 2^oct_below_schroeder`.
	pub fn transition_hz(&self) -> f64 {
		self.schroeder_hz * 2f64.powf(-self.oct_below_schroeder)
	}

	/// Smoothing of the target curve.
	pub fn target_profile(&self) -> SmoothingProfile {
		SmoothingProfile::variable(self.noct, self.transition_hz(), self.speed)
	}

	pub fn validate(&self) -> Result<()> {
		check_sample_rate(self.fs)?;
		check_power_of_two("taps", self.taps, MIN_TAPS)?;
		check_bounds("ref_band", self.ref_band)?;
		check_positive("ref_band low edge", self.ref_band.0)?;
		check_positive("noct", self.noct)?;
		check_positive("final_noct", self.final_noct)?;
		check_positive("schroeder_hz", self.schroeder_hz)?;
		for w in self.low_window.iter().chain(self.high_window.iter()) {
			check_positive("gain window center", w.center_hz)?;
			check_positive("gain window span", w.span_oct)?;
		}
		if !(self.kaiser_beta >= 0.0) {
			return Err(RoomEqError::InvalidParameter {
				what: "kaiser_beta",
				message: format!("must be >= 0, got {}", self.kaiser_beta),
			});
		}
		Ok(())
	}
}

/// Parameters of the parametric EQ fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeqConfig {
	/// Number of peaking filters
	pub num_filters: usize,
	/// Optimisation strategy name, see [`crate::optim::FitStrategy`]
	pub strategy: String,
	/// Filters with `|gain| <=` this value are dropped
	pub min_gain: f64,
	/// Extra offset in dB added to the target after flattening
	pub mag_offset: f64,
	/// Sample rate in Hz
	pub fs: u32,
	/// Seed of the global search
	pub seed: Option<u64>,
	/// Iteration limit of the global search
	pub de_maxiter: usize,
	/// Objective call limit of the local searches; each strategy has its own default
	pub max_evaluations: Option<usize>,
	/// Center frequency bounds (Hz); each strategy has its own default
	pub fc_bounds: Option<(f64, f64)>,
	/// Q bounds
	pub q_bounds: Option<(f64, f64)>,
	/// Gain bounds (dB)
	pub gain_bounds: Option<(f64, f64)>,
}

impl Default for PeqConfig {
	fn default() -> Self {
		Self {
			num_filters: 6,
			strategy: "minimize".to_string(),
			min_gain: 0.5,
			mag_offset: 0.0,
			fs: 48000,
			seed: None,
			de_maxiter: 1000,
			max_evaluations: None,
			fc_bounds: None,
			q_bounds: None,
			gain_bounds: None,
		}
	}
}

impl PeqConfig {
	/// Load a configuration from JSON; missing fields take their default value.
	pub fn from_json_file(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path)?;
		let cfg: PeqConfig = serde_json::from_str(&text)?;
		cfg.validate()?;
		Ok(cfg)
	}

	pub fn validate(&self) -> Result<()> {
		check_sample_rate(self.fs)?;
		if self.num_filters == 0 {
			return Err(RoomEqError::InvalidParameter {
				what: "num_filters",
				message: "need at least one filter".into(),
			});
		}
		if !(self.min_gain >= 0.0) {
			return Err(RoomEqError::InvalidParameter {
				what: "min_gain",
				message: format!("must be >= 0, got {}", self.min_gain),
			});
		}
		if let Some(fc) = self.fc_bounds {
			check_bounds("fc", fc)?;
			check_positive("fc", fc.0)?;
		}
		if let Some(q) = self.q_bounds {
			check_bounds("q", q)?;
			check_positive("q", q.0)?;
		}
		if let Some(gain) = self.gain_bounds {
			check_bounds("gain", gain)?;
		}
		if self.max_evaluations == Some(0) {
			return Err(RoomEqError::InvalidParameter { what: "max_evaluations", message: "must be > 0".into() });
		}
		crate::optim::FitStrategy::from_str(&self.strategy)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_calibration_factors() {
		let c = CalibrationConstants::default();
		assert_eq!(c.calibration_factor(SystemType::Electronic), 1.0);
		// 1 / (10 * 0.012 * 10 * 2e-5)
		let acoustic = c.calibration_factor(SystemType::Acoustic);
		assert!((acoustic - 41666.666).abs() < 1e-2, "{}", acoustic);
		let level = c.calibration_factor(SystemType::LevelDependent);
		assert!((level - 833333.33).abs() < 1.0, "{}", level);
	}

	#[test]
	fn test_defaults_are_valid() {
		MeasurementConfig::default().validate().unwrap();
		EqConfig::default().validate().unwrap();
		PeqConfig::default().validate().unwrap();
		let m = MeasurementConfig::default();
		assert_eq!(m.n, 262144);
		assert!((m.f2() - 21840.0).abs() < 1e-9);
	}

	#[test]
	fn test_configuration_errors() {
		let cfg = EqConfig { fs: 22050, ..Default::default() };
		assert!(matches!(cfg.validate(), Err(RoomEqError::InvalidSampleRate { fs: 22050, .. })));

		let cfg = EqConfig { taps: 3000, ..Default::default() };
		assert!(matches!(cfg.validate(), Err(RoomEqError::NotPowerOfTwo { value: 3000, .. })));

		let cfg = EqConfig { taps: 512, ..Default::default() };
		assert!(cfg.validate().is_err());

		let cfg = EqConfig { ref_band: (2000.0, 500.0), ..Default::default() };
		assert!(matches!(cfg.validate(), Err(RoomEqError::InvalidBounds { .. })));

		let cfg = PeqConfig { strategy: "bogus".into(), ..Default::default() };
		let err = cfg.validate().unwrap_err();
		assert!(err.is_configuration_error());

		let cfg = MeasurementConfig { n: 1000, ..Default::default() };
		assert!(cfg.validate().is_err());
	}

	#[test]
	fn test_peq_bounds_are_validated() {
		let cfg = PeqConfig { gain_bounds: Some((6.0, -12.0)), ..Default::default() };
		let err = cfg.validate().unwrap_err();
		assert!(matches!(err, RoomEqError::InvalidBounds { what: "gain", .. }));
		assert!(err.is_configuration_error());

		let cfg = PeqConfig { fc_bounds: Some((0.0, 20000.0)), ..Default::default() };
		assert!(matches!(cfg.validate(), Err(RoomEqError::InvalidParameter { what: "fc", .. })));

		let cfg = PeqConfig { q_bounds: Some((f64::NAN, 4.0)), ..Default::default() };
		assert!(cfg.validate().is_err());

		let cfg = PeqConfig { max_evaluations: Some(0), ..Default::default() };
		assert!(cfg.validate().is_err());

		let cfg = PeqConfig { fc_bounds: Some((30.0, 300.0)), q_bounds: Some((0.5, 5.0)), ..Default::default() };
		cfg.validate().unwrap();
	}

	#[test]
	fn test_peq_config_json_bounds() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("peq.json");
		std::fs::write(&path, r#"{"num_filters": 4, "gain_bounds": [-12.0, 3.0]}"#).unwrap();
		let cfg = PeqConfig::from_json_file(&path).unwrap();
		assert_eq!(cfg.gain_bounds, Some((-12.0, 3.0)));
		assert_eq!(cfg.fc_bounds, None);

		std::fs::write(&path, r#"{"gain_bounds": [3.0, -12.0]}"#).unwrap();
		assert!(PeqConfig::from_json_file(&path).unwrap_err().is_configuration_error());
	}

	#[test]
	fn test_names() {
		assert_eq!("level_dependent".parse::<SystemType>().unwrap(), SystemType::LevelDependent);
		assert_eq!("Acoustic".parse::<SystemType>().unwrap(), SystemType::Acoustic);
		assert!("loud".parse::<SystemType>().is_err());
		assert_eq!("fast".parse::<TransitionSpeed>().unwrap(), TransitionSpeed::Fast);
	}

	#[test]
	fn test_eq_config_json_partial() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("eq.json");
		std::fs::write(&path, r#"{"taps": 16384, "no_pos": true, "speed": "fast"}"#).unwrap();
		let cfg = EqConfig::from_json_file(&path).unwrap();
		assert_eq!(cfg.taps, 16384);
		assert!(cfg.no_pos);
		assert_eq!(cfg.speed, TransitionSpeed::Fast);
		assert_eq!(cfg.fs, 48000);
		assert!((cfg.transition_hz() - 50.0).abs() < 1e-12);
	}
}
