//! Parametric EQ filter sets and their JSON records.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, RoomEqError};
use crate::iir::{Biquad, Peq, peq_format_apo, peq_phase, peq_spl};

/// Bass and treble bands of the residual metrics are split here.
pub const BASS_LIMIT_HZ: f64 = 200.0;

const ANALYSIS_COMMENTS: &str = "rmse_bass_db: if very low (e.g., < 0.2 dB), the bass emulation is almost perfect. \
rmse_treble_db: if higher, it reflects the freedom given to the fit in the high frequencies.";

fn default_filter_type() -> String {
	"peaking".to_string()
}

fn round_to(v: f64, decimals: i32) -> f64 {
	let p = 10f64.powi(decimals);
	(v * p).round() / p
}

/// One peaking section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeqFilter {
	#[serde(default)]
	pub id: usize,
	#[serde(rename = "type", default = "default_filter_type")]
	pub filter_type: String,
	/// Center frequency in Hz
	pub fc: f64,
	pub q: f64,
	/// Gain in dB
	pub gain: f64,
}

impl PeqFilter {
	pub fn new(fc: f64, q: f64, gain: f64) -> Self {
		PeqFilter { id: 0, filter_type: default_filter_type(), fc, q, gain }
	}

	/// Same filter with `fc` rounded to 2 decimals, `q` to 3 and `gain` to 2.
	pub fn rounded(&self) -> Self {
		PeqFilter { fc: round_to(self.fc, 2), q: round_to(self.q, 3), gain: round_to(self.gain, 2), ..self.clone() }
	}

	pub fn biquad(&self, fs: f64) -> Biquad {
		Biquad::peak(self.fc, fs, self.q, self.gain)
	}
}

/// An ordered set of peaking filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeqFilterSet {
	pub filters: Vec<PeqFilter>,
}

impl PeqFilterSet {
	/// Round the raw fitted values, drop the filters with `|gain| <= min_gain`,
	/// sort by frequency and number them from 0.
	pub fn from_fit(params: &[(f64, f64, f64)], min_gain: f64) -> Self {
		let filters = params
			.iter()
			.map(|&(fc, q, gain)| PeqFilter::new(fc, q, gain).rounded())
			.filter(|f| f.gain.abs() > min_gain)
			.collect();
		let mut set = PeqFilterSet { filters };
		set.sort();
		set
	}

	/// Sort by frequency and reassign ids.
	pub fn sort(&mut self) {
		self.filters.sort_by(|a, b| a.fc.total_cmp(&b.fc));
		for (i, f) in self.filters.iter_mut().enumerate() {
			f.id = i;
		}
	}

	pub fn len(&self) -> usize {
		self.filters.len()
	}

	pub fn is_empty(&self) -> bool {
		self.filters.is_empty()
	}

	pub fn to_peq(&self, fs: f64) -> Peq {
		self.filters.iter().map(|f| f.biquad(fs)).collect()
	}

	/// Summed dB response of the set.
	pub fn response(&self, freq: &Array1<f64>, fs: f64) -> Array1<f64> {
		peq_spl(freq, &self.to_peq(fs))
	}

	/// Summed phase of the set in degrees.
	pub fn phase(&self, freq: &Array1<f64>, fs: f64) -> Array1<f64> {
		peq_phase(freq, &self.to_peq(fs))
	}
}

/// RMS errors of a fit, rounded to 4 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualMetrics {
	pub rmse_total_db: f64,
	/// Below 200 Hz
	pub rmse_bass_db: f64,
	/// From 200 Hz up
	pub rmse_treble_db: f64,
}

fn rms<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
	let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v * v, n + 1));
	if n == 0 { 0.0 } else { (sum / n as f64).sqrt() }
}

impl ResidualMetrics {
	/// Metrics of `predicted` against `target`, both in dB on `freq`.
	pub fn compute(freq: &Array1<f64>, target: &Array1<f64>, predicted: &Array1<f64>) -> Self {
		let error = target - predicted;
		let bass: Vec<f64> = freq.iter().zip(error.iter()).filter(|(f, _)| **f < BASS_LIMIT_HZ).map(|(_, e)| *e).collect();
		let treble: Vec<f64> =
			freq.iter().zip(error.iter()).filter(|(f, _)| **f >= BASS_LIMIT_HZ).map(|(_, e)| *e).collect();
		ResidualMetrics {
			rmse_total_db: round_to(rms(error.iter()), 4),
			rmse_bass_db: round_to(rms(bass.iter()), 4),
			rmse_treble_db: round_to(rms(treble.iter()), 4),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
	pub residual_error: ResidualMetrics,
	pub units: String,
	pub comments: String,
}

impl Analysis {
	pub fn new(residual_error: ResidualMetrics) -> Self {
		Analysis { residual_error, units: "decibels (dB)".to_string(), comments: ANALYSIS_COMMENTS.to_string() }
	}
}

/// How the optimiser ended. A fit that did not converge still carries its
/// best parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerInfo {
	pub strategy: String,
	pub converged: bool,
	pub message: String,
	pub iterations: usize,
	pub evaluations: usize,
}

/// A PEQ set with its metadata, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeqRecord {
	pub filters: PeqFilterSet,
	#[serde(default)]
	pub fs: Option<u32>,
	#[serde(default)]
	pub moved_db: f64,
	#[serde(default)]
	pub channel: String,
	#[serde(default)]
	pub set_name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub analysis: Option<Analysis>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub optimizer: Option<OptimizerInfo>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PeqFile {
	Record(PeqRecord),
	Bare(Vec<PeqFilter>),
}

impl PeqRecord {
	pub fn new(filters: PeqFilterSet, fs: u32, moved_db: f64, set_name: &str) -> Self {
		PeqRecord {
			filters,
			fs: Some(fs),
			moved_db,
			channel: detect_channel_from_set_name(set_name),
			set_name: set_name.to_string(),
			analysis: None,
			optimizer: None,
		}
	}

	/// Recompute the residual metrics against `target` (dB on `freq`).
	pub fn analyse(&mut self, freq: &Array1<f64>, target: &Array1<f64>, fs: u32) -> ResidualMetrics {
		let predicted = self.filters.response(freq, fs as f64);
		let metrics = ResidualMetrics::compute(freq, target, &predicted);
		self.analysis = Some(Analysis::new(metrics));
		metrics
	}

	/// EqualizerAPO text for the set.
	pub fn to_apo(&self, fs: u32) -> String {
		let comment = format!("# {} ({} filters, moved {:+.2} dB)", self.set_name, self.filters.len(), self.moved_db);
		peq_format_apo(&comment, &self.filters.to_peq(fs as f64))
	}

	pub fn to_json(&self) -> Result<String> {
		Ok(serde_json::to_string_pretty(self)?)
	}

	pub fn write_json(&self, path: &Path) -> Result<()> {
		std::fs::write(path, self.to_json()?)?;
		log::info!("saved PEQ set to {}", path.display());
		Ok(())
	}
}

/// Load a PEQ set stored either as a record with `filters` or as a bare list.
///
/// The filters are sorted by frequency and renumbered.
pub fn load_peq_file(path: &Path) -> Result<PeqRecord> {
	let text = std::fs::read_to_string(path)?;
	let parsed: PeqFile = serde_json::from_str(&text)
		.map_err(|e| RoomEqError::Parse { path: path.display().to_string(), message: e.to_string() })?;
	let mut record = match parsed {
		PeqFile::Record(r) => r,
		PeqFile::Bare(filters) => {
			let set_name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("").to_string();
			PeqRecord {
				channel: detect_channel_from_set_name(&set_name),
				set_name,
				filters: PeqFilterSet { filters },
				fs: None,
				moved_db: 0.0,
				analysis: None,
				optimizer: None,
			}
		}
	};
	record.filters.sort();
	Ok(record)
}

/// `L`, `R` or `chX`, from the `.` or `_` separated tokens of a set name.
pub fn detect_channel_from_set_name(set_name: &str) -> String {
	for sep in ['.', '_'] {
		let tokens: Vec<&str> = set_name.split(sep).collect();
		if tokens.contains(&"L") {
			return "L".to_string();
		}
		if tokens.contains(&"R") {
			return "R".to_string();
		}
	}
	"chX".to_string()
}
