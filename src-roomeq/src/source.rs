use std::path::{Path, PathBuf};

use crate::Curve;
use crate::error::{Result, RoomEqError};
use crate::fir::fir_to_curve;
use crate::read::{load_frequency_response, read_pcm_f32, read_wav};

/// Where a curve to fit comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum CurveSource {
	/// A frequency response file (`freq spl [phase]`)
	FrdFile(PathBuf),
	/// An FIR stored as raw 32 bit floats or as a WAV file; its response is
	/// evaluated at `fs`
	FirFile {
		path: PathBuf,
		fs: u32,
		/// Channel of a multi channel WAV
		channel: usize,
	},
}

fn is_wav(path: &Path) -> bool {
	path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}

impl CurveSource {
	pub fn path(&self) -> &Path {
		match self {
			CurveSource::FrdFile(p) => p,
			CurveSource::FirFile { path, .. } => path,
		}
	}

	/// Name of the set fitted from this source: the file stem.
	pub fn set_name(&self) -> String {
		self.path().file_stem().and_then(|s| s.to_str()).unwrap_or("peq").to_string()
	}

	/// Load the curve, in dB.
	pub fn resolve(&self) -> Result<Curve> {
		match self {
			CurveSource::FrdFile(path) => load_frequency_response(path),
			CurveSource::FirFile { path, fs, channel } => {
				let h = if is_wav(path) {
					let wav = read_wav(path)?;
					if wav.sample_rate != *fs {
						log::warn!("{} is sampled at {} Hz, evaluating at {} Hz", path.display(), wav.sample_rate, fs);
					}
					wav.channels.into_iter().nth(*channel).ok_or_else(|| RoomEqError::InvalidParameter {
						what: "channel",
						message: format!("{} has no channel {}", path.display(), channel),
					})?
				} else {
					read_pcm_f32(path)?
				};
				log::info!("FIR {} with {} taps", path.display(), h.len());
				fir_to_curve(&h, *fs)
			}
		}
	}
}
