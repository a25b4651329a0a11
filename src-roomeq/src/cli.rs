//! RoomEQ - measurement, room correction and PEQ fitting
//! Command-line interface of the `roomeq` binary
//!
//! Copyright (C) 2025 Pierre Aubert pierre(at)spinorama(dot)org
//!
//! This program is free software: you can redistribute it and/or modify
//! it under the terms of the GNU General Public License as published by
//! the Free Software Foundation, either version 3 of the License, or
//! (at your option) any later version.
//!
//! This program is distributed in the hope that it will be useful,
//! but WITHOUT ANY WARRANTY; without even the implied warranty of
//! MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//! GNU General Public License for more details.
//!
//! You should have received a copy of the GNU General Public License
//! along with this program.  If not, see <https://www.gnu.org/licenses/>.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{EqConfig, MeasurementConfig, PeqConfig, SystemType};
use crate::error::{Result, RoomEqError};
use crate::optim::FitStrategy;
use crate::source::CurveSource;

/// Room measurement and correction.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
	/// More logging (-v info, -vv debug, -vvv trace). RUST_LOG wins when set.
	#[arg(short, long, action = clap::ArgAction::Count, global = true)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
	/// Write the playback sweep as a float WAV
	Sweep(SweepArgs),
	/// Deconvolve a recorded sweep into DUT and reference curves
	Measure(MeasureArgs),
	/// Build the EQ curve of measurements and synthesize the FIRs
	Eq(EqArgs),
	/// Fit peaking filters to a curve or to an FIR
	Peq(PeqArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SweepArgs {
	/// Sample rate in Hz
	#[arg(long, default_value_t = 48000)]
	pub fs: u32,

	/// Sweep length is 2^exp samples
	#[arg(long = "exp", default_value_t = 18, value_parser = clap::value_parser!(u32).range(10..=24))]
	pub exp: u32,

	/// 1 for the DUT only, 2 to add the anti phase reference loop
	#[arg(long, default_value_t = 2)]
	pub channels: usize,

	/// Output WAV
	#[arg(short, long, default_value = "sweep.wav")]
	pub output: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct MeasureArgs {
	/// Recorded WAV: channel 0 is the DUT, channel 1 the reference loop
	#[arg(long)]
	pub capture: PathBuf,

	/// Sample rate in Hz
	#[arg(long, default_value_t = 48000)]
	pub fs: u32,

	/// Sweep length is 2^exp samples
	#[arg(long = "exp", default_value_t = 18, value_parser = clap::value_parser!(u32).range(10..=24))]
	pub exp: u32,

	#[arg(long, value_enum, default_value_t = SystemType::Electronic)]
	pub system_type: SystemType,

	/// Microphone calibration curve
	#[arg(long)]
	pub mic: Option<PathBuf>,

	/// Keep the raw reduced curve
	#[arg(long, default_value_t = false)]
	pub no_smooth: bool,

	/// Skip the latency estimation
	#[arg(long, default_value_t = false)]
	pub no_clearance: bool,

	/// JSON measurement configuration; flags override it
	#[arg(long)]
	pub config: Option<PathBuf>,

	/// Output DUT curve; the reference goes to `<stem>.ref.frd` and the
	/// DUT over reference ratio to `<stem>.dut_ref.frd`
	#[arg(short, long, default_value = "dut.frd")]
	pub output: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct EqArgs {
	/// Measurements, averaged when several are given
	#[arg(required = true)]
	pub frd: Vec<PathBuf>,

	/// FIR length
	#[arg(long)]
	pub taps: Option<usize>,

	/// Sample rate in Hz
	#[arg(long)]
	pub fs: Option<u32>,

	/// Reference level in dB instead of the estimated one
	#[arg(long, allow_negative_numbers = true)]
	pub ref_level: Option<f64>,

	/// Never boost
	#[arg(long, default_value_t = false)]
	pub no_pos: bool,

	/// JSON EQ configuration; flags override it
	#[arg(long)]
	pub config: Option<PathBuf>,

	/// Output directory
	#[arg(short, long, default_value = ".")]
	pub output: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PeqArgs {
	/// Frequency response to fit
	#[arg(long, conflicts_with = "fir", required_unless_present = "fir")]
	pub frd: Option<PathBuf>,

	/// FIR (raw f32 or WAV) whose response is fitted
	#[arg(long)]
	pub fir: Option<PathBuf>,

	/// Sample rate in Hz
	#[arg(long, default_value_t = 48000)]
	pub fs: u32,

	/// Number of peaking filters
	#[arg(short = 'n', long, default_value_t = 6)]
	pub num_filters: usize,

	/// min, ls_bass, ls or diff
	#[arg(long, default_value = "min")]
	pub strategy: String,

	/// Filters with a smaller absolute gain (dB) are dropped
	#[arg(long, default_value_t = 0.5)]
	pub min_gain: f64,

	/// Offset (dB) added to the target instead of the flat region alignment
	#[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
	pub offset: f64,

	/// Seed of the global search
	#[arg(long)]
	pub seed: Option<u64>,

	/// JSON PEQ configuration; flags override it
	#[arg(long)]
	pub config: Option<PathBuf>,

	/// Recompute the metrics of this PEQ set instead of fitting
	#[arg(long)]
	pub analyse: Option<PathBuf>,

	/// Output JSON record
	#[arg(short, long)]
	pub output: Option<PathBuf>,
}

impl Args {
	/// Log filter matching the verbosity flag.
	pub fn log_level(&self) -> &'static str {
		match self.verbose {
			0 => "warn",
			1 => "info",
			2 => "debug",
			_ => "trace",
		}
	}
}

impl SweepArgs {
	pub fn measurement_config(&self) -> Result<MeasurementConfig> {
		let cfg = MeasurementConfig { fs: self.fs, n: 1 << self.exp, output_channels: self.channels, ..Default::default() };
		cfg.validate()?;
		Ok(cfg)
	}
}

impl MeasureArgs {
	pub fn measurement_config(&self) -> Result<MeasurementConfig> {
		let mut cfg = match &self.config {
			Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
			None => MeasurementConfig { fs: self.fs, n: 1 << self.exp, ..Default::default() },
		};
		cfg.system_type = self.system_type;
		if self.no_smooth {
			cfg.smooth_noct = None;
		}
		if self.no_clearance {
			cfg.check_clearance = false;
		}
		cfg.validate()?;
		Ok(cfg)
	}
}

impl EqArgs {
	pub fn eq_config(&self) -> Result<EqConfig> {
		let mut cfg = match &self.config {
			Some(path) => EqConfig::from_json_file(path)?,
			None => EqConfig::default(),
		};
		if let Some(taps) = self.taps {
			cfg.taps = taps;
		}
		if let Some(fs) = self.fs {
			cfg.fs = fs;
		}
		if self.ref_level.is_some() {
			cfg.ref_level = self.ref_level;
		}
		cfg.no_pos |= self.no_pos;
		cfg.validate()?;
		Ok(cfg)
	}
}

impl PeqArgs {
	pub fn peq_config(&self) -> Result<PeqConfig> {
		let mut cfg = match &self.config {
			Some(path) => PeqConfig::from_json_file(path)?,
			None => PeqConfig::default(),
		};
		cfg.fs = self.fs;
		cfg.num_filters = self.num_filters;
		cfg.strategy = self.strategy.parse::<FitStrategy>()?.name().to_string();
		cfg.min_gain = self.min_gain;
		cfg.mag_offset = self.offset;
		if self.seed.is_some() {
			cfg.seed = self.seed;
		}
		cfg.validate()?;
		Ok(cfg)
	}

	pub fn source(&self) -> Result<CurveSource> {
		match (&self.frd, &self.fir) {
			(Some(frd), None) => Ok(CurveSource::FrdFile(frd.clone())),
			(None, Some(fir)) => Ok(CurveSource::FirFile { path: fir.clone(), fs: self.fs, channel: 0 }),
			_ => Err(RoomEqError::InvalidParameter { what: "source", message: "give exactly one of --frd or --fir".into() }),
		}
	}

	/// `--output`, or `<source stem>.peq.json` next to the source.
	pub fn output_path(&self, source: &CurveSource) -> PathBuf {
		self.output.clone().unwrap_or_else(|| source.path().with_file_name(format!("{}.peq.json", source.set_name())))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_sweep_defaults() {
		let args = Args::parse_from(["roomeq", "sweep"]);
		assert_eq!(args.log_level(), "warn");
		let Command::Sweep(sweep) = args.command else { panic!("expected sweep") };
		let cfg = sweep.measurement_config().unwrap();
		assert_eq!(cfg.n, 1 << 18);
		assert_eq!(cfg.output_channels, 2);
		assert_eq!(sweep.output, PathBuf::from("sweep.wav"));
	}

	#[test]
	fn parse_measure_flags() {
		let args = Args::parse_from([
			"roomeq",
			"-vv",
			"measure",
			"--capture",
			"rec.wav",
			"--system-type",
			"acoustic",
			"--no-smooth",
			"--no-clearance",
			"--exp",
			"16",
		]);
		assert_eq!(args.log_level(), "debug");
		let Command::Measure(m) = args.command else { panic!("expected measure") };
		let cfg = m.measurement_config().unwrap();
		assert_eq!(cfg.system_type, SystemType::Acoustic);
		assert_eq!(cfg.smooth_noct, None);
		assert!(!cfg.check_clearance);
		assert_eq!(cfg.n, 65536);
	}

	#[test]
	fn parse_eq_overrides() {
		let args = Args::parse_from(["roomeq", "eq", "L1.frd", "L2.frd", "--taps", "65536", "--ref-level", "-3.5", "--no-pos"]);
		let Command::Eq(eq) = args.command else { panic!("expected eq") };
		assert_eq!(eq.frd.len(), 2);
		let cfg = eq.eq_config().unwrap();
		assert_eq!(cfg.taps, 65536);
		assert_eq!(cfg.ref_level, Some(-3.5));
		assert!(cfg.no_pos);

		let args = Args::parse_from(["roomeq", "eq", "L.frd", "--taps", "3000"]);
		let Command::Eq(eq) = args.command else { panic!("expected eq") };
		assert!(matches!(eq.eq_config(), Err(RoomEqError::NotPowerOfTwo { .. })));
	}

	#[test]
	fn parse_peq_sources() {
		let args = Args::parse_from(["roomeq", "peq", "--frd", "room.frd", "--strategy", "ls_bass", "-n", "8"]);
		let Command::Peq(p) = args.command else { panic!("expected peq") };
		let cfg = p.peq_config().unwrap();
		assert_eq!(cfg.strategy, "least_squares_bass");
		assert_eq!(cfg.num_filters, 8);
		let src = p.source().unwrap();
		assert_eq!(src, CurveSource::FrdFile(PathBuf::from("room.frd")));
		assert_eq!(p.output_path(&src), PathBuf::from("room.peq.json"));

		let args = Args::parse_from(["roomeq", "peq", "--fir", "drc.L.pcm", "--fs", "96000"]);
		let Command::Peq(p) = args.command else { panic!("expected peq") };
		assert!(matches!(p.source().unwrap(), CurveSource::FirFile { fs: 96000, .. }));

		let args = Args::parse_from(["roomeq", "peq", "--frd", "room.frd", "--strategy", "cobyla"]);
		let Command::Peq(p) = args.command else { panic!("expected peq") };
		assert!(matches!(p.peq_config(), Err(RoomEqError::UnknownName { .. })));
	}

	#[test]
	fn peq_requires_a_source() {
		assert!(Args::try_parse_from(["roomeq", "peq"]).is_err());
		assert!(Args::try_parse_from(["roomeq", "peq", "--frd", "a", "--fir", "b"]).is_err());
	}
}
