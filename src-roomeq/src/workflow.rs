//! End to end runs behind the `roomeq` subcommands.
//!
//! Each function reads its inputs from disk, runs one pipeline and writes the
//! outputs next to the path it was given.

use ndarray::Array1;
use std::path::{Path, PathBuf};

use crate::Curve;
use crate::config::{EqConfig, MeasurementConfig, PeqConfig};
use crate::curve::average_curves;
use crate::eqcurve::{self, EqualizationCurve};
use crate::error::{Result, RoomEqError};
use crate::fir::{self, ImpulseResponse};
use crate::optim::{self, PeqFit};
use crate::peq::{PeqRecord, load_peq_file};
use crate::read::{load_frequency_response, read_wav, write_curve_to_csv, write_wav};
use crate::source::CurveSource;
use crate::sweep::Sweep;
use crate::transfer::{CapturedPair, Measurement, measure};

/// Write the playback sweep of `config` as a float WAV.
pub fn write_sweep(config: &MeasurementConfig, output: &Path) -> Result<Sweep> {
	let sweep = Sweep::from_config(config)?;
	let channels = sweep.playback(config.calibration.sig_frac, config.output_channels);
	write_wav(output, config.fs, &channels)?;
	log::info!(
		"sweep {} samples ({:.2} s, pad {}) at {} Hz -> {}",
		sweep.n,
		sweep.n as f64 / sweep.fs as f64,
		sweep.pad(),
		sweep.fs,
		output.display()
	);
	Ok(sweep)
}

fn sibling_path(output: &Path, suffix: &str) -> PathBuf {
	let stem = output.file_stem().and_then(|s| s.to_str()).unwrap_or("dut");
	output.with_file_name(format!("{}.{}.frd", stem, suffix))
}

/// Path of the reference curve written next to the DUT curve.
pub fn reference_path(output: &Path) -> PathBuf {
	sibling_path(output, "ref")
}

/// Path of the DUT over reference curve written next to the DUT curve.
pub fn dut_ref_path(output: &Path) -> PathBuf {
	sibling_path(output, "dut_ref")
}

/// Deconvolve a recorded WAV and write the DUT, reference and DUT/REF curves.
pub fn run_measure(
	capture: &Path,
	config: &MeasurementConfig,
	mic: Option<&Path>,
	output: &Path,
) -> Result<Measurement> {
	let wav = read_wav(capture)?;
	if wav.sample_rate != config.fs {
		return Err(RoomEqError::InvalidParameter {
			what: "fs",
			message: format!("{} is sampled at {} Hz, expected {} Hz", capture.display(), wav.sample_rate, config.fs),
		});
	}
	let sweep = Sweep::from_config(config)?;
	let captured = CapturedPair::from_channels(&wav.channels, &sweep, config.calibration.sig_frac)?;
	let mic = mic.map(load_frequency_response).transpose()?;
	let m = measure(&sweep, &captured, config, mic.as_ref())?;

	write_curve_to_csv(output, &m.dut, &format!("DUT {}", capture.display()))?;
	let ref_out = reference_path(output);
	write_curve_to_csv(&ref_out, &m.reference, &format!("REF {}", capture.display()))?;
	let ratio_out = dut_ref_path(output);
	write_curve_to_csv(&ratio_out, &m.dut_ref, &format!("DUT/REF {}", capture.display()))?;
	log::info!("saved {}, {} and {}", output.display(), ref_out.display(), ratio_out.display());
	Ok(m)
}

/// Everything produced by an EQ run.
#[derive(Debug, Clone)]
pub struct EqOutputs {
	pub eq: EqualizationCurve,
	pub min_phase: ImpulseResponse,
	pub linear_phase: Option<ImpulseResponse>,
	pub files: Vec<PathBuf>,
}

/// Load and average measurement curves.
pub fn load_measurements(paths: &[PathBuf]) -> Result<Curve> {
	let curves = paths.iter().map(|p| load_frequency_response(p)).collect::<Result<Vec<_>>>()?;
	average_curves(&curves)
}

/// Build the EQ of one or several measurements and write the FIRs and the
/// EQ curve under `out_dir`.
pub fn run_eq(frds: &[PathBuf], config: &EqConfig, out_dir: &Path) -> Result<EqOutputs> {
	let first = frds.first().ok_or_else(|| RoomEqError::EmptyInput { what: "no measurement given".into() })?;
	let channel = fir::channel_from_file_name(first);
	let measured = load_measurements(frds)?;

	let eq = eqcurve::build(&measured, config)?;
	let (min_phase, linear_phase) = fir::synthesize_from_config(&eq.curve, config)?;
	let mut files = fir::write_firs(out_dir, channel, &min_phase, linear_phase.as_ref())?;

	let dir = fir::output_dir(out_dir, config.fs, config.taps);
	let eq_path = dir.join(format!("drc.{}.eq.frd", channel));
	write_curve_to_csv(&eq_path, &eq.curve, &format!("EQ ref level {:.2} dB", eq.ref_level))?;
	files.push(eq_path);
	let check_path = dir.join(format!("drc.{}.fir.frd", channel));
	write_curve_to_csv(&check_path, &fir::fir_to_curve(&min_phase.samples, config.fs)?, "minimum phase FIR")?;
	files.push(check_path);
	Ok(EqOutputs { eq, min_phase, linear_phase, files })
}

/// Fit a PEQ set to `source` and write the JSON record, plus the APO text
/// and the `freq dB deg` response of the set.
pub fn run_peq(source: &CurveSource, config: &PeqConfig, output: &Path) -> Result<PeqFit> {
	let curve = source.resolve()?;
	let fit = optim::fit(&curve, config, &source.set_name())?;
	fit.record.write_json(output)?;
	write_peq_companions(&fit.record, output, config.fs)?;
	Ok(fit)
}

fn write_peq_companions(record: &PeqRecord, output: &Path, fs: u32) -> Result<()> {
	let apo = output.with_extension("apo.txt");
	std::fs::write(&apo, record.to_apo(fs))?;
	let freq = crate::read::create_log_frequency_grid(500, 20.0, 20000.0);
	let spl = record.filters.response(&freq, fs as f64);
	let phase = record.filters.phase(&freq, fs as f64);
	let frd = output.with_extension("frd");
	write_curve_to_csv(&frd, &Curve::with_phase(freq, spl, phase)?, &record.set_name)?;
	log::info!("saved {} and {}", apo.display(), frd.display());
	Ok(())
}

/// Recompute the metrics of a stored PEQ set against `source`.
pub fn run_peq_analysis(peq_file: &Path, source: &CurveSource, mag_offset: f64, fs: u32) -> Result<PeqRecord> {
	let mut record = load_peq_file(peq_file)?;
	let curve = source.resolve()?;
	let fs = record.fs.unwrap_or(fs);
	optim::reanalyse(&mut record, &curve, mag_offset, fs)?;
	Ok(record)
}

/// Print a measurement summary.
pub fn print_measurement(m: &Measurement) {
	let clearance = if m.transfer.time_clearance_ok { "ok" } else { "POOR" };
	println!("offset: {} samples, time clearance {}", m.transfer.offset, clearance);
	println!("DUT max level: {:.2} dB", m.dut.max_spl());
	for w in &m.warnings {
		println!("warning: {}", w);
	}
}

/// Print a fitted set as a table with its metrics.
pub fn print_peq(record: &PeqRecord, fs: u32) {
	println!("{}", crate::iir::peq_format_table(&record.filters.to_peq(fs as f64)));
	println!("moved: {:+.2} dB, channel {}", record.moved_db, record.channel);
	if let Some(a) = &record.analysis {
		let r = a.residual_error;
		println!(
			"rmse total {:.3} dB | bass {:.3} dB | treble {:.3} dB",
			r.rmse_total_db, r.rmse_bass_db, r.rmse_treble_db
		);
	}
	if let Some(o) = &record.optimizer {
		if !o.converged {
			println!("optimizer did not converge: {}", o.message);
		}
	}
}

/// Peak absolute sample of a set of buffers in dBFS.
pub fn peak_dbfs(channels: &[Array1<f64>]) -> f64 {
	let peak = channels.iter().flat_map(|c| c.iter()).fold(0.0f64, |m, v| m.max(v.abs()));
	20.0 * peak.log10()
}
