//! Fitting of peaking filter sets to a target magnitude curve.
//!
//! All strategies work on the same vector layout (see [`crate::x2peq`]) and
//! minimise a weighted squared error between the summed dB response of the
//! filters and the target. They differ by their weights, bounds, starting
//! point and solver: NLopt L-BFGS or BOBYQA for the local ones, the
//! differential evolution of `roomeq-de` for the global one.

use ndarray::Array1;
#[cfg(feature = "nlopt")]
use roomeq_de::{Bounds, nlopt_minimize};
use roomeq_de::{DEConfigBuilder, LocalAlgorithm, LocalConfig, Mutation, Strategy, differential_evolution};
use std::fmt;
use std::str::FromStr;

use crate::Curve;
use crate::config::PeqConfig;
use crate::error::{Result, RoomEqError};
use crate::peq::{OptimizerInfo, PeqFilterSet, PeqRecord};
use crate::read::{geomspace, interpolate};
use crate::x2peq::{params2x, x_bounds, x2params, x2spl};

/// Number of log spaced points the target is read on.
pub const TARGET_POINTS: usize = 500;
/// Band used to move the target to 0 dB.
pub const FLAT_REGION_HZ: (f64, f64) = (200.0, 4000.0);

const BASS_STAGE_HZ: f64 = 500.0;

/// Optimisation strategy of the PEQ fit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStrategy {
	/// One bounded L-BFGS run, weights `1/log10(f)`
	Minimize,
	/// Sum of squares on the bass first, then on the full band
	LeastSquaresBass,
	/// One sum of squares run with balanced weights
	LeastSquares,
	/// Global search, slow
	DifferentialEvolution,
}

impl FitStrategy {
	pub const ALL: [FitStrategy; 4] = [
		FitStrategy::Minimize,
		FitStrategy::LeastSquaresBass,
		FitStrategy::LeastSquares,
		FitStrategy::DifferentialEvolution,
	];

	pub fn name(&self) -> &'static str {
		match self {
			FitStrategy::Minimize => "minimize",
			FitStrategy::LeastSquaresBass => "least_squares_bass",
			FitStrategy::LeastSquares => "least_squares",
			FitStrategy::DifferentialEvolution => "differential_evolution",
		}
	}

	pub fn short_name(&self) -> &'static str {
		match self {
			FitStrategy::Minimize => "min",
			FitStrategy::LeastSquaresBass => "ls_bass",
			FitStrategy::LeastSquares => "ls",
			FitStrategy::DifferentialEvolution => "diff",
		}
	}

	pub fn is_global(&self) -> bool {
		matches!(self, FitStrategy::DifferentialEvolution)
	}
}

impl fmt::Display for FitStrategy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for FitStrategy {
	type Err = RoomEqError;

	fn from_str(s: &str) -> Result<Self> {
		let t = s.trim().to_lowercase();
		FitStrategy::ALL
			.into_iter()
			.find(|st| st.name() == t || st.short_name() == t)
			.ok_or_else(|| RoomEqError::UnknownName { kind: "strategy", name: s.to_string() })
	}
}

/// Target read on the fitting grid, moved to 0 dB in the flat region.
#[derive(Debug, Clone)]
pub struct PeqTarget {
	pub freq: Array1<f64>,
	pub spl: Array1<f64>,
	/// Offset (dB) added to the curve
	pub moved_db: f64,
}

/// Read `curve` on 500 log spaced points from 20 Hz to 20 kHz and move it.
///
/// Without `mag_offset` the mean over 200-4000 Hz is brought to 0 dB;
/// a non zero `mag_offset` is added instead.
pub fn prepare_target(curve: &Curve, mag_offset: f64) -> Result<PeqTarget> {
	curve.validate()?;
	let freq = geomspace(20.0, 20000.0, TARGET_POINTS);
	let spl = interpolate(&freq, &curve.freq, &curve.spl);
	let moved_db = if mag_offset != 0.0 {
		mag_offset
	} else {
		let avg = curve.flat_region_average(FLAT_REGION_HZ.0, FLAT_REGION_HZ.1);
		(-avg * 100.0).round() / 100.0
	};
	log::debug!("target moved by {:+.2} dB", moved_db);
	Ok(PeqTarget { spl: spl + moved_db, freq, moved_db })
}

/// Best parameters of a run with its convergence data.
#[derive(Debug, Clone)]
pub struct FitOutcome {
	pub x: Array1<f64>,
	pub converged: bool,
	pub message: String,
	pub iterations: usize,
	pub evaluations: usize,
}

/// A fitted PEQ set with the target it was fitted to.
#[derive(Debug, Clone)]
pub struct PeqFit {
	pub record: PeqRecord,
	pub target: PeqTarget,
	/// Unrounded `(fc, Q, gain)` triplets, before the `min_gain` cut
	pub raw_params: Vec<(f64, f64, f64)>,
}

fn initial_params(n: usize, f_lo: f64, f_hi: f64, q: f64) -> Array1<f64> {
	let centers = geomspace(f_lo, f_hi, n);
	let params: Vec<(f64, f64, f64)> = centers.iter().map(|&fc| (fc, q, 0.0)).collect();
	params2x(&params)
}

fn weighted_sse(freq: &Array1<f64>, target: &Array1<f64>, weights: &Array1<f64>, x: &Array1<f64>, fs: f64) -> f64 {
	let model = x2spl(freq, &x.to_vec(), fs);
	(target - &model).mapv(|e| e * e).dot(weights)
}

/// Box of one strategy, with the bounds given in the configuration taking
/// precedence.
fn strategy_bounds(config: &PeqConfig, fc: (f64, f64), q: (f64, f64), gain: (f64, f64)) -> Vec<(f64, f64)> {
	x_bounds(
		config.num_filters,
		config.fc_bounds.unwrap_or(fc),
		config.q_bounds.unwrap_or(q),
		config.gain_bounds.unwrap_or(gain),
	)
}

fn local_config(config: &PeqConfig, algorithm: LocalAlgorithm, maxeval: usize, ftol_rel: f64) -> LocalConfig {
	LocalConfig {
		algorithm,
		maxeval: config.max_evaluations.unwrap_or(maxeval),
		ftol_rel,
		xtol_rel: 1e-8,
		..LocalConfig::default()
	}
}

#[cfg(feature = "nlopt")]
fn local_search<F>(objective: &F, x0: &Array1<f64>, bounds: &[(f64, f64)], config: &LocalConfig) -> Result<FitOutcome>
where
	F: Fn(&Array1<f64>) -> f64,
{
	let bounds = Bounds::from_pairs(bounds)?;
	let report = nlopt_minimize(objective, x0, &bounds, config)?;
	Ok(FitOutcome {
		x: report.x,
		converged: report.success,
		message: format!("{}: {}", config.algorithm, report.message),
		iterations: report.nit,
		evaluations: report.nfev,
	})
}

#[cfg(not(feature = "nlopt"))]
fn local_search<F>(_objective: &F, _x0: &Array1<f64>, _bounds: &[(f64, f64)], config: &LocalConfig) -> Result<FitOutcome>
where
	F: Fn(&Array1<f64>) -> f64,
{
	Err(RoomEqError::InvalidParameter {
		what: "strategy",
		message: format!("{} needs a build with the nlopt feature", config.algorithm),
	})
}

fn fit_minimize(target: &PeqTarget, config: &PeqConfig) -> Result<FitOutcome> {
	let (n, fs) = (config.num_filters, config.fs as f64);
	let weights = target.freq.mapv(|f| {
		let w = 1.0 / f.log10();
		if f < 100.0 { w * 5.0 } else { w }
	});
	let x0 = initial_params(n, 50.0, 15000.0, 1.4);
	let bounds = strategy_bounds(config, (20.0, 20000.0), (0.1, 7.2), (-18.0, 3.0));
	let objective = |x: &Array1<f64>| weighted_sse(&target.freq, &target.spl, &weights, x, fs);
	local_search(&objective, &x0, &bounds, &local_config(config, LocalAlgorithm::Lbfgs, 3000, 1e-10))
}

fn fit_least_squares(target: &PeqTarget, config: &PeqConfig) -> Result<FitOutcome> {
	let (n, fs) = (config.num_filters, config.fs as f64);
	// residuals are scaled by the weights, hence the squares
	let weights = target.freq.mapv(|f| {
		let w = (500.0 / f).sqrt().max(0.5);
		if f < 200.0 { 4.0 * w * w } else { w * w }
	});
	let x0 = initial_params(n, 30.0, 15000.0, 1.2);
	let bounds = strategy_bounds(config, (20.0, 15000.0), (0.1, 9.0), (-18.0, 6.0));
	let objective = |x: &Array1<f64>| weighted_sse(&target.freq, &target.spl, &weights, x, fs);
	local_search(&objective, &x0, &bounds, &local_config(config, LocalAlgorithm::Bobyqa, 20_000, 1e-10))
}

fn fit_least_squares_bass(target: &PeqTarget, config: &PeqConfig) -> Result<FitOutcome> {
	let (n, fs) = (config.num_filters, config.fs as f64);
	// stage 1: bass only
	let keep: Vec<usize> = (0..target.freq.len()).filter(|&i| target.freq[i] < BASS_STAGE_HZ).collect();
	let f_bass = target.freq.select(ndarray::Axis(0), &keep);
	let m_bass = target.spl.select(ndarray::Axis(0), &keep);
	let ones = Array1::ones(f_bass.len());
	let x0 = initial_params(n, 30.0, 400.0, 1.0);
	let bounds = strategy_bounds(config, (20.0, 15000.0), (0.1, 9.0), (-18.0, 6.0));
	let objective = |x: &Array1<f64>| weighted_sse(&f_bass, &m_bass, &ones, x, fs);
	let stage1 = local_search(&objective, &x0, &bounds, &local_config(config, LocalAlgorithm::Bobyqa, 10_000, 1e-4))?;
	log::debug!("bass stage: {} after {} calls", stage1.message, stage1.iterations);

	// stage 2: full band from the bass solution
	let weights = target.freq.mapv(|f| if f < BASS_STAGE_HZ { 25.0 } else { 1.0 });
	let bounds = strategy_bounds(config, (20.0, 20000.0), (0.1, 15.0), (-24.0, 24.0));
	let objective = |x: &Array1<f64>| weighted_sse(&target.freq, &target.spl, &weights, x, fs);
	let stage2 = local_search(&objective, &stage1.x, &bounds, &local_config(config, LocalAlgorithm::Bobyqa, 20_000, 1e-10))?;
	Ok(FitOutcome {
		x: stage2.x,
		converged: stage1.converged && stage2.converged,
		message: stage2.message,
		iterations: stage1.iterations + stage2.iterations,
		evaluations: stage1.evaluations + stage2.evaluations,
	})
}

fn fit_differential_evolution(target: &PeqTarget, config: &PeqConfig) -> Result<FitOutcome> {
	let fs = config.fs as f64;
	let weights = target.freq.mapv(|f| (20000.0 / f).powf(1.2));
	let bounds = strategy_bounds(config, (20.0, 20000.0), (0.1, 7.2), (-18.0, 3.0));
	let objective = |x: &Array1<f64>| weighted_sse(&target.freq, &target.spl, &weights, x, fs);
	let mut builder = DEConfigBuilder::new()
		.maxiter(config.de_maxiter)
		.popsize(15)
		.tol(0.01)
		.mutation(Mutation::Range { min: 0.5, max: 1.0 })
		.recombination(0.7)
		.strategy(Strategy::Best1Bin)
		.enable_parallel(true);
	if let Some(seed) = config.seed {
		builder = builder.seed(seed);
	}
	let report = differential_evolution(&objective, &bounds, builder.build())?;
	Ok(FitOutcome {
		x: report.x,
		converged: report.success,
		message: report.message,
		iterations: report.nit,
		evaluations: report.nfev,
	})
}

/// Run `strategy` with `config.num_filters` filters on a prepared target.
pub fn run_strategy(strategy: FitStrategy, target: &PeqTarget, config: &PeqConfig) -> Result<FitOutcome> {
	match strategy {
		FitStrategy::Minimize => fit_minimize(target, config),
		FitStrategy::LeastSquaresBass => fit_least_squares_bass(target, config),
		FitStrategy::LeastSquares => fit_least_squares(target, config),
		FitStrategy::DifferentialEvolution => fit_differential_evolution(target, config),
	}
}

/// Fit a PEQ set to `curve` (dB).
///
/// A run that stops before its tolerance is met still returns its best
/// filters, flagged in the record's optimizer info.
pub fn fit(curve: &Curve, config: &PeqConfig, set_name: &str) -> Result<PeqFit> {
	config.validate()?;
	let strategy = FitStrategy::from_str(&config.strategy)?;
	let target = prepare_target(curve, config.mag_offset)?;
	log::info!("fitting {} peaking filters with {}", config.num_filters, strategy);

	let outcome = run_strategy(strategy, &target, config)?;
	if !outcome.converged {
		log::warn!("{} did not converge: {}", strategy, outcome.message);
	}
	let raw_params = x2params(&outcome.x.to_vec());
	let filters = PeqFilterSet::from_fit(&raw_params, config.min_gain);
	log::info!("kept {} of {} filters (|gain| > {} dB)", filters.len(), raw_params.len(), config.min_gain);

	let mut record = PeqRecord::new(filters, config.fs, target.moved_db, set_name);
	let metrics = record.analyse(&target.freq, &target.spl, config.fs);
	log::info!(
		"rmse total {:.3} dB, bass {:.3} dB, treble {:.3} dB",
		metrics.rmse_total_db,
		metrics.rmse_bass_db,
		metrics.rmse_treble_db
	);
	record.optimizer = Some(OptimizerInfo {
		strategy: strategy.name().to_string(),
		converged: outcome.converged,
		message: outcome.message,
		iterations: outcome.iterations,
		evaluations: outcome.evaluations,
	});
	Ok(PeqFit { record, target, raw_params })
}

/// Recompute the metrics of an existing set against `curve`.
pub fn reanalyse(record: &mut PeqRecord, curve: &Curve, mag_offset: f64, fs: u32) -> Result<PeqTarget> {
	let target = prepare_target(curve, mag_offset)?;
	record.moved_db = target.moved_db;
	record.analyse(&target.freq, &target.spl, fs);
	Ok(target)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::read::create_log_frequency_grid;

	fn curve_of(f: impl Fn(f64) -> f64) -> Curve {
		let freq = create_log_frequency_grid(800, 10.0, 24000.0);
		let spl = freq.mapv(f);
		Curve::new(freq, spl).unwrap()
	}

	#[test]
	fn test_strategy_names() {
		assert_eq!(FitStrategy::from_str("min").unwrap(), FitStrategy::Minimize);
		assert_eq!(FitStrategy::from_str("ls_bass").unwrap(), FitStrategy::LeastSquaresBass);
		assert_eq!(FitStrategy::from_str("least_squares").unwrap(), FitStrategy::LeastSquares);
		assert_eq!(FitStrategy::from_str("diff").unwrap(), FitStrategy::DifferentialEvolution);
		assert!(matches!(FitStrategy::from_str("nlopt"), Err(RoomEqError::UnknownName { kind: "strategy", .. })));
		assert!(FitStrategy::DifferentialEvolution.is_global());
	}

	#[test]
	fn test_prepare_target_offsets() {
		let c = curve_of(|_| 4.0);
		let t = prepare_target(&c, 0.0).unwrap();
		assert_eq!(t.freq.len(), TARGET_POINTS);
		assert_eq!(t.moved_db, -4.0);
		assert!(t.spl.iter().all(|v| v.abs() < 1e-9));

		let t = prepare_target(&c, 1.5).unwrap();
		assert_eq!(t.moved_db, 1.5);
		assert!(t.spl.iter().all(|v| (v - 5.5).abs() < 1e-9));
	}

	#[test]
	fn test_minimize_recovers_filters() {
		let truth = PeqFilterSet::from_fit(&[(60.0, 4.0, -6.0), (8000.0, 2.0, 2.0)], 0.0);
		let freq = create_log_frequency_grid(800, 10.0, 24000.0);
		let spl = truth.response(&freq, 48000.0);
		let c = Curve::new(freq, spl).unwrap();
		let fit = fit(&c, &PeqConfig::default(), "truth").unwrap();
		let metrics = fit.record.analysis.as_ref().unwrap().residual_error;
		assert!(metrics.rmse_total_db < 1.0, "{:?}", metrics);
		assert!(fit.record.filters.len() <= 6);
		let info = fit.record.optimizer.as_ref().unwrap();
		assert_eq!(info.strategy, "minimize");
		assert!(info.evaluations > 0);
	}

	#[test]
	fn test_differential_evolution_single_filter() {
		let truth = PeqFilterSet::from_fit(&[(120.0, 3.0, -8.0)], 0.0);
		let freq = create_log_frequency_grid(400, 10.0, 24000.0);
		let c = Curve::new(freq.clone(), truth.response(&freq, 48000.0)).unwrap();
		let cfg = PeqConfig {
			num_filters: 1,
			strategy: "diff".into(),
			seed: Some(7),
			de_maxiter: 200,
			..Default::default()
		};
		let fit = fit(&c, &cfg, "de").unwrap();
		let metrics = fit.record.analysis.as_ref().unwrap().residual_error;
		assert!(metrics.rmse_total_db < 1.0, "{:?}", metrics);
		assert_eq!(fit.record.filters.len(), 1);
		assert!((fit.record.filters.filters[0].fc - 120.0).abs() < 20.0);
	}

	#[test]
	fn test_configured_bounds_are_honoured() {
		let c = curve_of(|f| -9.0 * (-(f / 90.0).log2().powi(2) * 4.0).exp() + 4.0 * (-(f / 3000.0).log2().powi(2)).exp());
		for strategy in ["min", "ls", "ls_bass", "diff"] {
			let cfg = PeqConfig {
				strategy: strategy.into(),
				min_gain: 0.0,
				seed: Some(3),
				de_maxiter: 30,
				fc_bounds: Some((40.0, 8000.0)),
				q_bounds: Some((0.5, 4.0)),
				gain_bounds: Some((-6.0, 2.0)),
				..Default::default()
			};
			let fit = fit(&c, &cfg, "bounded").unwrap();
			for &(fc, q, gain) in &fit.raw_params {
				assert!((40.0 - 1e-6..=8000.0 + 1e-6).contains(&fc), "{}: fc {}", strategy, fc);
				assert!((0.5 - 1e-9..=4.0 + 1e-9).contains(&q), "{}: q {}", strategy, q);
				assert!((-6.0 - 1e-9..=2.0 + 1e-9).contains(&gain), "{}: gain {}", strategy, gain);
			}
		}
	}

	#[test]
	fn test_inverted_bounds_stop_the_fit() {
		let c = curve_of(|_| 0.0);
		let cfg = PeqConfig { fc_bounds: Some((5000.0, 100.0)), ..Default::default() };
		let err = fit(&c, &cfg, "inverted").unwrap_err();
		assert!(matches!(err, RoomEqError::InvalidBounds { what: "fc", .. }));
	}

	#[test]
	fn test_budget_exhausted_returns_best_filters() {
		let c = curve_of(|f| 6.0 * (2.0 * std::f64::consts::PI * f.log10()).sin());

		let cfg = PeqConfig { strategy: "diff".into(), seed: Some(11), de_maxiter: 2, ..Default::default() };
		let fit_de = fit(&c, &cfg, "short").unwrap();
		let info = fit_de.record.optimizer.as_ref().unwrap();
		assert!(!info.converged, "{}", info.message);
		assert_eq!(info.iterations, 2);
		assert!(!fit_de.record.filters.is_empty());
		assert!(fit_de.record.analysis.as_ref().unwrap().residual_error.rmse_total_db.is_finite());

		let cfg = PeqConfig { strategy: "min".into(), max_evaluations: Some(5), ..Default::default() };
		let fit_min = fit(&c, &cfg, "short").unwrap();
		let info = fit_min.record.optimizer.as_ref().unwrap();
		assert!(!info.converged);
		assert!(info.message.contains("maximum evaluations"), "{}", info.message);
		assert_eq!(fit_min.raw_params.len(), 6);
	}

	#[test]
	fn test_filters_are_sorted_and_numbered() {
		let c = curve_of(|f| -5.0 * (-(f / 80.0).log2().powi(2) * 4.0).exp() + 3.0 * (-(f / 2500.0).log2().powi(2)).exp());
		for strategy in ["min", "ls", "ls_bass"] {
			let cfg = PeqConfig { strategy: strategy.into(), ..Default::default() };
			let fit = fit(&c, &cfg, "sorted").unwrap();
			let filters = &fit.record.filters.filters;
			for (i, f) in filters.iter().enumerate() {
				assert_eq!(f.id, i);
				assert!(f.gain.abs() > cfg.min_gain);
				if i > 0 {
					assert!(filters[i - 1].fc <= f.fc);
				}
			}
		}
	}
}
