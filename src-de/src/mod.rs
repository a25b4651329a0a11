//! Bounded non linear optimisation using ndarray
//!
//! Two solvers share the same box constraint type [`Bounds`]:
//! - [`differential_evolution`]: global search, inspired by SciPy's
//!   `scipy.optimize.differential_evolution`
//! - `nlopt_minimize`: bounded local search through NLopt (feature `nlopt`)
//!
//! Supported DE features:
//! - Strategies: best1bin, best1exp, rand1bin, rand1exp, rand2bin, best2bin, currenttobest1bin
//! - Mutation as a fixed factor or dithering in a range [min,max)
//! - Initialization: Latin Hypercube Sampling (LHS) or random uniform
//! - Optional initial guess `x0` overriding the best member after init
//! - Convergence by std(pop_f) <= atol + tol * |mean(pop_f)|
//! - Optional polishing of the best member with an NLopt local algorithm

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

mod bounds;
mod error;

mod distinct_indices;
mod init_latin_hypercube;
mod init_random;

mod mutant_best1;
mod mutant_best2;
mod mutant_current_to_best1;
mod mutant_rand1;
mod mutant_rand2;

mod crossover_binomial;
mod crossover_exponential;

mod differential_evolution;
mod local;
#[cfg(feature = "nlopt")]
mod local_nlopt;
mod parallel_eval;

pub use bounds::Bounds;
pub use differential_evolution::differential_evolution;
pub use error::OptimError;
pub use local::{LocalAlgorithm, LocalConfig, LocalReport};
#[cfg(feature = "nlopt")]
pub use local_nlopt::nlopt_minimize;
pub use parallel_eval::ParallelConfig;

pub(crate) fn argmin(v: &Array1<f64>) -> (usize, f64) {
	let mut best_i = 0usize;
	let mut best_v = v[0];
	for (i, &val) in v.iter().enumerate() {
		if val < best_v {
			best_v = val;
			best_i = i;
		}
	}
	(best_i, best_v)
}

/// Differential Evolution strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
	Best1Bin,
	Best1Exp,
	Rand1Bin,
	Rand1Exp,
	Rand2Bin,
	CurrentToBest1Bin,
	Best2Bin,
}

impl FromStr for Strategy {
	type Err = String;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let t = s.to_lowercase();
		match t.as_str() {
			"best1bin" | "best1" => Ok(Strategy::Best1Bin),
			"best1exp" => Ok(Strategy::Best1Exp),
			"rand1bin" | "rand1" => Ok(Strategy::Rand1Bin),
			"rand1exp" => Ok(Strategy::Rand1Exp),
			"rand2bin" | "rand2" => Ok(Strategy::Rand2Bin),
			"currenttobest1bin" | "current-to-best1bin" | "current_to_best1bin" => {
				Ok(Strategy::CurrentToBest1Bin)
			}
			"best2bin" | "best2" => Ok(Strategy::Best2Bin),
			_ => Err(format!("unknown strategy: {}", s)),
		}
	}
}

/// Crossover type
#[derive(Debug, Clone, Copy)]
enum Crossover {
	Binomial,
	Exponential,
}

/// Mutation setting: either a fixed factor or a uniform range (dithering)
#[derive(Debug, Clone, Copy)]
pub enum Mutation {
	/// Fixed mutation factor F in [0, 2)
	Factor(f64),
	/// Dithering range [min, max) with 0 <= min < max <= 2
	Range { min: f64, max: f64 },
}

impl Default for Mutation {
	fn default() -> Self {
		Mutation::Range { min: 0.5, max: 1.0 }
	}
}

impl Mutation {
	fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
		match *self {
			Mutation::Factor(f) => f,
			Mutation::Range { min, max } if max > min => rng.random_range(min..max),
			Mutation::Range { min, .. } => min,
		}
	}
}

/// Initialization scheme for the population
#[derive(Debug, Clone, Copy, Default)]
pub enum Init {
	#[default]
	LatinHypercube,
	Random,
}

/// Polishing configuration using NLopt local optimizer within bounds
#[derive(Debug, Clone)]
pub struct PolishConfig {
	pub enabled: bool,
	pub algo: String,   // e.g., "bobyqa", "neldermead", "sbplx"
	pub maxeval: usize, // e.g., 200*n
}

impl Default for PolishConfig {
	fn default() -> Self {
		Self { enabled: true, algo: "bobyqa".to_string(), maxeval: 1000 }
	}
}

/// Configuration for the Differential Evolution optimizer
pub struct DEConfig {
	pub maxiter: usize,
	pub popsize: usize, // total NP = popsize * n_params_free
	pub tol: f64,
	pub atol: f64,
	pub mutation: Mutation,
	pub recombination: f64, // CR in [0,1]
	pub strategy: Strategy,
	pub init: Init,
	pub seed: Option<u64>,
	/// Optional initial guess used to replace the best member after init
	pub x0: Option<Array1<f64>>,
	/// Log the best objective at each iteration
	pub disp: bool,
	/// Optional per-iteration callback (may stop early)
	pub callback: Option<Box<dyn FnMut(&DEIntermediate) -> CallbackAction + Send>>,
	/// Polishing configuration (optional)
	pub polish: Option<PolishConfig>,
	/// Parallel evaluation configuration
	pub parallel: ParallelConfig,
}

impl Default for DEConfig {
	fn default() -> Self {
		Self {
			maxiter: 1000,
			popsize: 15,
			tol: 1e-2,
			atol: 0.0,
			mutation: Mutation::default(),
			recombination: 0.7,
			strategy: Strategy::Best1Bin,
			init: Init::default(),
			seed: None,
			x0: None,
			disp: false,
			callback: None,
			polish: None,
			parallel: ParallelConfig::default(),
		}
	}
}

/// Fluent builder for `DEConfig` for ergonomic configuration.
#[derive(Default)]
pub struct DEConfigBuilder {
	cfg: DEConfig,
}

impl DEConfigBuilder {
	pub fn new() -> Self {
		Self { cfg: DEConfig::default() }
	}
	pub fn maxiter(mut self, v: usize) -> Self {
		self.cfg.maxiter = v;
		self
	}
	pub fn popsize(mut self, v: usize) -> Self {
		self.cfg.popsize = v;
		self
	}
	pub fn tol(mut self, v: f64) -> Self {
		self.cfg.tol = v;
		self
	}
	pub fn atol(mut self, v: f64) -> Self {
		self.cfg.atol = v;
		self
	}
	pub fn mutation(mut self, v: Mutation) -> Self {
		self.cfg.mutation = v;
		self
	}
	pub fn recombination(mut self, v: f64) -> Self {
		self.cfg.recombination = v;
		self
	}
	pub fn strategy(mut self, v: Strategy) -> Self {
		self.cfg.strategy = v;
		self
	}
	pub fn init(mut self, v: Init) -> Self {
		self.cfg.init = v;
		self
	}
	pub fn seed(mut self, v: u64) -> Self {
		self.cfg.seed = Some(v);
		self
	}
	pub fn x0(mut self, v: Array1<f64>) -> Self {
		self.cfg.x0 = Some(v);
		self
	}
	pub fn disp(mut self, v: bool) -> Self {
		self.cfg.disp = v;
		self
	}
	pub fn callback(mut self, cb: Box<dyn FnMut(&DEIntermediate) -> CallbackAction + Send>) -> Self {
		self.cfg.callback = Some(cb);
		self
	}
	pub fn polish(mut self, pol: PolishConfig) -> Self {
		self.cfg.polish = Some(pol);
		self
	}
	pub fn enable_parallel(mut self, enable: bool) -> Self {
		self.cfg.parallel.enabled = enable;
		self
	}
	pub fn build(self) -> DEConfig {
		self.cfg
	}
}

/// Result/Report of a DE optimization run
#[derive(Clone)]
pub struct DEReport {
	pub x: Array1<f64>,
	pub fun: f64,
	pub success: bool,
	pub message: String,
	pub nit: usize,
	pub nfev: usize,
	pub population: Array2<f64>,
	pub population_energies: Array1<f64>,
}

impl fmt::Debug for DEReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DEReport")
			.field("x", &format!("len={}", self.x.len()))
			.field("fun", &self.fun)
			.field("success", &self.success)
			.field("message", &self.message)
			.field("nit", &self.nit)
			.field("nfev", &self.nfev)
			.field(
				"population",
				&format!("{}x{}", self.population.nrows(), self.population.ncols()),
			)
			.field("population_energies", &format!("len={}", self.population_energies.len()))
			.finish()
	}
}

/// Information passed to callback after each generation
pub struct DEIntermediate {
	pub x: Array1<f64>,
	pub fun: f64,
	pub convergence: f64, // measured as std(pop_f)
	pub iter: usize,
}

/// Action returned by callback
pub enum CallbackAction {
	Continue,
	Stop,
}

/// Differential Evolution optimizer
pub struct DifferentialEvolution<'a, F>
where
	F: Fn(&Array1<f64>) -> f64 + Sync,
{
	func: &'a F,
	bounds: Bounds,
	config: DEConfig,
}

impl<'a, F> DifferentialEvolution<'a, F>
where
	F: Fn(&Array1<f64>) -> f64 + Sync,
{
	/// Create a new DE optimizer with objective `func` inside `bounds`
	pub fn new(func: &'a F, bounds: Bounds) -> Self {
		Self { func, bounds, config: DEConfig::default() }
	}

	/// Mutable access to configuration
	pub fn config_mut(&mut self) -> &mut DEConfig {
		&mut self.config
	}

	fn rng_for(&self, iter: usize, i: usize) -> StdRng {
		match self.config.seed {
			Some(base_seed) => StdRng::seed_from_u64(
				base_seed.wrapping_add((iter as u64) << 32).wrapping_add(i as u64),
			),
			None => {
				let mut thread_rng = rand::rng();
				StdRng::from_rng(&mut thread_rng)
			}
		}
	}

	fn trial(&self, i: usize, pop: &Array2<f64>, best_idx: usize, rng: &mut StdRng) -> Array1<f64> {
		use crossover_binomial::binomial_crossover;
		use crossover_exponential::exponential_crossover;
		use mutant_best1::mutant_best1;
		use mutant_best2::mutant_best2;
		use mutant_current_to_best1::mutant_current_to_best1;
		use mutant_rand1::mutant_rand1;
		use mutant_rand2::mutant_rand2;

		let f = self.config.mutation.sample(rng);
		let cr = self.config.recombination;
		let (mutant, cross) = match self.config.strategy {
			Strategy::Best1Bin => (mutant_best1(i, pop, best_idx, f, rng), Crossover::Binomial),
			Strategy::Best1Exp => (mutant_best1(i, pop, best_idx, f, rng), Crossover::Exponential),
			Strategy::Rand1Bin => (mutant_rand1(i, pop, f, rng), Crossover::Binomial),
			Strategy::Rand1Exp => (mutant_rand1(i, pop, f, rng), Crossover::Exponential),
			Strategy::Rand2Bin => (mutant_rand2(i, pop, f, rng), Crossover::Binomial),
			Strategy::CurrentToBest1Bin => {
				(mutant_current_to_best1(i, pop, best_idx, f, rng), Crossover::Binomial)
			}
			Strategy::Best2Bin => (mutant_best2(i, pop, best_idx, f, rng), Crossover::Binomial),
		};
		let target = pop.row(i).to_owned();
		let trial = match cross {
			Crossover::Binomial => binomial_crossover(&target, &mutant, cr, rng),
			Crossover::Exponential => exponential_crossover(&target, &mutant, cr, rng),
		};
		self.bounds.clipped(&trial)
	}

	/// Run the optimization and return a report
	///
	/// # Errors
	/// Returns an error when `x0` does not match the problem dimension.
	pub fn solve(&mut self) -> Result<DEReport, OptimError> {
		use init_latin_hypercube::init_latin_hypercube;
		use init_random::init_random;
		use parallel_eval::{evaluate_population, evaluate_trials};

		let n = self.bounds.len();
		if let Some(x0) = &self.config.x0 {
			self.bounds.check_dimension(x0)?;
		}

		let n_free = (0..n).filter(|&i| !self.bounds.is_fixed(i)).count();
		if n_free == 0 {
			// All fixed; just evaluate x = lower
			let x = self.bounds.lower.clone();
			let f = (self.func)(&x);
			return Ok(DEReport {
				x,
				fun: f,
				success: true,
				message: "All variables fixed by bounds".into(),
				nit: 0,
				nfev: 1,
				population: Array2::zeros((1, n)),
				population_energies: Array1::from(vec![f]),
			});
		}

		// rand2 and best2 need 5 distinct members besides the target
		let npop = (self.config.popsize * n_free).max(6);

		if self.config.disp {
			log::info!(
				"DE Init: {} dimensions ({} free), population={}, maxiter={}",
				n,
				n_free,
				npop,
				self.config.maxiter
			);
			log::info!(
				"  Strategy: {:?}, Mutation: {:?}, Crossover: CR={:.3}",
				self.config.strategy,
				self.config.mutation,
				self.config.recombination
			);
			log::info!("  Tolerances: tol={:.2e}, atol={:.2e}", self.config.tol, self.config.atol);
		}

		let mut rng = self.rng_for(0, usize::MAX >> 1);
		let mut pop = match self.config.init {
			Init::LatinHypercube => init_latin_hypercube(npop, &self.bounds, &mut rng),
			Init::Random => init_random(npop, &self.bounds, &mut rng),
		};

		let mut energies = evaluate_population(&pop, self.func, &self.config.parallel);
		let mut nfev: usize = npop;

		// If x0 provided, override the best member
		if let Some(x0) = &self.config.x0 {
			let x0c = self.bounds.clipped(x0);
			let f0 = (self.func)(&x0c);
			nfev += 1;
			let (best_idx, _best_f) = argmin(&energies);
			pop.row_mut(best_idx).assign(&x0c.view());
			energies[best_idx] = if f0.is_nan() { f64::INFINITY } else { f0 };
		}

		let (mut best_idx, mut best_f) = argmin(&energies);
		let mut best_x = pop.row(best_idx).to_owned();

		if self.config.disp {
			log::info!(
				"  Initial population: mean={:.6e}, std={:.6e}, best={:.6e}",
				energies.mean().unwrap_or(0.0),
				energies.std(0.0),
				best_f
			);
		}

		let mut success = false;
		let mut message = String::new();
		let mut nit = 0;

		for iter in 1..=self.config.maxiter {
			nit = iter;

			// Generate all trials first, then evaluate in parallel
			let trials: Vec<Array1<f64>> = (0..npop)
				.map(|i| {
					let mut local_rng = self.rng_for(iter, i);
					self.trial(i, &pop, best_idx, &mut local_rng)
				})
				.collect();
			let trial_energies = evaluate_trials(&trials, self.func, &self.config.parallel);
			nfev += npop;

			let mut accepted_trials = 0;
			for (i, (trial, trial_energy)) in trials.into_iter().zip(trial_energies.iter()).enumerate() {
				if *trial_energy <= energies[i] {
					pop.row_mut(i).assign(&trial.view());
					energies[i] = *trial_energy;
					accepted_trials += 1;
				}
			}

			let (new_best_idx, new_best_f) = argmin(&energies);
			best_idx = new_best_idx;
			if new_best_f < best_f {
				best_f = new_best_f;
				best_x = pop.row(best_idx).to_owned();
			}

			let pop_mean = energies.mean().unwrap_or(0.0);
			let pop_std = energies.std(0.0);
			let convergence_threshold = self.config.atol + self.config.tol * pop_mean.abs();

			if self.config.disp {
				log::info!(
					"DE iter {:4}  best_f={:.6e}  std={:.3e}  accepted={}/{}",
					iter,
					best_f,
					pop_std,
					accepted_trials,
					npop
				);
			}

			if let Some(ref mut cb) = self.config.callback {
				let intermediate =
					DEIntermediate { x: best_x.clone(), fun: best_f, convergence: pop_std, iter };
				if let CallbackAction::Stop = cb(&intermediate) {
					success = true;
					message = "Optimization stopped by callback".to_string();
					break;
				}
			}

			if pop_std <= convergence_threshold {
				success = true;
				message = format!(
					"Converged: std(pop_f)={:.3e} <= threshold={:.3e}",
					pop_std, convergence_threshold
				);
				break;
			}
		}

		if !success {
			message = format!("Maximum iterations reached: {}", self.config.maxiter);
		}
		if self.config.disp {
			log::info!("DE finished: {}", message);
		}

		if let Some(polish) = self.config.polish.as_ref().filter(|p| p.enabled) {
			#[cfg(feature = "nlopt")]
			{
				let algorithm = polish.algo.parse::<LocalAlgorithm>().map_err(|message| OptimError::Solver { message })?;
				let cfg = LocalConfig { algorithm, maxeval: polish.maxeval, ..LocalConfig::default() };
				let polished = nlopt_minimize(self.func, &best_x, &self.bounds, &cfg)?;
				nfev += polished.nfev;
				if polished.fun < best_f {
					log::debug!("DE polish ({}): {:.6e} -> {:.6e}", algorithm, best_f, polished.fun);
					best_f = polished.fun;
					best_x = polished.x;
				}
			}
			#[cfg(not(feature = "nlopt"))]
			log::warn!("DE polish with {} skipped: built without nlopt", polish.algo);
		}

		Ok(DEReport {
			x: best_x,
			fun: best_f,
			success,
			message,
			nit,
			nfev,
			population: pop,
			population_energies: energies,
		})
	}
}

#[cfg(test)]
mod strategy_tests {
	use super::*;

	#[test]
	fn test_parse_strategy_variants() {
		assert_eq!("best1exp".parse::<Strategy>().unwrap(), Strategy::Best1Exp);
		assert_eq!("rand1bin".parse::<Strategy>().unwrap(), Strategy::Rand1Bin);
		assert_eq!("Current-To-Best1Bin".parse::<Strategy>().unwrap(), Strategy::CurrentToBest1Bin);
		assert!("adaptive".parse::<Strategy>().is_err());
	}

	#[test]
	fn test_argmin() {
		let v = Array1::from(vec![3.0, -1.0, 2.0, -1.0]);
		assert_eq!(argmin(&v), (1, -1.0));
	}
}
