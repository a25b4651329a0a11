use std::fmt;
use std::str::FromStr;

use ndarray::Array1;

/// Local NLopt algorithms that honour box bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalAlgorithm {
	Lbfgs,
	Slsqp,
	Bobyqa,
	Cobyla,
	Neldermead,
	Sbplx,
}

impl LocalAlgorithm {
	pub fn name(self) -> &'static str {
		match self {
			LocalAlgorithm::Lbfgs => "lbfgs",
			LocalAlgorithm::Slsqp => "slsqp",
			LocalAlgorithm::Bobyqa => "bobyqa",
			LocalAlgorithm::Cobyla => "cobyla",
			LocalAlgorithm::Neldermead => "neldermead",
			LocalAlgorithm::Sbplx => "sbplx",
		}
	}

	/// Gradient based algorithms get a central difference gradient.
	pub fn uses_gradient(self) -> bool {
		matches!(self, LocalAlgorithm::Lbfgs | LocalAlgorithm::Slsqp)
	}
}

impl fmt::Display for LocalAlgorithm {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for LocalAlgorithm {
	type Err = String;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let t = s.to_lowercase();
		match t.strip_prefix("nlopt:").unwrap_or(&t) {
			"lbfgs" => Ok(LocalAlgorithm::Lbfgs),
			"slsqp" => Ok(LocalAlgorithm::Slsqp),
			"bobyqa" => Ok(LocalAlgorithm::Bobyqa),
			"cobyla" => Ok(LocalAlgorithm::Cobyla),
			"neldermead" | "nelder-mead" => Ok(LocalAlgorithm::Neldermead),
			"sbplx" | "subplex" => Ok(LocalAlgorithm::Sbplx),
			_ => Err(format!("unknown local algorithm: {}", s)),
		}
	}
}

/// Configuration of a bounded local search
#[derive(Debug, Clone)]
pub struct LocalConfig {
	pub algorithm: LocalAlgorithm,
	/// Maximum number of objective calls
	pub maxeval: usize,
	pub ftol_rel: f64,
	pub xtol_rel: f64,
	/// Relative step of the central difference gradient
	pub fd_step: f64,
}

impl Default for LocalConfig {
	fn default() -> Self {
		Self { algorithm: LocalAlgorithm::Bobyqa, maxeval: 10_000, ftol_rel: 1e-10, xtol_rel: 1e-8, fd_step: 1e-7 }
	}
}

/// Result of a bounded local search
#[derive(Debug, Clone)]
pub struct LocalReport {
	pub x: Array1<f64>,
	pub fun: f64,
	/// False when the run stopped on its evaluation budget
	pub success: bool,
	pub message: String,
	/// Objective calls made by the solver
	pub nit: usize,
	/// Function evaluations, gradient evaluations included
	pub nfev: usize,
}
