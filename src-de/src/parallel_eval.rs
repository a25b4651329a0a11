use ndarray::{Array1, Array2};
use rayon::prelude::*;

/// Parallel evaluation settings
#[derive(Debug, Clone, Copy)]
pub struct ParallelConfig {
    /// Evaluate candidates on the rayon pool
    pub enabled: bool,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Evaluate every row of `pop`.
pub(crate) fn evaluate_population<F>(pop: &Array2<f64>, func: &F, parallel: &ParallelConfig) -> Array1<f64>
where
    F: Fn(&Array1<f64>) -> f64 + Sync,
{
    let rows: Vec<Array1<f64>> = pop.rows().into_iter().map(|r| r.to_owned()).collect();
    evaluate_trials(&rows, func, parallel)
}

/// Evaluate a batch of candidate vectors.
pub(crate) fn evaluate_trials<F>(trials: &[Array1<f64>], func: &F, parallel: &ParallelConfig) -> Array1<f64>
where
    F: Fn(&Array1<f64>) -> f64 + Sync,
{
    let energies: Vec<f64> = if parallel.enabled {
        trials.par_iter().map(|x| sanitize(func(x))).collect()
    } else {
        trials.iter().map(|x| sanitize(func(x))).collect()
    };
    Array1::from(energies)
}

// NaN energies would never be replaced by selection
fn sanitize(v: f64) -> f64 {
    if v.is_nan() { f64::INFINITY } else { v }
}
