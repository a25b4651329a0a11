use ndarray::Array2;
use rand::Rng;

use crate::Bounds;

/// Uniform random initialisation inside the bounds.
pub(crate) fn init_random<R: Rng + ?Sized>(
    npop: usize,
    bounds: &Bounds,
    rng: &mut R,
) -> Array2<f64> {
    let n = bounds.len();
    Array2::from_shape_fn((npop, n), |(_, j)| {
        let u: f64 = rng.random::<f64>();
        bounds.lower[j] + u * (bounds.upper[j] - bounds.lower[j])
    })
}
