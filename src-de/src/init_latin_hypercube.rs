use ndarray::Array2;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::Bounds;

/// Latin hypercube sampling: every parameter range is cut in `npop`
/// strata and each stratum receives exactly one member.
pub(crate) fn init_latin_hypercube<R: Rng + ?Sized>(
    npop: usize,
    bounds: &Bounds,
    rng: &mut R,
) -> Array2<f64> {
    let n = bounds.len();
    let mut pop = Array2::<f64>::zeros((npop, n));
    let mut strata: Vec<usize> = (0..npop).collect();
    for j in 0..n {
        let lo = bounds.lower[j];
        let span = bounds.upper[j] - lo;
        strata.shuffle(rng);
        for (i, &s) in strata.iter().enumerate() {
            let u: f64 = rng.random::<f64>();
            pop[[i, j]] = lo + span * (s as f64 + u) / npop as f64;
        }
    }
    pop
}
