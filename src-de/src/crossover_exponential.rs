use ndarray::Array1;
use rand::Rng;

/// Exponential crossover: copy a run of consecutive genes (wrapping) from
/// the mutant, starting at a random position.
pub(crate) fn exponential_crossover<R: Rng + ?Sized>(
    target: &Array1<f64>,
    mutant: &Array1<f64>,
    cr: f64,
    rng: &mut R,
) -> Array1<f64> {
    let n = target.len();
    let mut trial = target.clone();
    let mut j = rng.random_range(0..n);
    let mut copied = 0;
    loop {
        trial[j] = mutant[j];
        copied += 1;
        j = (j + 1) % n;
        if copied >= n || rng.random::<f64>() >= cr {
            break;
        }
    }
    trial
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crossover_binomial::binomial_crossover;
    use ndarray::Array1;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_crossovers_take_at_least_one_gene() {
        let target = Array1::<f64>::zeros(8);
        let mutant = Array1::<f64>::ones(8);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let t1 = binomial_crossover(&target, &mutant, 0.0, &mut rng);
            assert_eq!(t1.sum(), 1.0);
            let t2 = exponential_crossover(&target, &mutant, 0.0, &mut rng);
            assert_eq!(t2.sum(), 1.0);
            let t3 = exponential_crossover(&target, &mutant, 1.0, &mut rng);
            assert_eq!(t3.sum(), 8.0);
        }
    }
}
