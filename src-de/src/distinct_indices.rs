use rand::Rng;

/// Draw `k` distinct indices in `0..n`, all different from `exclude`.
///
/// The caller guarantees `n > k`.
pub(crate) fn distinct_indices<R: Rng + ?Sized>(
    exclude: usize,
    k: usize,
    n: usize,
    rng: &mut R,
) -> Vec<usize> {
    let mut idxs = Vec::with_capacity(k);
    while idxs.len() < k {
        let r = rng.random_range(0..n);
        if r != exclude && !idxs.contains(&r) {
            idxs.push(r);
        }
    }
    idxs
}
