use ndarray::Array1;

/// Create a standard logarithmic frequency grid
pub fn create_log_frequency_grid(n_points: usize, f_min: f64, f_max: f64) -> Array1<f64> {
    Array1::logspace(10.0, f_min.log10(), f_max.log10(), n_points)
}

// index j such that x[j] <= t < x[j+1], caller guarantees x[0] < t < x[last]
fn bracket(x: &Array1<f64>, t: f64) -> usize {
    let mut lo = 0;
    let mut hi = x.len() - 1;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if x[mid] <= t {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Linear interpolation function
///
/// Values outside the source range are clamped to the first or last point.
///
/// # Arguments
/// * `target_freqs` - Target frequencies to interpolate to
/// * `source_freqs` - Source frequency array (strictly increasing)
/// * `source_spls` - Source SPL values
///
/// # Returns
/// * Interpolated SPL values at target frequencies
pub fn interpolate(
    target_freqs: &Array1<f64>,
    source_freqs: &Array1<f64>,
    source_spls: &Array1<f64>,
) -> Array1<f64> {
    let n = source_freqs.len();
    if n == 0 {
        return Array1::zeros(target_freqs.len());
    }
    target_freqs.mapv(|target_freq| {
        if target_freq <= source_freqs[0] {
            source_spls[0]
        } else if target_freq >= source_freqs[n - 1] {
            source_spls[n - 1]
        } else {
            let j = bracket(source_freqs, target_freq);
            let t = (target_freq - source_freqs[j]) / (source_freqs[j + 1] - source_freqs[j]);
            source_spls[j] + t * (source_spls[j + 1] - source_spls[j])
        }
    })
}

/// Linear interpolation over `log10(f)`, clamped at both ends.
///
/// Non positive frequencies are mapped onto the first positive source bin.
pub fn interpolate_log_space(
    target_freqs: &Array1<f64>,
    source_freqs: &Array1<f64>,
    source_spls: &Array1<f64>,
) -> Array1<f64> {
    let first_positive = source_freqs.iter().position(|&f| f > 0.0).unwrap_or(0);
    let src_f = source_freqs.slice(ndarray::s![first_positive..]).mapv(f64::log10);
    let src_v = source_spls.slice(ndarray::s![first_positive..]).to_owned();
    let tgt = target_freqs.mapv(|f| if f > 0.0 { f.log10() } else { f64::NEG_INFINITY });
    interpolate(&tgt, &src_f, &src_v)
}

/// Reduce a linearly spaced half spectrum onto `n_points` log spaced points.
///
/// The grid runs from the first non zero bin to the last bin (Nyquist).
pub fn logspaced_semispectrum(
    freq: &Array1<f64>,
    values: &Array1<f64>,
    n_points: usize,
) -> (Array1<f64>, Array1<f64>) {
    let f_min = freq.iter().cloned().find(|&f| f > 0.0).unwrap_or(1.0);
    let f_max = freq[freq.len() - 1];
    let grid = create_log_frequency_grid(n_points, f_min, f_max);
    let reduced = interpolate(&grid, freq, values);
    (grid, reduced)
}
