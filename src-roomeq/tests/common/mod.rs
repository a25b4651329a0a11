#![allow(dead_code)]
use ndarray::{Array1, s};
use roomeq::Curve;
use roomeq::read::create_log_frequency_grid;

pub fn log_curve(n: usize, f: impl Fn(f64) -> f64) -> Curve {
    let freq = create_log_frequency_grid(n, 5.0, 24000.0);
    let spl = freq.mapv(f);
    Curve::new(freq, spl).unwrap()
}

/// Gaussian bump over log2(f), `sigma` in octaves.
pub fn bump(f: f64, center: f64, sigma: f64, gain: f64) -> f64 {
    let x = (f / center).log2() / sigma;
    gain * (-0.5 * x * x).exp()
}

/// `x` shifted by `d` samples (positive delays), zero filled.
pub fn shifted(x: &Array1<f64>, d: i64) -> Array1<f64> {
    let n = x.len();
    let mut out = Array1::<f64>::zeros(n);
    let k = d.unsigned_abs() as usize;
    if d >= 0 {
        out.slice_mut(s![k..]).assign(&x.slice(s![..n - k]));
    } else {
        out.slice_mut(s![..n - k]).assign(&x.slice(s![k..]));
    }
    out
}
