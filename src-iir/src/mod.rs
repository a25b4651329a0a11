//! Peaking biquad filters (RBJ cookbook) for room equalization.
//!
//! A set of peaking filters is evaluated in the log domain: the response of
//! a set is the sum in dB of every member's response.

use ndarray::Array1;
use num_complex::Complex64;
use std::f64::consts::PI;
use std::fmt;

/// Converts bandwidth in octaves to a Q factor.
pub fn bw2q(bw: f64) -> f64 {
    let two_pow_bw = 2.0_f64.powf(bw);
    two_pow_bw.sqrt() / (two_pow_bw - 1.0)
}

/// Converts a Q factor to bandwidth in octaves.
pub fn q2bw(q: f64) -> f64 {
    let q2 = (2.0 * q * q + 1.0) / (2.0 * q * q);
    (q2 + (q2 * q2 - 1.0).sqrt()).log(2.0)
}

/// Default sample rate
pub const SRATE: f64 = 48000.0;

/// Floor applied to the linear magnitude before converting to dB
pub const MIN_MAGNITUDE: f64 = 1.0e-5;

/// Smallest Q accepted when building a filter
pub const MIN_Q: f64 = 1.0e-2;

/// A parametric equalizer: an unordered collection of peaking biquads
pub type Peq = Vec<Biquad>;

/// A single peaking biquad IIR filter.
#[derive(Debug, Clone)]
pub struct Biquad {
    /// Center frequency in Hz
    pub freq: f64,
    /// Sample rate in Hz
    pub srate: f64,
    /// Q factor (quality factor)
    pub q: f64,
    /// Gain in dB
    pub db_gain: f64,
    a1: f64,
    a2: f64,
    b0: f64,
    b1: f64,
    b2: f64,
    /// Pre-computed coefficients for fast magnitude evaluation
    r_up0: f64,
    r_up1: f64,
    r_up2: f64,
    r_dw0: f64,
    r_dw1: f64,
    r_dw2: f64,
}

impl Biquad {
    /// Creates a peaking filter centered at `freq` with the given `q` and gain.
    pub fn peak(freq: f64, srate: f64, q: f64, db_gain: f64) -> Self {
        let mut biquad = Biquad {
            freq,
            srate,
            // alpha = sn/(2*q) must stay finite
            q: if q <= 0.0 { MIN_Q } else { q },
            db_gain,
            a1: 0.0,
            a2: 0.0,
            b0: 0.0,
            b1: 0.0,
            b2: 0.0,
            r_up0: 0.0,
            r_up1: 0.0,
            r_up2: 0.0,
            r_dw0: 0.0,
            r_dw1: 0.0,
            r_dw2: 0.0,
        };
        biquad.compute_coeffs();
        biquad
    }

    fn compute_coeffs(&mut self) {
        let a = 10.0_f64.powf(self.db_gain / 40.0);
        let omega = 2.0 * PI * self.freq / self.srate;
        let sn = omega.sin();
        let cs = omega.cos();
        let alpha = sn / (2.0 * self.q);

        let b0 = 1.0 + (alpha * a);
        let b1 = -2.0 * cs;
        let b2 = 1.0 - (alpha * a);
        let a0 = 1.0 + (alpha / a);
        let a1 = -2.0 * cs;
        let a2 = 1.0 - (alpha / a);

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;

        self.r_up0 = (self.b0 + self.b1 + self.b2).powi(2);
        self.r_up1 = -4.0 * (self.b0 * self.b1 + 4.0 * self.b0 * self.b2 + self.b1 * self.b2);
        self.r_up2 = 16.0 * self.b0 * self.b2;
        self.r_dw0 = (1.0 + self.a1 + self.a2).powi(2);
        self.r_dw1 = -4.0 * (self.a1 + 4.0 * self.a2 + self.a1 * self.a2);
        self.r_dw2 = 16.0 * self.a2;
    }

    /// Evaluates the transfer function H(z) on the unit circle at `f` Hz.
    pub fn response(&self, f: f64) -> Complex64 {
        let w = 2.0 * PI * f / self.srate;
        let z1 = Complex64::from_polar(1.0, -w);
        let z2 = z1 * z1;
        let num = self.b0 + z1 * self.b1 + z2 * self.b2;
        let den = 1.0 + z1 * self.a1 + z2 * self.a2;
        num / den
    }

    /// Magnitude response at a single frequency `f`.
    pub fn result(&self, f: f64) -> f64 {
        let phi = (PI * f / self.srate).sin().powi(2);
        let phi2 = phi * phi;

        let numerator = self.r_up0 + self.r_up1 * phi + self.r_up2 * phi2;
        let denominator = self.r_dw0 + self.r_dw1 * phi + self.r_dw2 * phi2;

        (numerator / denominator).max(0.0).sqrt()
    }

    /// Response in dB at a single frequency `f`, floored at `MIN_MAGNITUDE`.
    pub fn log_result(&self, f: f64) -> f64 {
        20.0 * self.result(f).max(MIN_MAGNITUDE).log10()
    }

    /// Vectorized dB response over `freq`.
    pub fn np_log_result(&self, freq: &Array1<f64>) -> Array1<f64> {
        let coeff = PI / self.srate;
        let phi = freq.mapv(|f| (f * coeff).sin().powi(2));
        let phi2 = &phi * &phi;

        let r_up = self.r_up0 + self.r_up1 * &phi + self.r_up2 * &phi2;
        let r_dw = self.r_dw0 + self.r_dw1 * &phi + self.r_dw2 * &phi2;
        let r = r_up / r_dw;

        let min_val = MIN_MAGNITUDE * MIN_MAGNITUDE;
        r.mapv(|val| 10.0 * val.max(min_val).log10())
    }

    /// Phase response in degrees at `f`.
    pub fn phase_deg(&self, f: f64) -> f64 {
        self.response(f).arg().to_degrees()
    }

    /// Vectorized phase response in degrees over `freq`.
    pub fn np_phase_result(&self, freq: &Array1<f64>) -> Array1<f64> {
        freq.mapv(|f| self.phase_deg(f))
    }

    /// Returns the normalized coefficients as `(a1, a2, b0, b1, b2)`.
    pub fn constants(&self) -> (f64, f64, f64, f64, f64) {
        (self.a1, self.a2, self.b0, self.b1, self.b2)
    }
}

impl fmt::Display for Biquad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type:PK,Freq:{:.1},Rate:{:.1},Q:{:.2},Gain:{:.2}",
            self.freq, self.srate, self.q, self.db_gain
        )
    }
}

/// Combined dB response of a PEQ on `freq`.
///
/// # Arguments
/// * `freq` - Frequencies to evaluate (Hz)
/// * `peq` - Peaking filters
///
/// # Returns
/// * Sum over all filters of their individual dB responses
pub fn peq_spl(freq: &Array1<f64>, peq: &[Biquad]) -> Array1<f64> {
    let mut current_filter = Array1::zeros(freq.len());
    for iir in peq {
        current_filter += &iir.np_log_result(freq);
    }
    current_filter
}

/// Combined phase response of a PEQ on `freq`, in degrees.
pub fn peq_phase(freq: &Array1<f64>, peq: &[Biquad]) -> Array1<f64> {
    let mut phase = Array1::zeros(freq.len());
    for iir in peq {
        phase += &iir.np_phase_result(freq);
    }
    phase
}

/// Compute a preamp gain that keeps the PEQ from boosting above 0 dB
///
/// # Returns
/// * Preamp gain in dB (zero or negative)
pub fn peq_preamp_gain(peq: &[Biquad]) -> f64 {
    let freq = Array1::logspace(10.0, 20.0_f64.log10(), 20000.0_f64.log10(), 200);
    let spl = peq_spl(&freq, peq);
    let overall = spl.iter().cloned().fold(0.0f64, |acc, x| acc.max(x));
    -overall
}

/// Format a PEQ as an EqualizerAPO configuration block
///
/// Filters are listed in ascending frequency order.
pub fn peq_format_apo(comment: &str, peq: &[Biquad]) -> String {
    let mut res = Vec::new();
    res.push(comment.to_string());
    res.push(format!("Preamp: {:.1} dB", peq_preamp_gain(peq)));
    res.push(String::new());

    let mut sorted_peq: Vec<&Biquad> = peq.iter().collect();
    sorted_peq.sort_by(|a, b| a.freq.partial_cmp(&b.freq).unwrap_or(std::cmp::Ordering::Equal));

    for (i, iir) in sorted_peq.iter().enumerate() {
        res.push(format!(
            "Filter {:2}: ON PK Fc {:5} Hz Gain {:+0.2} dB Q {:0.2}",
            i + 1,
            iir.freq as i32,
            iir.db_gain,
            iir.q
        ));
    }

    res.push(String::new());
    res.join("\n")
}

/// Format a PEQ as a plain text table sorted by frequency.
pub fn peq_format_table(peq: &[Biquad]) -> String {
    let mut sorted_peq: Vec<&Biquad> = peq.iter().collect();
    sorted_peq.sort_by(|a, b| a.freq.partial_cmp(&b.freq).unwrap_or(std::cmp::Ordering::Equal));

    let mut lines = vec!["+-# -|-Freq (Hz)--|-Q ---------|-Gain (dB)--|-BW (oct)-+".to_string()];
    for (i, r) in sorted_peq.iter().enumerate() {
        lines.push(format!(
            "| {:<2} | {:<10.2} | {:<10.3} | {:<+10.3} | {:<8.3} |",
            i + 1,
            r.freq,
            r.q,
            r.db_gain,
            q2bw(r.q)
        ));
    }
    lines.push("+----|------------|------------|------------|----------+".to_string());
    lines.join("\n")
}
