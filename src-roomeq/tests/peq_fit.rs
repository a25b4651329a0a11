mod common;

use common::log_curve;
use roomeq::config::PeqConfig;
use roomeq::optim::{self, FitStrategy};
use roomeq::read::create_log_frequency_grid;
use roomeq::x2peq::{params2x, x2spl};
use roomeq::{PeqFilterSet, iir};

#[test]
fn test_aggregate_is_the_db_sum() {
    let freq = create_log_frequency_grid(500, 20.0, 20000.0);
    let a = (45.0, 8.0, -7.0);
    let b = (9000.0, 6.0, 2.5);
    let x = params2x(&[a, b]);
    let both = x2spl(&freq, x.as_slice().unwrap(), 48000.0);
    let sa = iir::Biquad::peak(a.0, 48000.0, a.1, a.2).np_log_result(&freq);
    let sb = iir::Biquad::peak(b.0, 48000.0, b.1, b.2).np_log_result(&freq);
    for i in 0..freq.len() {
        assert!((both[i] - sa[i] - sb[i]).abs() < 1e-9);
    }
}

#[test]
fn test_fitted_sets_are_sorted_and_above_min_gain() {
    let c = log_curve(800, |f| -6.0 * (-(f / 120.0).log2().powi(2) * 3.0).exp() - 3.0 * (-(f / 45.0).log2().powi(2) * 8.0).exp());
    let cfg = PeqConfig { min_gain: 1.0, ..Default::default() };
    let fit = optim::fit(&c, &cfg, "sub_L").unwrap();
    let set: &PeqFilterSet = &fit.record.filters;
    assert!(set.len() <= cfg.num_filters);
    for (i, f) in set.filters.iter().enumerate() {
        assert_eq!(f.id, i);
        assert!(f.gain.abs() > 1.0);
        assert_eq!(f.filter_type, "peaking");
    }
    assert!(set.filters.windows(2).all(|w| w[0].fc <= w[1].fc));
    assert_eq!(fit.record.channel, "L");
}

fn log_sine() -> roomeq::Curve {
    // 10 dB sine over log10(f): 7 lobes between 20 Hz and 20 kHz
    log_curve(2000, |f| 10.0 * (2.0 * std::f64::consts::PI * f.log10()).sin())
}

#[test]
fn test_log_sine_target_end_to_end() {
    let cfg = PeqConfig {
        num_filters: 6,
        min_gain: 0.5,
        strategy: FitStrategy::Minimize.name().to_string(),
        ..Default::default()
    };
    let fit = optim::fit(&log_sine(), &cfg, "log_sine").unwrap();
    let info = fit.record.optimizer.as_ref().unwrap();
    assert!(info.converged, "{}", info.message);
    let metrics = fit.record.analysis.as_ref().unwrap().residual_error;
    assert!(fit.record.filters.len() <= 6);
    assert!(metrics.rmse_bass_db < 4.5, "{:?}", metrics);
    assert!(metrics.rmse_treble_db < 4.5, "{:?}", metrics);
    assert!(metrics.rmse_total_db < 4.5, "{:?}", metrics);
}

#[test]
fn test_log_sine_least_squares_converges() {
    for strategy in [FitStrategy::LeastSquares, FitStrategy::LeastSquaresBass] {
        let cfg = PeqConfig { strategy: strategy.name().to_string(), ..Default::default() };
        let fit = optim::fit(&log_sine(), &cfg, "log_sine").unwrap();
        let info = fit.record.optimizer.as_ref().unwrap();
        assert!(info.converged, "{}: {}", strategy, info.message);
        let metrics = fit.record.analysis.as_ref().unwrap().residual_error;
        // better than leaving the target alone
        assert!(metrics.rmse_total_db < 10.0 / 2f64.sqrt(), "{}: {:?}", strategy, metrics);
    }
}
