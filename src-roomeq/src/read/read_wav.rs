use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use ndarray::Array1;

use crate::error::{Result, RoomEqError};

/// Multi channel audio read from a WAV file, de-interleaved.
#[derive(Debug, Clone)]
pub struct WavData {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// One buffer per channel, full scale is 1.0
    pub channels: Vec<Array1<f64>>,
}

/// Load a WAV file and split it into per-channel buffers in [-1, 1].
pub fn read_wav(path: &Path) -> Result<WavData> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let n_channels = spec.channels as usize;
    if n_channels == 0 {
        return Err(RoomEqError::EmptyInput { what: format!("{}: no channel", path.display()) });
    }

    let samples: Vec<f64> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = 2f64.powi(spec.bits_per_sample as i32 - 1);
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f64 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let frames = samples.len() / n_channels;
    let channels = (0..n_channels)
        .map(|c| Array1::from_shape_fn(frames, |i| samples[i * n_channels + c]))
        .collect();
    log::debug!(
        "read {} frames x {} channels at {} Hz from {}",
        frames,
        n_channels,
        spec.sample_rate,
        path.display()
    );
    Ok(WavData { sample_rate: spec.sample_rate, channels })
}

/// Write channels of equal length as a 32 bit float WAV file.
pub fn write_wav(path: &Path, sample_rate: u32, channels: &[Array1<f64>]) -> Result<()> {
    let first = channels
        .first()
        .ok_or_else(|| RoomEqError::EmptyInput { what: "no channel to write".into() })?;
    for ch in channels {
        if ch.len() != first.len() {
            return Err(RoomEqError::LengthMismatch {
                what: "wav channel",
                expected: first.len(),
                got: ch.len(),
            });
        }
    }
    let spec = WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for i in 0..first.len() {
        for ch in channels {
            writer.write_sample(ch[i] as f32)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_wav_float_round_trip_keeps_channels_apart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let left = array![0.5, -0.25, 0.0];
        let right = array![-0.5, 0.25, 1.0];
        write_wav(&path, 48000, &[left.clone(), right.clone()]).unwrap();
        let data = read_wav(&path).unwrap();
        assert_eq!(data.sample_rate, 48000);
        assert_eq!(data.channels.len(), 2);
        assert_eq!(data.channels[0], left);
        assert_eq!(data.channels[1], right);
    }

    #[test]
    fn test_int_wav_is_scaled_to_unity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("int.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut w = WavWriter::create(&path, spec).unwrap();
        w.write_sample(16384i16).unwrap();
        w.write_sample(-32768i16).unwrap();
        w.finalize().unwrap();
        let data = read_wav(&path).unwrap();
        assert_eq!(data.channels[0], array![0.5, -1.0]);
    }

    #[test]
    fn test_mismatched_channels_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_wav(&dir.path().join("x.wav"), 48000, &[array![0.0], array![0.0, 0.0]])
            .unwrap_err();
        assert!(err.is_configuration_error());
    }
}
