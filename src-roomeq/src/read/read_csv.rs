use std::path::Path;

use csv::{ReaderBuilder, Trim, WriterBuilder};
use ndarray::Array1;

use crate::Curve;
use crate::error::{Result, RoomEqError};

fn detect_delimiter(text: &str) -> u8 {
    let sample: String = text
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or("")
        .to_string();
    if sample.contains(',') {
        b','
    } else if sample.contains(';') {
        b';'
    } else if sample.contains('\t') {
        b'\t'
    } else {
        b' '
    }
}

/// Load frequency response data from a CSV, FRD or text file
///
/// Expected formats:
/// - 2 columns: frequency, magnitude (dB)
/// - 3 columns: frequency, magnitude (dB), phase (deg)
///
/// Comma, semicolon, tab and space separated files are accepted. Lines that
/// do not start with a number (headers, `#` or `*` comments) are skipped.
pub fn load_frequency_response(path: &Path) -> Result<Curve> {
    let text = std::fs::read_to_string(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .delimiter(detect_delimiter(&text))
        .from_reader(text.as_bytes());

    let mut frequencies = Vec::new();
    let mut spl_values = Vec::new();
    let mut phase_values = Vec::new();
    let mut detected_columns = 0;

    for record in reader.records() {
        let record = record?;
        let parts: Vec<f64> = record
            .iter()
            .filter(|s| !s.is_empty())
            .map_while(|s| s.parse::<f64>().ok())
            .collect();
        if parts.len() < 2 {
            continue;
        }
        if detected_columns == 0 {
            detected_columns = parts.len().min(3);
        }
        frequencies.push(parts[0]);
        spl_values.push(parts[1]);
        if detected_columns == 3 {
            phase_values.push(parts.get(2).copied().unwrap_or(0.0));
        }
    }

    if frequencies.is_empty() {
        return Err(RoomEqError::Parse {
            path: path.display().to_string(),
            message: "no valid frequency response data found in file".into(),
        });
    }

    let freq = Array1::from_vec(frequencies);
    let spl = Array1::from_vec(spl_values);
    let curve = if detected_columns == 3 {
        Curve::with_phase(freq, spl, Array1::from_vec(phase_values))
    } else {
        Curve::new(freq, spl)
    };
    curve.map_err(|e| RoomEqError::Parse { path: path.display().to_string(), message: e.to_string() })
}

/// Read a frequency response curve from a file
///
/// Same as [`load_frequency_response`]; kept as the name used by the workflow.
pub fn read_curve_from_csv(path: &Path) -> Result<Curve> {
    load_frequency_response(path)
}

/// Write a curve as tab separated `frequency magnitude [phase]` rows.
///
/// The first line is a `#` comment so the file reads back with
/// [`load_frequency_response`].
pub fn write_curve_to_csv(path: &Path, curve: &Curve, comment: &str) -> Result<()> {
    curve.validate()?;
    let mut wtr = WriterBuilder::new().delimiter(b'\t').flexible(true).from_path(path)?;
    let mut header = vec![format!("# {}", comment), "freq(Hz)".into(), "mag(dB)".into()];
    if curve.phase.is_some() {
        header.push("phase(deg)".into());
    }
    wtr.write_record(&header)?;
    for i in 0..curve.len() {
        let mut row = vec![format!("{:.6}", curve.freq[i]), format!("{:.6}", curve.spl[i])];
        if let Some(phase) = &curve.phase {
            row.push(format!("{:.4}", phase[i]));
        }
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    log::debug!("wrote {} points to {}", curve.len(), path.display());
    Ok(())
}
