use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::Array1;

use crate::error::Result;

/// Write samples as raw little endian f32 PCM (the format convolvers load).
pub fn write_pcm_f32(path: &Path, samples: &Array1<f64>) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for &s in samples {
        out.write_f32::<LittleEndian>(s as f32)?;
    }
    out.flush()?;
    Ok(())
}

/// Read a raw little endian f32 PCM file.
pub fn read_pcm_f32(path: &Path) -> Result<Array1<f64>> {
    let mut input = BufReader::new(File::open(path)?);
    let mut samples = Vec::new();
    loop {
        match input.read_f32::<LittleEndian>() {
            Ok(v) => samples.push(f64::from(v)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Array1::from_vec(samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_pcm_layout_is_little_endian_f32() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drc.L.pcm");
        write_pcm_f32(&path, &array![1.0, -0.5]).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(read_pcm_f32(&path).unwrap(), array![1.0, -0.5]);
    }
}
