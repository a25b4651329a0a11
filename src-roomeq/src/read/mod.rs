//! RoomEQ - measurement, room correction and PEQ fitting
//!
//! Copyright (C) 2025 Pierre Aubert pierre(at)spinorama(dot)org
//!
//! This program is free software: you can redistribute it and/or modify
//! it under the terms of the GNU General Public License as published by
//! the Free Software Foundation, either version 3 of the License, or
//! (at your option) any later version.
//!
//! This program is distributed in the hope that it will be useful,
//! but WITHOUT ANY WARRANTY; without even the implied warranty of
//! MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//! GNU General Public License for more details.
//!
//! You should have received a copy of the GNU General Public License
//! along with this program.  If not, see <https://www.gnu.org/licenses/>.

mod interpolate;
mod read_csv;
mod read_pcm;
mod read_wav;

// Re-export commonly used functions
pub use interpolate::*;
pub use read_csv::{load_frequency_response, read_curve_from_csv, write_curve_to_csv};
pub use read_pcm::{read_pcm_f32, write_pcm_f32};
pub use read_wav::{WavData, read_wav, write_wav};

use ndarray::Array1;

/// Geometric sequence of `n` values from `start` to `stop` (both included).
pub fn geomspace(start: f64, stop: f64, n: usize) -> Array1<f64> {
    create_log_frequency_grid(n, start, stop)
}
