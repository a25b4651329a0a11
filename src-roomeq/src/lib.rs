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

pub use roomeq_de as de;
pub use roomeq_iir as iir;

/// Command line definitions of the `roomeq` binary
pub mod cli;
/// Immutable configuration values threaded through the pipeline
pub mod config;
/// Frequency response curve
pub mod curve;
/// Equalization curve derived from a measurement
pub mod eqcurve;
/// Error types
pub mod error;
/// Minimum and linear phase FIR synthesis
pub mod fir;
/// PEQ fitting strategies
pub mod optim;
/// PEQ filter sets and their on-disk record
pub mod peq;
/// Capture level and time clearance checks
pub mod quality;
/// Data reading and writing
pub mod read;
/// Fractional octave smoothing
pub mod smooth;
/// Curves to fit: frequency responses or FIRs
pub mod source;
/// Logarithmic sweep generation
pub mod sweep;
/// Transfer function estimation from a captured sweep
pub mod transfer;
/// Shared workflow steps used by the binary
pub mod workflow;
/// Optimiser vector to PEQ conversion
pub mod x2peq;

// Re-export commonly used items
pub use config::{EqConfig, MeasurementConfig, PeqConfig, SmoothingProfile, SystemType, TransitionSpeed};
pub use curve::Curve;
pub use eqcurve::EqualizationCurve;
pub use error::{Result, RoomEqError};
pub use fir::{ImpulseResponse, PhaseType};
pub use optim::{FitStrategy, PeqFit};
pub use peq::{PeqFilter, PeqFilterSet, PeqRecord, ResidualMetrics};
pub use quality::MeasurementWarning;
pub use source::CurveSource;
pub use sweep::Sweep;
pub use transfer::{CapturedPair, Measurement, TransferFunction};
