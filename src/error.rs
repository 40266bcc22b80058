//! Error module for the LIF SNN library.
use std::error::Error;
use std::fmt;

/// Error types for the library.
///
/// Every error is fatal: the simulation is deterministic and synchronous,
/// so a detected error aborts the run immediately and nothing is retried.
#[derive(Debug, PartialEq)]
pub enum SimError {
    /// Error for invalid parameters, e.g., an empty weight range or a bad winner count.
    InvalidParameter(String),
    /// Error for mismatched dimensions, e.g., a weight matrix disagreeing with the
    /// sizes of the populations it connects.
    ShapeMismatch(String),
    /// Error for a run outlasting the external input waveform.
    WaveformExhausted { iteration: usize, duration: usize },
    /// Error for out of bounds access, e.g., population not found.
    OutOfBounds(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SimError::InvalidParameter(e) => write!(f, "Invalid parameter: {}", e),
            SimError::ShapeMismatch(e) => write!(f, "Shape mismatch: {}", e),
            SimError::WaveformExhausted { iteration, duration } => write!(
                f,
                "Waveform exhausted: iteration {} exceeds the waveform duration of {}",
                iteration, duration
            ),
            SimError::OutOfBounds(e) => write!(f, "Index out of bounds: {}", e),
        }
    }
}

impl Error for SimError {}
