//! Error Types for the Recovery Pipeline
//!
//! ## Design Philosophy
//!
//! Errors in the flight path follow three rules:
//!
//! 1. **Small and Copy**: Every variant is inline data only (`&'static str`,
//!    scalars). Errors cross task queues and must never allocate.
//!
//! 2. **Taxonomy first**: Each error maps to exactly one handling strategy
//!    from the recovery design:
//!    - *Transient-recoverable*: triggers supervisor retry/backoff
//!    - *Degenerate-input*: the sample is discarded, the stream continues
//!    - Fatal actuation failures live in the runtime crate, not here
//!
//! 3. **Isolation**: A sensor error is scoped to that sensor. Nothing in
//!    this enum can justify halting the control loop.

use thiserror_no_std::Error;

/// Result type for sensor operations
pub type SensorResult<T> = Result<T, SensorError>;

/// Errors produced by sensor sources and reading construction
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Hardware initialization failed (transient-recoverable)
    #[error("Sensor initialization failed: {reason}")]
    InitFailed {
        /// Driver-provided failure description
        reason: &'static str,
    },

    /// A read from an initialized sensor failed (transient-recoverable)
    ///
    /// Forces re-initialization: a sensor that failed mid-stream is not
    /// trusted again until it passes initialization and calibration.
    #[error("Sensor read failed: {reason}")]
    ReadFailed {
        /// Driver-provided failure description
        reason: &'static str,
    },

    /// A frame arrived but could not be parsed (degenerate-input)
    #[error("Malformed sensor frame")]
    MalformedFrame,

    /// A value is not a usable number (NaN, infinity) (degenerate-input)
    #[error("Invalid value: not a valid number")]
    InvalidValue,

    /// Read attempted before initialization completed
    #[error("Sensor not initialized")]
    NotInitialized,
}

impl SensorError {
    /// Whether the supervisor should re-initialize and keep going.
    ///
    /// Degenerate-input errors only discard the offending sample; they do
    /// not indicate the sensor itself is unhealthy.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SensorError::InitFailed { .. }
                | SensorError::ReadFailed { .. }
                | SensorError::NotInitialized
        )
    }
}

/// Errors from invalid configuration values
///
/// Configuration is validated once at construction; components never
/// re-check at evaluation time.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    /// Decision window size outside the supported range
    #[error("Window size {got} outside [{min}, {max}]")]
    WindowSize {
        /// Requested window size
        got: usize,
        /// Minimum supported size
        min: usize,
        /// Maximum supported size
        max: usize,
    },

    /// Altitude band is empty or inverted
    #[error("Invalid altitude range: min {min} >= max {max}")]
    AltitudeRange {
        /// Configured minimum altitude
        min: f64,
        /// Configured maximum altitude
        max: f64,
    },

    /// Filter weight outside [0, 1]
    #[error("Filter weight {value} outside [0, 1]")]
    FilterWeight {
        /// Offending weight value
        value: f64,
    },
}

#[cfg(feature = "defmt")]
impl defmt::Format for SensorError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::InitFailed { reason } => defmt::write!(fmt, "Init failed: {}", reason),
            Self::ReadFailed { reason } => defmt::write!(fmt, "Read failed: {}", reason),
            Self::MalformedFrame => defmt::write!(fmt, "Malformed frame"),
            Self::InvalidValue => defmt::write!(fmt, "Invalid value"),
            Self::NotInitialized => defmt::write!(fmt, "Not initialized"),
        }
    }
}
