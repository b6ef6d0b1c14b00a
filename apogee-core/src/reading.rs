//! Sensor Reading Model
//!
//! ## Overview
//!
//! Defines the tagged union carried from the ingestion supervisors through
//! the per-sensor queues into the orchestrator. One reading is produced by
//! exactly one sensor source and is immutable once emitted; the
//! orchestrator folds it into the current snapshot and drops it.
//!
//! ## Why a Closed Set of Variants?
//!
//! The sensor space is a closed set: altitude (barometer), orientation
//! (IMU), position (GPS). A tagged union gives exhaustive matching in
//! the orchestrator and keeps readings `Copy`, so they cross channel
//! boundaries without allocation.
//!
//! ## Validity
//!
//! Constructors reject NaN and infinity at the source, so downstream code
//! never has to re-check. A malformed frame is a degenerate input: the
//! sample is discarded, not propagated.

use crate::errors::{SensorError, SensorResult};

/// The three sensor channels the orchestrator aggregates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SensorKind {
    /// Barometric altitude, meters relative to calibration baseline
    Altitude = 0,
    /// Inertial orientation plus raw acceleration
    Orientation = 1,
    /// GPS position fix
    Position = 2,
}

impl SensorKind {
    /// Human-readable channel name
    pub const fn name(&self) -> &'static str {
        match self {
            SensorKind::Altitude => "altitude",
            SensorKind::Orientation => "orientation",
            SensorKind::Position => "position",
        }
    }

    /// Persistence record tag for this channel
    ///
    /// Tags are the sensor part names used by the ground-station schema.
    pub const fn tag(&self) -> &'static str {
        match self {
            SensorKind::Altitude => "BMP",
            SensorKind::Orientation => "IMU",
            SensorKind::Position => "GPS",
        }
    }

    /// All channels the orchestrator requires before deciding
    pub const ALL: [SensorKind; 3] = [
        SensorKind::Altitude,
        SensorKind::Orientation,
        SensorKind::Position,
    ];
}

/// A single immutable sample from one sensor source
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorReading {
    /// Relative barometric altitude
    Altitude {
        /// Meters above the calibration baseline
        meters: f64,
    },
    /// De-biased attitude plus the raw acceleration vector
    Orientation {
        /// Roll in degrees
        roll: f64,
        /// Pitch in degrees
        pitch: f64,
        /// Yaw in degrees
        yaw: f64,
        /// Raw acceleration, m/s², body frame
        accel: [f64; 3],
    },
    /// GPS fix in decimal degrees
    Position {
        /// Latitude
        latitude: f64,
        /// Longitude
        longitude: f64,
    },
}

impl SensorReading {
    /// Construct an altitude reading, rejecting non-finite values
    pub fn altitude(meters: f64) -> SensorResult<Self> {
        if !meters.is_finite() {
            return Err(SensorError::InvalidValue);
        }
        Ok(SensorReading::Altitude { meters })
    }

    /// Construct an orientation reading, rejecting non-finite values
    pub fn orientation(roll: f64, pitch: f64, yaw: f64, accel: [f64; 3]) -> SensorResult<Self> {
        let finite = roll.is_finite()
            && pitch.is_finite()
            && yaw.is_finite()
            && accel.iter().all(|a| a.is_finite());
        if !finite {
            return Err(SensorError::InvalidValue);
        }
        Ok(SensorReading::Orientation {
            roll,
            pitch,
            yaw,
            accel,
        })
    }

    /// Construct a position reading, rejecting non-finite values
    pub fn position(latitude: f64, longitude: f64) -> SensorResult<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(SensorError::InvalidValue);
        }
        Ok(SensorReading::Position {
            latitude,
            longitude,
        })
    }

    /// Which channel this reading belongs to
    pub const fn kind(&self) -> SensorKind {
        match self {
            SensorReading::Altitude { .. } => SensorKind::Altitude,
            SensorReading::Orientation { .. } => SensorKind::Orientation,
            SensorReading::Position { .. } => SensorKind::Position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_reject_non_finite() {
        assert_eq!(
            SensorReading::altitude(f64::NAN),
            Err(SensorError::InvalidValue)
        );
        assert_eq!(
            SensorReading::position(f64::INFINITY, 0.0),
            Err(SensorError::InvalidValue)
        );
        assert_eq!(
            SensorReading::orientation(0.0, 0.0, 0.0, [0.0, f64::NAN, 9.8]),
            Err(SensorError::InvalidValue)
        );
    }

    #[test]
    fn kind_matches_variant() {
        let r = SensorReading::altitude(120.0).unwrap();
        assert_eq!(r.kind(), SensorKind::Altitude);
        assert_eq!(r.kind().tag(), "BMP");
    }
}
