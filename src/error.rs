//! Error types for the traffic scheduler.

use crate::simulation_engine::vehicles::{Maneuver, VehicleId};
use thiserror::Error;

/// Errors returned by `spawn_vehicle`. All of them leave the world untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpawnError {
    /// No intersection approach with this name exists.
    #[error("unknown lane: {0}")]
    UnknownLane(String),

    /// The maneuver cannot be performed from this approach.
    #[error("maneuver {maneuver} is not possible from lane {lane}")]
    InvalidManeuver {
        /// Requested approach.
        lane: String,
        /// Requested maneuver.
        maneuver: Maneuver,
    },

    /// The spawn slot is too close to a vehicle already on the road.
    #[error("spawn at ({x:.1}, {y:.1}) on lane {lane} collides with vehicle {blocking}")]
    SpawnCollision {
        /// Requested approach.
        lane: String,
        /// Vehicle occupying the slot.
        blocking: VehicleId,
        /// Spawn x coordinate.
        x: f64,
        /// Spawn y coordinate.
        y: f64,
    },
}

/// Errors parsing vehicle classes, maneuvers and spawn requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown maneuver: {0}")]
    UnknownManeuver(String),

    #[error("unknown vehicle class: {0}")]
    UnknownVehicleClass(String),

    /// A spawn request is not of the form `lane:maneuver[:class]`.
    #[error("malformed spawn request: {0}")]
    MalformedSpawn(String),
}

/// Errors loading or validating a scheduler configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading a config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid JSON for a configuration.
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The values are inconsistent with each other.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A broken world invariant. Fatal in debug builds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// A vehicle is listed in more than one lane queue.
    #[error("vehicle {0} is queued in more than one lane")]
    DuplicateVehicle(VehicleId),

    /// The spawn/removal counters disagree with the queued population.
    #[error("spawned {spawned} - removed {removed} != queued {queued}")]
    CountMismatch {
        spawned: usize,
        removed: usize,
        queued: usize,
    },

    /// Two neighbouring queue entries are not in strict priority order.
    #[error("lane {lane} is out of order at vehicle {vehicle}")]
    OrderViolation {
        /// Offending lane, as `intersection/kind`.
        lane: String,
        vehicle: VehicleId,
    },
}

/// Errors from the scheduler facade and its periodic tasks.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `start` was called outside a tokio runtime.
    #[error("no tokio runtime available to run the scheduler tasks")]
    NoRuntime,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}
