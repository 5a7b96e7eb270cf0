pub mod config;
pub mod control_system;
pub mod error;
pub mod global_variables;
pub mod monitoring;
pub mod scheduler;
pub mod simulation_engine;

pub use config::{CorridorLayout, SchedulerConfig};
pub use error::{ConfigError, InvariantViolation, ParseError, SchedulerError, SpawnError};
pub use scheduler::TrafficScheduler;
pub use simulation_engine::intersections::LightState;
pub use simulation_engine::vehicles::{Maneuver, VehicleClass, VehicleId};
