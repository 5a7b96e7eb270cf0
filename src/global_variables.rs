// Scene geometry
pub const SCENE_WIDTH: f64 = 1200.0;
pub const SCENE_HEIGHT: f64 = 900.0;
pub const ROAD_WIDTH: f64 = 160.0;
pub const LANES_PER_DIRECTION: usize = 4;

// Vehicle dimensions
pub const VEHICLE_LENGTH: f64 = 40.0;
pub const VEHICLE_WIDTH: f64 = 20.0;
pub const SAFE_GAP: f64 = 10.0;
pub const MIN_SAFE_DISTANCE: f64 = VEHICLE_LENGTH + SAFE_GAP;
pub const SPAWN_SPACING: f64 = VEHICLE_LENGTH + 20.0;

// Motion, in scene units per stepper tick
pub const VEHICLE_SPEED: f64 = 5.0;
pub const TURN_SPEED: f64 = 3.0;

// Distance past the centre at which a vehicle has left an intersection
pub const EXIT_DISTANCE: f64 = 140.0;

// Task periods
pub const CONTROL_PERIOD_MS: u64 = 2000;
pub const STEP_PERIOD_MS: u64 = 50;
pub const STOP_GRACE_MS: u64 = 2000;

pub const JOURNAL_CAPACITY: usize = 4096;
pub const EMERGENCY_PROBABILITY: f64 = 0.1;

pub const EVENTS_CSV: &str = "scheduler_events.csv";
