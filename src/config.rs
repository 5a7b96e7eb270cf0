use crate::error::ConfigError;
use crate::global_variables::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Where the intersections sit on the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CorridorLayout {
    /// A single crossing of two roads. Approaches are named after the side
    /// traffic arrives from: North, South, East, West.
    Crossroads { center_x: f64, center_y: f64 },
    /// A horizontal road crossed by vertical roads at `crossings` (x values,
    /// ascending). Eastbound approaches are West1..WestN, westbound ones are
    /// East1..EastN, both numbered in travel order.
    Corridor { road_y: f64, crossings: Vec<f64> },
}

impl Default for CorridorLayout {
    fn default() -> Self {
        CorridorLayout::Crossroads {
            center_x: SCENE_WIDTH / 2.0,
            center_y: SCENE_HEIGHT / 2.0,
        }
    }
}

impl CorridorLayout {
    /// Two crossings splitting the scene into thirds.
    pub fn two_crossings() -> Self {
        CorridorLayout::Corridor {
            road_y: SCENE_HEIGHT / 2.0,
            crossings: vec![SCENE_WIDTH / 3.0, 2.0 * SCENE_WIDTH / 3.0],
        }
    }
}

/// Tunables of the scheduler. Every field has a default, so a JSON file only
/// needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub control_period_ms: u64,
    pub step_period_ms: u64,
    /// How long `stop` waits for the tasks before aborting them.
    pub stop_grace_ms: u64,
    /// Distance travelled per stepper tick.
    pub speed: f64,
    /// Lateral distance per tick while turning.
    pub turn_speed: f64,
    pub vehicle_length: f64,
    /// Extra gap a follower keeps to the vehicle in front.
    pub safe_gap: f64,
    pub min_safe_distance: f64,
    /// Distance between consecutive spawn slots of one lane.
    pub spawn_spacing: f64,
    pub lane_width: f64,
    pub road_half_width: f64,
    /// Distance from the centre where a vehicle leaves an intersection.
    pub exit_distance: f64,
    pub journal_capacity: usize,
    pub layout: CorridorLayout,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            control_period_ms: CONTROL_PERIOD_MS,
            step_period_ms: STEP_PERIOD_MS,
            stop_grace_ms: STOP_GRACE_MS,
            speed: VEHICLE_SPEED,
            turn_speed: TURN_SPEED,
            vehicle_length: VEHICLE_LENGTH,
            safe_gap: SAFE_GAP,
            min_safe_distance: MIN_SAFE_DISTANCE,
            spawn_spacing: SPAWN_SPACING,
            lane_width: ROAD_WIDTH / 2.0 / LANES_PER_DIRECTION as f64,
            road_half_width: ROAD_WIDTH / 2.0,
            exit_distance: EXIT_DISTANCE,
            journal_capacity: JOURNAL_CAPACITY,
            layout: CorridorLayout::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SchedulerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Distance from the centre to the stop line of an approach.
    pub fn stop_line_distance(&self) -> f64 {
        self.road_half_width + self.vehicle_length / 2.0
    }

    pub fn control_period(&self) -> Duration {
        Duration::from_millis(self.control_period_ms)
    }

    pub fn step_period(&self) -> Duration {
        Duration::from_millis(self.step_period_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Rejects values the motion model cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.speed <= 0.0 || self.turn_speed <= 0.0 {
            return invalid(format!(
                "speeds must be positive (speed {}, turn_speed {})",
                self.speed, self.turn_speed
            ));
        }
        if self.step_period_ms == 0 || self.step_period_ms >= self.control_period_ms {
            return invalid(format!(
                "step period {}ms must be non-zero and shorter than control period {}ms",
                self.step_period_ms, self.control_period_ms
            ));
        }
        if self.lane_width <= 0.0
            || self.lane_width * LANES_PER_DIRECTION as f64 > self.road_half_width + f64::EPSILON
        {
            return invalid(format!(
                "{} lanes of width {} do not fit in half road width {}",
                LANES_PER_DIRECTION, self.lane_width, self.road_half_width
            ));
        }
        if self.min_safe_distance < self.vehicle_length {
            return invalid(format!(
                "min_safe_distance {} is shorter than a vehicle ({})",
                self.min_safe_distance, self.vehicle_length
            ));
        }
        if self.spawn_spacing < self.min_safe_distance {
            return invalid(format!(
                "spawn_spacing {} is below min_safe_distance {}",
                self.spawn_spacing, self.min_safe_distance
            ));
        }
        if self.exit_distance <= self.road_half_width {
            return invalid(format!(
                "exit_distance {} must be beyond the road edge {}",
                self.exit_distance, self.road_half_width
            ));
        }
        if self.journal_capacity == 0 {
            return invalid("journal_capacity must be at least 1".to_string());
        }
        if let CorridorLayout::Corridor { crossings, .. } = &self.layout {
            if crossings.is_empty() {
                return invalid("corridor needs at least one crossing".to_string());
            }
            // A handed-off vehicle must land before the next stop line.
            let min_spacing = self.exit_distance + self.stop_line_distance();
            for pair in crossings.windows(2) {
                if pair[1] - pair[0] <= min_spacing {
                    return invalid(format!(
                        "crossings {} and {} are closer than {}",
                        pair[0], pair[1], min_spacing
                    ));
                }
            }
        }
        Ok(())
    }
}
