use crate::config::SchedulerConfig;
use crate::simulation_engine::grid::{Frame, Heading, Point};
use crate::simulation_engine::lanes::LaneKind;
use crate::simulation_engine::vehicles::{Maneuver, ManeuverPhase, Vehicle};

const EPS: f64 = 1e-9;

/// Geometry the phase machine needs, derived from the configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionParams {
    pub speed: f64,
    pub turn_speed: f64,
    pub lane_width: f64,
    pub road_half_width: f64,
    pub exit_distance: f64,
    pub stop_line: f64,
    pub min_safe_distance: f64,
    pub follow_distance: f64,
}

impl From<&SchedulerConfig> for MotionParams {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            speed: config.speed,
            turn_speed: config.turn_speed,
            lane_width: config.lane_width,
            road_half_width: config.road_half_width,
            exit_distance: config.exit_distance,
            stop_line: config.stop_line_distance(),
            min_safe_distance: config.min_safe_distance,
            follow_distance: config.vehicle_length + config.safe_gap,
        }
    }
}

/// Outcome of one tick of motion for one vehicle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub position: Point,
    pub heading: Heading,
    pub phase: ManeuverPhase,
    /// The vehicle passed the exit threshold of its current phase and must be
    /// handed off or removed.
    pub completed: bool,
}

/// Moves `step` along `dir`, or exactly `remaining` if that is closer.
/// Returns the new point and whether the target was reached.
pub fn step_toward(p: Point, dir: Heading, remaining: f64, step: f64) -> (Point, bool) {
    if remaining <= step {
        (p + dir.unit() * remaining.max(0.0), true)
    } else {
        (p + dir.unit() * step, false)
    }
}

// Distance along the approach at which a maneuver leaves its lane. Turning
// vehicles stop level with the lane they land in on the crossing road.
fn turn_point(maneuver: Maneuver, lane_width: f64) -> f64 {
    match maneuver.base() {
        Maneuver::Left => LaneKind::Left.offset(lane_width),
        Maneuver::Right => -LaneKind::Right.offset(lane_width),
        _ => 0.0,
    }
}

/// Whether a vehicle is past its stop line and has to clear the junction.
pub fn is_committed(vehicle: &Vehicle, frame: &Frame, params: &MotionParams) -> bool {
    match vehicle.phase {
        ManeuverPhase::Turn | ManeuverPhase::Exit => true,
        ManeuverPhase::Approach | ManeuverPhase::Advance => {
            frame.along(vehicle.position) > -params.stop_line + EPS
        }
    }
}

/// Next position of a vehicle under the phase machine, ignoring other traffic.
pub fn plan_move(vehicle: &Vehicle, frame: &Frame, params: &MotionParams) -> Motion {
    let p = vehicle.position;
    let h = frame.heading;
    let maneuver = vehicle.maneuver.base();
    let progress = |dir: Heading| (p - frame.center).dot(dir.unit());

    let motion = |position, heading, phase, completed| Motion { position, heading, phase, completed };

    match vehicle.phase {
        ManeuverPhase::Advance => {
            let (position, arrived) =
                step_toward(p, h, params.exit_distance - progress(h), params.speed);
            motion(position, h, ManeuverPhase::Advance, arrived)
        }
        ManeuverPhase::Approach => {
            let target = turn_point(maneuver, params.lane_width);
            let (position, arrived) = step_toward(p, h, target - progress(h), params.speed);
            if !arrived {
                return motion(position, h, ManeuverPhase::Approach, false);
            }
            match maneuver {
                Maneuver::Left | Maneuver::UTurn => motion(position, h.left(), ManeuverPhase::Turn, false),
                Maneuver::Right => motion(position, h.right(), ManeuverPhase::Turn, false),
                _ => motion(position, h, ManeuverPhase::Exit, false),
            }
        }
        ManeuverPhase::Turn => {
            let dir = vehicle.heading;
            let target = match maneuver {
                Maneuver::UTurn => LaneKind::Left.offset(params.lane_width),
                _ => params.road_half_width,
            };
            let (position, arrived) = step_toward(p, dir, target - progress(dir), params.turn_speed);
            if !arrived {
                return motion(position, dir, ManeuverPhase::Turn, false);
            }
            let exit_heading = if maneuver == Maneuver::UTurn { h.reverse() } else { dir };
            motion(position, exit_heading, ManeuverPhase::Exit, false)
        }
        ManeuverPhase::Exit => {
            let dir = vehicle.heading;
            let (position, arrived) =
                step_toward(p, dir, params.exit_distance - progress(dir), params.speed);
            motion(position, dir, ManeuverPhase::Exit, arrived)
        }
    }
}

/// Keeps an uncommitted vehicle from passing the stop line of a red approach.
pub fn hold_at_stop_line(motion: Motion, frame: &Frame, params: &MotionParams) -> Motion {
    if frame.along(motion.position) <= -params.stop_line {
        return motion;
    }
    Motion {
        position: frame.to_scene(-params.stop_line, frame.lateral(motion.position)),
        completed: false,
        ..motion
    }
}

/// Whether moving to `planned` brings a vehicle travelling `heading` from
/// `current` too close to `other`, which sits ahead in the same lane line.
pub fn blocks_move(
    current: Point,
    planned: Point,
    heading: Heading,
    other: Point,
    other_heading: Heading,
    params: &MotionParams,
) -> bool {
    if other_heading != heading {
        return false;
    }
    let dir = heading.unit();
    let ahead = (other - current).dot(dir) > EPS;
    let lateral = (other - planned).dot(heading.right().unit()).abs();
    let gap = (other - planned).dot(dir);
    ahead && lateral < params.lane_width / 2.0 && gap < params.min_safe_distance
}

/// Whether a vehicle spawned at `slot`, facing `heading`, would sit too close
/// to `other`. The other vehicle's own heading does not matter.
pub fn blocks_spawn(slot: Point, heading: Heading, other: Point, params: &MotionParams) -> bool {
    let rel = other - slot;
    rel.dot(heading.right().unit()).abs() < params.lane_width / 2.0
        && rel.dot(heading.unit()).abs() < params.min_safe_distance
}
