use crate::error::InvariantViolation;
use crate::simulation_engine::grid::{Heading, Point};
use crate::simulation_engine::lanes::LaneKind;
use crate::simulation_engine::movement::{self, Motion};
use crate::simulation_engine::vehicles::{vehicle_order, LaneRef, Maneuver, ManeuverPhase, Vehicle, VehicleId};
use crate::simulation_engine::world::World;
use log::{debug, error};
use std::cmp::Ordering;
use std::collections::HashMap;

/// What one stepper tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub moved: usize,
    /// Authorized vehicles that held back because of a vehicle ahead.
    pub blocked: usize,
    pub handed_off: usize,
    /// Vehicles waiting at the end of a crossing because younger traffic is
    /// still ahead in the lane they are about to join.
    pub waiting: usize,
    /// Vehicles that left the corridor, with their final position.
    pub removed: Vec<Vehicle>,
}

/// Advances every authorized vehicle by one tick, then verifies the world
/// invariants. A violation panics in debug builds.
pub fn step(world: &World) -> Result<StepReport, InvariantViolation> {
    let report = {
        let _spawns = world.spawn_lock();
        advance(world)
    };
    debug!(
        "Step: moved {}, blocked {}, handed off {}, waiting {}, removed {}",
        report.moved,
        report.blocked,
        report.handed_off,
        report.waiting,
        report.removed.len()
    );

    if let Err(violation) = world.check_invariants() {
        error!("World invariant broken: {}", violation);
        if cfg!(debug_assertions) {
            std::panic::panic_any(violation);
        }
        return Err(violation);
    }
    Ok(report)
}

// Caller holds the spawn lock, so the lane copies stay complete for the tick.
fn advance(world: &World) -> StepReport {
    let grants = world.lights().read();
    let lanes = world.lane_snapshots();
    let params = *world.params();
    let emergency_present = lanes.iter().any(|(_, vehicles)| vehicles.iter().any(Vehicle::is_emergency));

    let mut occupancy: HashMap<VehicleId, (Point, Heading)> = lanes
        .iter()
        .flat_map(|(_, vehicles)| vehicles.iter().map(|v| (v.id, (v.position, v.heading))))
        .collect();

    let mut movers: Vec<(Vehicle, Motion)> = Vec::new();
    for (lane, vehicles) in &lanes {
        let frame = world.node(lane.node).frame;
        let grant = grants.lane(*lane);
        for (i, vehicle) in vehicles.iter().enumerate() {
            let committed = movement::is_committed(vehicle, &frame, &params);
            let released = grant.is_some_and(|g| g.admits(vehicle.crossing_maneuver()));
            let mut motion = movement::plan_move(vehicle, &frame, &params);
            if !committed && !released {
                motion = movement::hold_at_stop_line(motion, &frame, &params);
            }
            if i > 0 && motion.position.distance(vehicles[i - 1].position) < params.follow_distance {
                continue;
            }
            if motion.position == vehicle.position && motion.phase == vehicle.phase && !motion.completed {
                continue;
            }
            movers.push((vehicle.clone(), motion));
        }
    }
    movers.sort_by(|a, b| vehicle_order(&a.0, &b.0));

    let mut report = StepReport::default();
    for (vehicle, motion) in movers {
        let blocked = occupancy.iter().any(|(id, &(other, other_heading))| {
            *id != vehicle.id
                && movement::blocks_move(vehicle.position, motion.position, motion.heading, other, other_heading, &params)
        });
        if blocked {
            report.blocked += 1;
            continue;
        }
        occupancy.insert(vehicle.id, (motion.position, motion.heading));
        report.moved += 1;
        if motion.completed {
            finish(world, vehicle, motion, emergency_present, &mut report);
        } else {
            world.apply_motion(&vehicle, &motion);
        }
    }
    report
}

// Hand-off target of a vehicle whose phase just completed, or None when it
// leaves the corridor.
fn hand_off_target(world: &World, vehicle: &Vehicle, motion: &Motion) -> Option<Vehicle> {
    let node = world.node(vehicle.current_lane.node);
    let maneuver = vehicle.maneuver.base();
    let (next_node, kind, maneuver) = match (motion.phase, maneuver) {
        (ManeuverPhase::Advance, _) => (node.next?, vehicle.current_lane.kind, maneuver),
        (_, Maneuver::Straight) => (node.next?, vehicle.current_lane.kind, maneuver),
        // Past the crossing, a u-turner carries on down the opposite carriageway.
        (_, Maneuver::UTurn) => (world.node(node.opposite?).next?, LaneKind::Left, Maneuver::Straight),
        _ => return None,
    };
    Some(Vehicle {
        maneuver,
        phase: ManeuverPhase::Approach,
        position: motion.position,
        heading: world.node(next_node).frame.heading,
        current_lane: LaneRef { node: next_node, kind },
        ..vehicle.clone()
    })
}

// Whether `arriving` would join its lane behind a vehicle that sorts after it.
// That vehicle would leave the lane first, out of arrival order.
fn younger_ahead(world: &World, arriving: &Vehicle) -> bool {
    let frame = world.node(arriving.current_lane.node).frame;
    let at = frame.along(arriving.position);
    world
        .node(arriving.current_lane.node)
        .lane(arriving.current_lane.kind)
        .snapshot()
        .iter()
        .any(|v| vehicle_order(arriving, v) == Ordering::Less && frame.along(v.position) > at)
}

fn finish(world: &World, vehicle: Vehicle, motion: Motion, emergency_present: bool, report: &mut StepReport) {
    match hand_off_target(world, &vehicle, &motion) {
        // Emergencies must never wait on normal traffic, so the queue order
        // of a lane only yields while there is none.
        Some(next) if !emergency_present && younger_ahead(world, &next) => {
            world.apply_motion(&vehicle, &Motion { completed: false, ..motion });
            report.waiting += 1;
        }
        Some(next) => {
            if world.hand_off(vehicle.current_lane, next) {
                report.handed_off += 1;
            }
        }
        None => {
            if let Some(removed) = world.despawn(&vehicle, motion.position) {
                report.removed.push(Vehicle { heading: motion.heading, phase: motion.phase, ..removed });
            }
        }
    }
}
