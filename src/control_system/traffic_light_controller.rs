use crate::control_system::compatibility::compatible;
use crate::monitoring::traffic_monitoring_system::SchedulerEvent;
use crate::simulation_engine::intersections::{Grants, LaneGrant};
use crate::simulation_engine::topology::CorridorTopology;
use crate::simulation_engine::vehicles::{vehicle_order, LaneRef, Maneuver, Vehicle, VehicleId};
use crate::simulation_engine::world::World;
use log::{debug, info, warn};
use std::sync::TryLockError;

/// Outcome of one control cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleDecision {
    /// The oldest emergency vehicle's lane is the only one granted.
    Emergency { vehicle: VehicleId, lane: LaneRef },
    /// Two or more mutually compatible lanes, each granted for the movement
    /// of its head vehicle.
    Group { lanes: Vec<(LaneRef, Maneuver)> },
    /// Only the lane of the oldest waiting vehicle is granted, for that
    /// vehicle's movement.
    Fifo { lane: LaneRef, maneuver: Maneuver },
    /// Nothing is waiting; every light is red.
    Idle,
    /// A previous cycle was still running; no lights changed.
    Skipped,
}

impl CycleDecision {
    pub fn granted_lanes(&self) -> Vec<LaneRef> {
        match self {
            CycleDecision::Emergency { lane, .. } | CycleDecision::Fifo { lane, .. } => vec![*lane],
            CycleDecision::Group { lanes } => lanes.iter().map(|(lane, _)| *lane).collect(),
            CycleDecision::Idle | CycleDecision::Skipped => Vec::new(),
        }
    }

    /// Grants for this decision. Everything starts red. Only an emergency
    /// opens its lane to every movement, so it can push out what is ahead.
    pub fn grants(&self, nodes: usize) -> Grants {
        let mut grants = Grants::all_red(nodes);
        match self {
            CycleDecision::Emergency { lane, .. } => grants.grant(*lane, LaneGrant::Open),
            CycleDecision::Fifo { lane, maneuver } => grants.grant(*lane, LaneGrant::Only(*maneuver)),
            CycleDecision::Group { lanes } => {
                for (lane, maneuver) in lanes {
                    grants.grant(*lane, LaneGrant::Only(*maneuver));
                }
            }
            CycleDecision::Idle | CycleDecision::Skipped => {}
        }
        grants
    }
}

/// Picks the granted lanes from the head vehicle of every lane.
pub fn plan_lights(heads: &[Vehicle], topology: &CorridorTopology) -> CycleDecision {
    let mut heads = heads.to_vec();
    heads.sort_by(vehicle_order);

    let Some(first) = heads.first() else {
        return CycleDecision::Idle;
    };
    // Emergencies sort first, so the first head is the oldest emergency if any.
    if first.is_emergency() {
        return CycleDecision::Emergency { vehicle: first.id, lane: first.current_lane };
    }

    // A lane joins only if its head's movement fits every admitted movement
    // at the same crossing, including the other lanes of its own approach.
    let mut admitted: Vec<(LaneRef, Maneuver)> = Vec::new();
    for head in &heads {
        let maneuver = head.crossing_maneuver();
        let fits = admitted
            .iter()
            .filter(|(lane, _)| topology.same_crossing(lane.node, head.current_lane.node))
            .all(|(_, other)| compatible(*other, maneuver));
        if fits {
            admitted.push((head.current_lane, maneuver));
        }
    }

    if admitted.len() >= 2 {
        CycleDecision::Group { lanes: admitted }
    } else {
        CycleDecision::Fifo { lane: first.current_lane, maneuver: first.crossing_maneuver() }
    }
}

/// Runs one control cycle: reads the lane heads and publishes the new
/// grants inside one critical section. Skips if another cycle is running.
pub fn run_control_cycle(world: &World) -> CycleDecision {
    let _cycle = match world.control_lock().try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        Err(TryLockError::WouldBlock) => {
            warn!("Control cycle still running, skipping this tick");
            return CycleDecision::Skipped;
        }
    };
    let _gate = world.read_gate();

    let heads = world.heads();
    let decision = plan_lights(&heads, world.topology());
    let grants = decision.grants(world.topology().len());
    let previous = world.lights().publish(grants.clone());

    for id in world.topology().ids() {
        let (before, after) = (previous.light(id), grants.light(id));
        if let (Some(before), Some(after)) = (before, after) {
            if before != after {
                let name = world.topology().name(id);
                info!("Traffic Light {}: {:?} -> {:?}", name, before, after);
                world.journal().record(SchedulerEvent::light(name, after));
            }
        }
    }
    match &decision {
        CycleDecision::Emergency { vehicle, lane } => {
            info!("Emergency vehicle {} preempts {}/{}", vehicle, world.topology().name(lane.node), lane.kind)
        }
        other => debug!("Control cycle decision: {:?}", other),
    }
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CorridorLayout, SchedulerConfig};
    use crate::simulation_engine::intersections::LightState;
    use crate::simulation_engine::lanes::LaneKind;
    use crate::simulation_engine::vehicles::VehicleClass;

    fn crossroads() -> World {
        World::new(SchedulerConfig::default())
    }

    fn lane(world: &World, name: &str, kind: LaneKind) -> LaneRef {
        LaneRef { node: world.topology().find(name).unwrap(), kind }
    }

    #[test]
    fn empty_world_is_idle_and_all_red() {
        let world = crossroads();
        assert_eq!(run_control_cycle(&world), CycleDecision::Idle);
        assert!(world.lights().read().lights().iter().all(|l| *l == LightState::Red));
    }

    #[test]
    fn oldest_emergency_wins() {
        let world = crossroads();
        world.spawn_vehicle(VehicleClass::Normal, Maneuver::Straight, "North").unwrap();
        let first = world.spawn_vehicle(VehicleClass::Emergency, Maneuver::Left, "South").unwrap();
        world.spawn_vehicle(VehicleClass::Emergency, Maneuver::Right, "East").unwrap();
        assert_eq!(
            run_control_cycle(&world),
            CycleDecision::Emergency { vehicle: first, lane: lane(&world, "South", LaneKind::Left) }
        );
        assert_eq!(world.light_state("South"), Some(LightState::Green));
        assert_eq!(world.light_state("North"), Some(LightState::Red));
        assert_eq!(world.light_state("East"), Some(LightState::Red));
        assert_eq!(world.lights().read().granted(), vec![(lane(&world, "South", LaneKind::Left), LaneGrant::Open)]);
    }

    #[test]
    fn compatible_heads_form_a_group() {
        let world = crossroads();
        world.spawn_vehicle(VehicleClass::Normal, Maneuver::Straight, "North").unwrap();
        world.spawn_vehicle(VehicleClass::Normal, Maneuver::UTurn, "South").unwrap();
        world.spawn_vehicle(VehicleClass::Normal, Maneuver::Straight, "East").unwrap();
        let decision = run_control_cycle(&world);
        assert_eq!(
            decision,
            CycleDecision::Group {
                lanes: vec![
                    (lane(&world, "North", LaneKind::Straight), Maneuver::Straight),
                    (lane(&world, "South", LaneKind::UTurn), Maneuver::UTurn),
                ]
            }
        );
        assert_eq!(world.light_state("East"), Some(LightState::Red));
    }

    #[test]
    fn conflicting_lane_of_a_green_approach_stays_red() {
        let world = crossroads();
        world.spawn_vehicle(VehicleClass::Normal, Maneuver::Straight, "North").unwrap();
        world.spawn_vehicle(VehicleClass::Normal, Maneuver::Right, "South").unwrap();
        // The left turner conflicts with North's straight.
        world.spawn_vehicle(VehicleClass::Normal, Maneuver::Left, "South").unwrap();
        let decision = run_control_cycle(&world);
        assert_eq!(
            decision.granted_lanes(),
            vec![lane(&world, "North", LaneKind::Straight), lane(&world, "South", LaneKind::Right)]
        );
        assert_eq!(world.light_state("South"), Some(LightState::Green));
        assert_eq!(world.lights().lane(lane(&world, "South", LaneKind::Left)), None);
    }

    #[test]
    fn lanes_of_one_approach_are_checked_against_each_other() {
        let world = crossroads();
        world.spawn_vehicle(VehicleClass::Normal, Maneuver::Straight, "West").unwrap();
        world.spawn_vehicle(VehicleClass::Normal, Maneuver::Left, "West").unwrap();
        assert_eq!(
            run_control_cycle(&world),
            CycleDecision::Fifo { lane: lane(&world, "West", LaneKind::Straight), maneuver: Maneuver::Straight }
        );
        assert_eq!(
            world.lights().lane(lane(&world, "West", LaneKind::Straight)),
            Some(LaneGrant::Only(Maneuver::Straight))
        );
    }

    #[test]
    fn separate_crossings_never_conflict() {
        let world = World::new(SchedulerConfig { layout: CorridorLayout::two_crossings(), ..Default::default() });
        world.spawn_vehicle(VehicleClass::Normal, Maneuver::Straight, "West1").unwrap();
        world.spawn_vehicle(VehicleClass::Normal, Maneuver::Straight, "West2").unwrap();
        world.spawn_vehicle(VehicleClass::Normal, Maneuver::Straight, "East2").unwrap();
        // East2 shares the first crossing with West1.
        assert_eq!(
            run_control_cycle(&world).granted_lanes(),
            vec![lane(&world, "West1", LaneKind::Straight), lane(&world, "West2", LaneKind::Straight)]
        );
    }

    #[test]
    fn advancing_vehicle_crosses_as_straight() {
        let world = World::new(SchedulerConfig { layout: CorridorLayout::two_crossings(), ..Default::default() });
        world.spawn_vehicle(VehicleClass::Normal, Maneuver::UTurnSecond, "West1").unwrap();
        world.spawn_vehicle(VehicleClass::Normal, Maneuver::UTurn, "East2").unwrap();
        // straight + u-turn is allowed; u-turn + u-turn would not be.
        assert_eq!(
            run_control_cycle(&world),
            CycleDecision::Group {
                lanes: vec![
                    (lane(&world, "West1", LaneKind::UTurn), Maneuver::Straight),
                    (lane(&world, "East2", LaneKind::UTurn), Maneuver::UTurn),
                ]
            }
        );
    }

    #[test]
    fn light_changes_are_journaled() {
        let world = crossroads();
        world.spawn_vehicle(VehicleClass::Normal, Maneuver::Straight, "West").unwrap();
        run_control_cycle(&world);
        run_control_cycle(&world);
        let changes = world
            .journal()
            .events_of(crate::monitoring::traffic_monitoring_system::EventKind::LightChanged);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].intersection, "West");
    }

    #[test]
    fn overlapping_cycle_is_skipped() {
        let world = crossroads();
        let _running = world.control_lock().lock().unwrap();
        assert_eq!(run_control_cycle(&world), CycleDecision::Skipped);
    }
}
