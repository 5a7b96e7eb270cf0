use crate::config::SchedulerConfig;
use crate::error::{InvariantViolation, SpawnError};
use crate::monitoring::traffic_monitoring_system::{
    EventJournal, EventKind, IntersectionStats, SchedulerEvent, TrafficStats,
};
use crate::simulation_engine::grid::{Heading, Point};
use crate::simulation_engine::intersections::{IntersectionNode, LightBoard, LightState};
use crate::simulation_engine::lanes::{LaneKind, LaneQueue};
use crate::simulation_engine::movement::{self, Motion, MotionParams};
use crate::simulation_engine::topology::{CorridorTopology, NodeId};
use crate::simulation_engine::vehicles::{
    LaneRef, Maneuver, ManeuverPhase, Vehicle, VehicleClass, VehicleId,
};
use log::{info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// Read-only view of one vehicle, handed to renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub position: Point,
    pub heading: Heading,
    pub kind: VehicleClass,
    pub maneuver: Maneuver,
    pub phase: ManeuverPhase,
    pub intersection: String,
    pub lane: LaneKind,
}

/// The shared simulation state: every intersection, its queues and the light
/// board, plus the bookkeeping the invariant check needs.
///
/// Queue membership only changes while holding `gate`: spawns and removals
/// take it shared, hand-offs and the invariant check take it exclusive.
/// Snapshots take it shared and so never see a vehicle mid-transfer.
#[derive(Debug)]
pub struct World {
    config: SchedulerConfig,
    params: MotionParams,
    topology: CorridorTopology,
    nodes: Vec<IntersectionNode>,
    lights: LightBoard,
    gate: RwLock<()>,
    control_lock: Mutex<()>,
    // Holds the next vehicle id; serializes spawns against each other and
    // against stepper ticks.
    next_id: Mutex<u64>,
    spawned: AtomicUsize,
    removed: AtomicUsize,
    journal: EventJournal,
    origin: Instant,
}

impl World {
    /// Builds the world for a validated configuration.
    pub fn new(config: SchedulerConfig) -> Self {
        let topology = CorridorTopology::from_layout(&config.layout);
        let nodes = topology.ids().map(|id| IntersectionNode::new(&topology, id)).collect();
        Self {
            params: MotionParams::from(&config),
            lights: LightBoard::new(topology.len()),
            journal: EventJournal::new(config.journal_capacity),
            topology,
            nodes,
            gate: RwLock::new(()),
            control_lock: Mutex::new(()),
            next_id: Mutex::new(1),
            spawned: AtomicUsize::new(0),
            removed: AtomicUsize::new(0),
            origin: Instant::now(),
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn params(&self) -> &MotionParams {
        &self.params
    }

    pub fn topology(&self) -> &CorridorTopology {
        &self.topology
    }

    pub fn nodes(&self) -> &[IntersectionNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &IntersectionNode {
        &self.nodes[id.0]
    }

    pub fn lights(&self) -> &LightBoard {
        &self.lights
    }

    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    pub(crate) fn read_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_gate(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn control_lock(&self) -> &Mutex<()> {
        &self.control_lock
    }

    /// Held by a stepper tick so no vehicle appears between its collision
    /// checks and its moves. Take it before the gate.
    pub(crate) fn spawn_lock(&self) -> MutexGuard<'_, u64> {
        self.next_id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn queue(&self, lane: LaneRef) -> &LaneQueue {
        self.nodes[lane.node.0].lane(lane.kind)
    }

    fn now_nanos(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    pub fn light_state(&self, intersection: &str) -> Option<LightState> {
        self.topology.find(intersection).and_then(|id| self.lights.get(id))
    }

    /// Places a new vehicle at the next free slot behind the stop line of
    /// `lane`. Fails without changing anything if the slot is occupied.
    pub fn spawn_vehicle(
        &self,
        class: VehicleClass,
        maneuver: Maneuver,
        lane: &str,
    ) -> Result<VehicleId, SpawnError> {
        let node_id = self
            .topology
            .find(lane)
            .ok_or_else(|| SpawnError::UnknownLane(lane.to_string()))?;
        let node = self.node(node_id);
        if maneuver.is_second() && node.next.is_none() {
            return Err(SpawnError::InvalidManeuver { lane: lane.to_string(), maneuver });
        }
        let kind = maneuver.lane_kind();
        let queue = node.lane(kind);

        let mut next_id = self.spawn_lock();
        let _gate = self.read_gate();

        let queued = queue.snapshot();
        let waiting = queued
            .iter()
            .filter(|v| !movement::is_committed(v, &node.frame, &self.params))
            .count();
        let along = -(self.params.stop_line + self.config.spawn_spacing * waiting as f64);
        let position = node.frame.to_scene(along, kind.offset(self.params.lane_width));
        let heading = node.frame.heading;

        // A vehicle handed on from upstream may still be behind the free slot.
        // Spawning in front of it would let the newer vehicle leave first.
        let behind = queued
            .iter()
            .find(|v| node.frame.along(v.position) < along)
            .map(|v| v.id);
        if let Some(blocking) = behind.or_else(|| self.spawn_blocker(position, heading)) {
            warn!("Spawn on {} rejected: slot occupied by vehicle {}", lane, blocking);
            return Err(SpawnError::SpawnCollision {
                lane: lane.to_string(),
                blocking,
                x: position.x,
                y: position.y,
            });
        }

        let id = VehicleId(*next_id);
        *next_id += 1;
        let phase = if maneuver.is_second() { ManeuverPhase::Advance } else { ManeuverPhase::Approach };
        queue.enqueue(Vehicle {
            id,
            class,
            maneuver,
            arrival_time: self.now_nanos(),
            position,
            heading,
            phase,
            current_lane: LaneRef { node: node_id, kind },
        });
        self.spawned.fetch_add(1, Ordering::SeqCst);
        self.journal.record(SchedulerEvent::vehicle(
            EventKind::Spawned,
            id,
            &node.name,
            format!("{:?} {}", class, maneuver),
            position,
        ));
        info!("Vehicle {} ({:?}, {}) spawned on {} at ({:.1}, {:.1})", id, class, maneuver, lane, position.x, position.y);
        Ok(id)
    }

    // Any vehicle on the slot's lane line within the minimum safe distance,
    // whatever its queue or heading.
    fn spawn_blocker(&self, slot: Point, heading: Heading) -> Option<VehicleId> {
        self.nodes
            .iter()
            .flat_map(|node| node.lanes().flat_map(|(_, q)| q.snapshot()))
            .find(|v| movement::blocks_spawn(slot, heading, v.position, &self.params))
            .map(|v| v.id)
    }

    /// Ordered copy of every lane, taken atomically with respect to hand-offs.
    pub fn lane_snapshots(&self) -> Vec<(LaneRef, Vec<Vehicle>)> {
        let _gate = self.read_gate();
        self.nodes
            .iter()
            .flat_map(|node| {
                node.lanes()
                    .map(move |(kind, queue)| (LaneRef { node: node.id, kind }, queue.snapshot()))
            })
            .collect()
    }

    /// Head vehicle of every lane. The caller must hold the gate.
    pub(crate) fn heads(&self) -> Vec<Vehicle> {
        self.nodes.iter().flat_map(IntersectionNode::heads).collect()
    }

    pub fn snapshot(&self) -> Vec<VehicleSnapshot> {
        self.lane_snapshots()
            .into_iter()
            .flat_map(|(lane, vehicles)| {
                let intersection = self.topology.name(lane.node).to_string();
                vehicles.into_iter().map(move |v| VehicleSnapshot {
                    id: v.id,
                    position: v.position,
                    heading: v.heading,
                    kind: v.class,
                    maneuver: v.maneuver,
                    phase: v.phase,
                    intersection: intersection.clone(),
                    lane: lane.kind,
                })
            })
            .collect()
    }

    pub(crate) fn apply_motion(&self, vehicle: &Vehicle, motion: &Motion) -> bool {
        self.queue(vehicle.current_lane).update(vehicle.id, |v| {
            v.position = motion.position;
            v.heading = motion.heading;
            v.phase = motion.phase;
        })
    }

    /// Moves a vehicle from `from` into the queue named by its `current_lane`
    /// as one step: no snapshot sees it in neither or both queues.
    pub fn hand_off(&self, from: LaneRef, vehicle: Vehicle) -> bool {
        let _gate = self.write_gate();
        if self.queue(from).remove(vehicle.id).is_none() {
            warn!("Hand-off of vehicle {} failed: not queued on {}", vehicle.id, self.topology.name(from.node));
            return false;
        }
        let to = vehicle.current_lane;
        let event = SchedulerEvent::vehicle(
            EventKind::HandedOff,
            vehicle.id,
            self.topology.name(to.node),
            format!("from {} as {} ({:?})", self.topology.name(from.node), vehicle.maneuver, vehicle.phase),
            vehicle.position,
        );
        info!(
            "Vehicle {} handed off from {} to {}/{}",
            vehicle.id,
            self.topology.name(from.node),
            self.topology.name(to.node),
            to.kind
        );
        let inserted = self.queue(to).enqueue(vehicle);
        self.journal.record(event);
        inserted
    }

    /// Removes a vehicle that left the corridor, recording its final position.
    pub(crate) fn despawn(&self, vehicle: &Vehicle, at: Point) -> Option<Vehicle> {
        let _gate = self.read_gate();
        let mut removed = self.queue(vehicle.current_lane).remove(vehicle.id)?;
        removed.position = at;
        self.removed.fetch_add(1, Ordering::SeqCst);
        self.journal.record(SchedulerEvent::vehicle(
            EventKind::Removed,
            removed.id,
            self.topology.name(vehicle.current_lane.node),
            removed.maneuver.to_string(),
            at,
        ));
        info!("Vehicle {} left the corridor at ({:.1}, {:.1})", removed.id, at.x, at.y);
        Some(removed)
    }

    pub fn spawned_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn removed_count(&self) -> usize {
        self.removed.load(Ordering::SeqCst)
    }

    /// Verifies queue membership, lane order and the spawn/removal counters.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let _gate = self.write_gate();
        let mut seen = HashSet::new();
        let mut queued = 0;
        for node in &self.nodes {
            for (kind, queue) in node.lanes() {
                if let Some(vehicle) = queue.first_order_violation() {
                    return Err(InvariantViolation::OrderViolation {
                        lane: format!("{}/{}", node.name, kind),
                        vehicle,
                    });
                }
                for vehicle in queue.snapshot() {
                    if !seen.insert(vehicle.id) {
                        return Err(InvariantViolation::DuplicateVehicle(vehicle.id));
                    }
                    queued += 1;
                }
            }
        }
        let spawned = self.spawned_count();
        let removed = self.removed_count();
        if spawned.checked_sub(removed) != Some(queued) {
            return Err(InvariantViolation::CountMismatch { spawned, removed, queued });
        }
        Ok(())
    }

    pub fn stats(&self) -> TrafficStats {
        let _gate = self.read_gate();
        let lights = self.lights.read();
        let intersections: Vec<_> = self
            .nodes
            .iter()
            .map(|node| {
                let vehicles: Vec<_> = node.lanes().flat_map(|(_, q)| q.snapshot()).collect();
                IntersectionStats {
                    name: node.name.clone(),
                    light: lights.light(node.id).unwrap_or(LightState::Red),
                    queued: vehicles.len(),
                    emergencies: vehicles.iter().filter(|v| v.is_emergency()).count(),
                }
            })
            .collect();
        TrafficStats {
            spawned: self.spawned_count(),
            removed: self.removed_count(),
            queued: intersections.iter().map(|i| i.queued).sum(),
            intersections,
        }
    }
}
