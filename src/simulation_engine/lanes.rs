use crate::simulation_engine::vehicles::{vehicle_order, Vehicle, VehicleId};
use log::error;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The four lanes of an approach, innermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum LaneKind {
    UTurn,
    Left,
    Straight,
    Right,
}

impl LaneKind {
    pub const ALL: [LaneKind; 4] = [LaneKind::UTurn, LaneKind::Left, LaneKind::Straight, LaneKind::Right];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Distance of the lane's centre line to the right of the road centre.
    pub fn offset(self, lane_width: f64) -> f64 {
        (self.index() as f64 + 0.5) * lane_width
    }
}

impl fmt::Display for LaneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Vehicles waiting in one lane, kept in `priority_order`.
///
/// Every method takes the lock once, so each call is atomic with respect to
/// the control cycle, the stepper and spawn calls.
#[derive(Debug, Default)]
pub struct LaneQueue {
    vehicles: Mutex<Vec<Vehicle>>,
}

impl LaneQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Vehicle>> {
        self.vehicles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts in priority position. Returns false if an equal entry is
    /// already queued, which breaks the strict order and is fatal in debug builds.
    pub fn enqueue(&self, vehicle: Vehicle) -> bool {
        let mut vehicles = self.lock();
        match vehicles.binary_search_by(|v| vehicle_order(v, &vehicle)) {
            Ok(_) => {
                if cfg!(debug_assertions) {
                    panic!("vehicle {} enqueued twice", vehicle.id);
                }
                error!("Vehicle {} is already queued, ignoring duplicate", vehicle.id);
                false
            }
            Err(pos) => {
                vehicles.insert(pos, vehicle);
                true
            }
        }
    }

    pub fn peek(&self) -> Option<Vehicle> {
        self.lock().first().cloned()
    }

    pub fn dequeue(&self) -> Option<Vehicle> {
        let mut vehicles = self.lock();
        if vehicles.is_empty() {
            None
        } else {
            Some(vehicles.remove(0))
        }
    }

    /// Removes a vehicle wherever it sits in the queue.
    pub fn remove(&self, id: VehicleId) -> Option<Vehicle> {
        let mut vehicles = self.lock();
        let pos = vehicles.iter().position(|v| v.id == id)?;
        Some(vehicles.remove(pos))
    }

    /// Ordered copy of the queue.
    pub fn snapshot(&self) -> Vec<Vehicle> {
        self.lock().clone()
    }

    /// Applies an in-place change to one vehicle. The change must not touch
    /// the fields `priority_order` reads.
    pub fn update<F>(&self, id: VehicleId, f: F) -> bool
    where
        F: FnOnce(&mut Vehicle),
    {
        let mut vehicles = self.lock();
        match vehicles.iter_mut().find(|v| v.id == id) {
            Some(vehicle) => {
                f(vehicle);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: VehicleId) -> bool {
        self.lock().iter().any(|v| v.id == id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// First entry that is not strictly after its predecessor.
    pub fn first_order_violation(&self) -> Option<VehicleId> {
        self.lock()
            .windows(2)
            .find(|pair| vehicle_order(&pair[0], &pair[1]) != Ordering::Less)
            .map(|pair| pair[1].id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation_engine::grid::{Heading, Point};
    use crate::simulation_engine::topology::NodeId;
    use crate::simulation_engine::vehicles::{LaneRef, Maneuver, ManeuverPhase, VehicleClass};
    use std::sync::Arc;
    use std::thread;

    fn vehicle(id: u64, class: VehicleClass, arrival_time: u64) -> Vehicle {
        Vehicle {
            id: VehicleId(id),
            class,
            maneuver: Maneuver::Straight,
            arrival_time,
            position: Point::default(),
            heading: Heading::South,
            phase: ManeuverPhase::Approach,
            current_lane: LaneRef { node: NodeId(0), kind: LaneKind::Straight },
        }
    }

    fn ids(queue: &LaneQueue) -> Vec<u64> {
        queue.snapshot().iter().map(|v| v.id.0).collect()
    }

    #[test]
    fn keeps_arrival_order_with_emergency_first() {
        let queue = LaneQueue::new();
        queue.enqueue(vehicle(1, VehicleClass::Normal, 10));
        queue.enqueue(vehicle(2, VehicleClass::Normal, 20));
        queue.enqueue(vehicle(3, VehicleClass::Emergency, 30));
        queue.enqueue(vehicle(4, VehicleClass::Normal, 5));
        assert_eq!(ids(&queue), vec![3, 4, 1, 2]);
        assert_eq!(queue.peek().map(|v| v.id), Some(VehicleId(3)));
        assert_eq!(queue.dequeue().map(|v| v.id), Some(VehicleId(3)));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.first_order_violation(), None);
    }

    #[test]
    fn remove_from_the_middle() {
        let queue = LaneQueue::new();
        for id in 1..=3 {
            queue.enqueue(vehicle(id, VehicleClass::Normal, id * 10));
        }
        assert_eq!(queue.remove(VehicleId(2)).map(|v| v.id), Some(VehicleId(2)));
        assert_eq!(queue.remove(VehicleId(2)), None);
        assert_eq!(ids(&queue), vec![1, 3]);
        assert!(!queue.contains(VehicleId(2)));
    }

    #[test]
    fn update_changes_one_vehicle() {
        let queue = LaneQueue::new();
        queue.enqueue(vehicle(1, VehicleClass::Normal, 1));
        assert!(queue.update(VehicleId(1), |v| v.position = Point::new(3.0, 4.0)));
        assert!(!queue.update(VehicleId(9), |v| v.position = Point::default()));
        assert_eq!(queue.peek().unwrap().position, Point::new(3.0, 4.0));
    }

    #[test]
    fn empty_queue() {
        let queue = LaneQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.peek(), None);
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn concurrent_enqueue_keeps_order() {
        let queue = Arc::new(LaneQueue::new());
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..50u64 {
                        let id = t * 50 + i;
                        queue.enqueue(vehicle(id, VehicleClass::Normal, (id * 7919) % 1000));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.len(), 200);
        assert_eq!(queue.first_order_violation(), None);
    }

    #[test]
    fn lane_offsets() {
        assert_eq!(LaneKind::UTurn.offset(20.0), 10.0);
        assert_eq!(LaneKind::Right.offset(20.0), 70.0);
    }
}
