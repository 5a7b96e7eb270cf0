use crate::error::ParseError;
use crate::simulation_engine::grid::{Heading, Point};
use crate::simulation_engine::lanes::LaneKind;
use crate::simulation_engine::topology::NodeId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Unique vehicle identifier, allocated in spawn order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId(pub u64);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}", self.0)
    }
}

/// Different classes of vehicles in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleClass {
    Normal,
    /// Preempts the lights and wins every priority comparison.
    Emergency,
}

impl FromStr for VehicleClass {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(VehicleClass::Normal),
            "emergency" => Ok(VehicleClass::Emergency),
            _ => Err(ParseError::UnknownVehicleClass(s.to_string())),
        }
    }
}

/// What the vehicle does at the crossing. The `*Second` variants drive
/// straight through the first crossing and perform the turn at the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Maneuver {
    Straight,
    Left,
    Right,
    UTurn,
    LeftSecond,
    RightSecond,
    UTurnSecond,
}

impl Maneuver {
    pub const ALL: [Maneuver; 7] = [
        Maneuver::Straight,
        Maneuver::Left,
        Maneuver::Right,
        Maneuver::UTurn,
        Maneuver::LeftSecond,
        Maneuver::RightSecond,
        Maneuver::UTurnSecond,
    ];

    /// The turn performed once the vehicle is at its turning intersection.
    pub fn base(self) -> Maneuver {
        match self {
            Maneuver::LeftSecond => Maneuver::Left,
            Maneuver::RightSecond => Maneuver::Right,
            Maneuver::UTurnSecond => Maneuver::UTurn,
            other => other,
        }
    }

    pub fn is_second(self) -> bool {
        self != self.base()
    }

    /// Lane a vehicle with this maneuver queues in.
    pub fn lane_kind(self) -> LaneKind {
        match self.base() {
            Maneuver::Left => LaneKind::Left,
            Maneuver::Right => LaneKind::Right,
            Maneuver::UTurn => LaneKind::UTurn,
            _ => LaneKind::Straight,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Maneuver::Straight => "straight",
            Maneuver::Left => "left",
            Maneuver::Right => "right",
            Maneuver::UTurn => "u-turn",
            Maneuver::LeftSecond => "left-2nd",
            Maneuver::RightSecond => "right-2nd",
            Maneuver::UTurnSecond => "u-turn-2nd",
        }
    }
}

impl fmt::Display for Maneuver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Maneuver {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase();
        Maneuver::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| ParseError::UnknownManeuver(s.to_string()))
    }
}

/// Where the vehicle is in its maneuver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManeuverPhase {
    /// Driving towards the turn point.
    Approach,
    /// Crossing the first intersection of a `*Second` maneuver.
    Advance,
    /// Moving sideways into the target lane.
    Turn,
    /// Leaving the intersection in the final heading.
    Exit,
}

/// The queue a vehicle currently belongs to. A back-reference only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LaneRef {
    pub node: NodeId,
    pub kind: LaneKind,
}

/// A vehicle travelling through the corridor.
#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub id: VehicleId,
    pub class: VehicleClass,
    pub maneuver: Maneuver,
    /// Nanoseconds since the world was created. Set once at spawn.
    pub arrival_time: u64,
    pub position: Point,
    pub heading: Heading,
    pub phase: ManeuverPhase,
    pub current_lane: LaneRef,
}

impl Vehicle {
    pub fn is_emergency(&self) -> bool {
        self.class == VehicleClass::Emergency
    }

    pub fn priority_key(&self) -> PriorityKey {
        PriorityKey {
            emergency: self.is_emergency(),
            arrival_time: self.arrival_time,
            id: self.id,
        }
    }

    /// Movement this vehicle makes through its current crossing.
    pub fn crossing_maneuver(&self) -> Maneuver {
        if self.phase == ManeuverPhase::Advance {
            Maneuver::Straight
        } else {
            self.maneuver.base()
        }
    }
}

/// The fields that decide who goes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityKey {
    pub emergency: bool,
    pub arrival_time: u64,
    pub id: VehicleId,
}

/// Emergency before normal, then earlier arrival, then lower id.
pub fn priority_order(a: &PriorityKey, b: &PriorityKey) -> Ordering {
    b.emergency
        .cmp(&a.emergency)
        .then(a.arrival_time.cmp(&b.arrival_time))
        .then(a.id.cmp(&b.id))
}

/// `priority_order` over whole vehicles.
pub fn vehicle_order(a: &Vehicle, b: &Vehicle) -> Ordering {
    priority_order(&a.priority_key(), &b.priority_key())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(emergency: bool, arrival_time: u64, id: u64) -> PriorityKey {
        PriorityKey { emergency, arrival_time, id: VehicleId(id) }
    }

    #[test]
    fn emergency_beats_earlier_arrival() {
        assert_eq!(priority_order(&key(true, 90, 5), &key(false, 10, 1)), Ordering::Less);
        assert_eq!(priority_order(&key(false, 10, 1), &key(true, 90, 5)), Ordering::Greater);
    }

    #[test]
    fn earlier_arrival_then_lower_id() {
        assert_eq!(priority_order(&key(false, 10, 9), &key(false, 20, 1)), Ordering::Less);
        assert_eq!(priority_order(&key(true, 10, 2), &key(true, 10, 3)), Ordering::Less);
        assert_eq!(priority_order(&key(false, 10, 3), &key(false, 10, 3)), Ordering::Equal);
    }

    #[test]
    fn lane_kind_follows_base_maneuver() {
        assert_eq!(Maneuver::UTurnSecond.lane_kind(), LaneKind::UTurn);
        assert_eq!(Maneuver::LeftSecond.base(), Maneuver::Left);
        assert!(Maneuver::RightSecond.is_second());
        assert!(!Maneuver::Straight.is_second());
        assert_eq!(Maneuver::Straight.lane_kind(), LaneKind::Straight);
    }

    #[test]
    fn parses_maneuver_names() {
        assert_eq!("u-turn-2nd".parse::<Maneuver>(), Ok(Maneuver::UTurnSecond));
        assert_eq!("Left".parse::<Maneuver>(), Ok(Maneuver::Left));
        assert_eq!(Maneuver::RightSecond.to_string(), "right-2nd");
        assert!(matches!("sideways".parse::<Maneuver>(), Err(ParseError::UnknownManeuver(_))));
        assert_eq!("EMERGENCY".parse::<VehicleClass>(), Ok(VehicleClass::Emergency));
        assert!("bus".parse::<VehicleClass>().is_err());
    }
}
