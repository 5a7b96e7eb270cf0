use crate::simulation_engine::grid::Frame;
use crate::simulation_engine::lanes::{LaneKind, LaneQueue};
use crate::simulation_engine::topology::{CorridorTopology, NodeId};
use crate::simulation_engine::vehicles::{LaneRef, Maneuver, Vehicle};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightState {
    Green,
    Red,
}

/// Represents one approach of a crossing (node), with a queue per lane.
#[derive(Debug)]
pub struct IntersectionNode {
    pub id: NodeId,
    /// Approach name used by spawn commands.
    pub name: String,
    pub frame: Frame,
    lanes: [LaneQueue; 4],
    /// Next approach downstream, if the corridor continues.
    pub next: Option<NodeId>,
    /// Approach of the same crossing in the other direction.
    pub opposite: Option<NodeId>,
}

impl IntersectionNode {
    pub fn new(topology: &CorridorTopology, id: NodeId) -> Self {
        Self {
            id,
            name: topology.name(id).to_string(),
            frame: topology.frame(id),
            lanes: Default::default(),
            next: topology.next(id, topology.heading(id)),
            opposite: topology.opposite(id),
        }
    }

    pub fn lane(&self, kind: LaneKind) -> &LaneQueue {
        &self.lanes[kind.index()]
    }

    pub fn lanes(&self) -> impl Iterator<Item = (LaneKind, &LaneQueue)> {
        LaneKind::ALL.into_iter().map(move |kind| (kind, self.lane(kind)))
    }

    /// Head vehicle of every non-empty lane.
    pub fn heads(&self) -> Vec<Vehicle> {
        self.lanes.iter().filter_map(LaneQueue::peek).collect()
    }

    pub fn queued(&self) -> usize {
        self.lanes.iter().map(LaneQueue::len).sum()
    }
}

/// Permission for one lane to send vehicles past its stop line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LaneGrant {
    /// Every vehicle in the lane may enter the crossing.
    Open,
    /// Only vehicles making this movement through the crossing may enter.
    Only(Maneuver),
}

impl LaneGrant {
    pub fn admits(self, maneuver: Maneuver) -> bool {
        match self {
            LaneGrant::Open => true,
            LaneGrant::Only(granted) => granted == maneuver,
        }
    }
}

/// Lane grants of every node as one control decision left them. A node's
/// light is Green while any of its lanes is granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grants {
    approaches: Vec<[Option<LaneGrant>; 4]>,
}

impl Grants {
    pub fn all_red(nodes: usize) -> Self {
        Self { approaches: vec![[None; 4]; nodes] }
    }

    pub fn grant(&mut self, lane: LaneRef, grant: LaneGrant) {
        if let Some(approach) = self.approaches.get_mut(lane.node.0) {
            approach[lane.kind.index()] = Some(grant);
        }
    }

    pub fn lane(&self, lane: LaneRef) -> Option<LaneGrant> {
        self.approaches.get(lane.node.0).and_then(|approach| approach[lane.kind.index()])
    }

    pub fn light(&self, node: NodeId) -> Option<LightState> {
        self.approaches.get(node.0).map(|approach| {
            if approach.iter().any(Option::is_some) {
                LightState::Green
            } else {
                LightState::Red
            }
        })
    }

    /// Light of every node, in node order.
    pub fn lights(&self) -> Vec<LightState> {
        (0..self.approaches.len()).filter_map(|i| self.light(NodeId(i))).collect()
    }

    pub fn granted(&self) -> Vec<(LaneRef, LaneGrant)> {
        self.approaches
            .iter()
            .enumerate()
            .flat_map(|(i, approach)| {
                LaneKind::ALL.into_iter().filter_map(move |kind| {
                    approach[kind.index()].map(|grant| (LaneRef { node: NodeId(i), kind }, grant))
                })
            })
            .collect()
    }
}

/// The published grants, replaced as a whole so no observer ever sees half
/// of a control decision.
#[derive(Debug)]
pub struct LightBoard {
    grants: Mutex<Grants>,
}

impl LightBoard {
    /// Every light starts red.
    pub fn new(nodes: usize) -> Self {
        Self { grants: Mutex::new(Grants::all_red(nodes)) }
    }

    fn lock(&self) -> MutexGuard<'_, Grants> {
        self.grants.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read(&self) -> Grants {
        self.lock().clone()
    }

    pub fn get(&self, id: NodeId) -> Option<LightState> {
        self.lock().light(id)
    }

    pub fn lane(&self, lane: LaneRef) -> Option<LaneGrant> {
        self.lock().lane(lane)
    }

    /// Installs new grants and returns the previous ones.
    pub fn publish(&self, grants: Grants) -> Grants {
        std::mem::replace(&mut *self.lock(), grants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorridorLayout;

    #[test]
    fn node_takes_links_from_topology() {
        let topology = CorridorTopology::from_layout(&CorridorLayout::two_crossings());
        let west1 = topology.find("West1").unwrap();
        let node = IntersectionNode::new(&topology, west1);
        assert_eq!(node.name, "West1");
        assert_eq!(node.next, topology.find("West2"));
        assert_eq!(node.opposite, topology.find("East2"));
        assert_eq!(node.queued(), 0);
        assert!(node.heads().is_empty());
    }

    #[test]
    fn board_starts_red_and_swaps_whole() {
        let board = LightBoard::new(2);
        assert_eq!(board.read().lights(), vec![LightState::Red, LightState::Red]);
        let mut grants = Grants::all_red(2);
        let left = LaneRef { node: NodeId(0), kind: LaneKind::Left };
        grants.grant(left, LaneGrant::Only(Maneuver::Left));
        let old = board.publish(grants);
        assert_eq!(old, Grants::all_red(2));
        assert_eq!(board.get(NodeId(0)), Some(LightState::Green));
        assert_eq!(board.get(NodeId(1)), Some(LightState::Red));
        assert_eq!(board.get(NodeId(5)), None);
        assert_eq!(board.lane(left), Some(LaneGrant::Only(Maneuver::Left)));
        assert_eq!(board.lane(LaneRef { node: NodeId(0), kind: LaneKind::Straight }), None);
        assert_eq!(board.read().granted(), vec![(left, LaneGrant::Only(Maneuver::Left))]);
    }

    #[test]
    fn grant_admits_only_its_movement() {
        assert!(LaneGrant::Open.admits(Maneuver::UTurn));
        assert!(LaneGrant::Only(Maneuver::Straight).admits(Maneuver::Straight));
        assert!(!LaneGrant::Only(Maneuver::Straight).admits(Maneuver::Left));
    }
}
