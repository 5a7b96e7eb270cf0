use crate::config::CorridorLayout;
use crate::simulation_engine::grid::{Frame, Heading, Point};
use serde::Serialize;
use std::fmt;

/// Index of an intersection approach in the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// One approach of one crossing: traffic arriving at `center` travelling `heading`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub name: String,
    pub center: Point,
    pub heading: Heading,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, center: Point, heading: Heading) -> Self {
        Self { name: name.into(), center, heading }
    }
}

const EPS: f64 = 1e-6;

/// Static adjacency of the intersection approaches. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct CorridorTopology {
    nodes: Vec<NodeSpec>,
    next: Vec<Option<NodeId>>,
    opposite: Vec<Option<NodeId>>,
}

impl CorridorTopology {
    pub fn new(nodes: Vec<NodeSpec>) -> Self {
        let mut topology = Self {
            next: vec![None; nodes.len()],
            opposite: vec![None; nodes.len()],
            nodes,
        };
        for i in 0..topology.nodes.len() {
            let heading = topology.nodes[i].heading;
            topology.next[i] = topology.nearest_ahead(NodeId(i), heading);
            topology.opposite[i] = topology.same_center(NodeId(i), heading.reverse());
        }
        topology
    }

    pub fn from_layout(layout: &CorridorLayout) -> Self {
        match layout {
            CorridorLayout::Crossroads { center_x, center_y } => {
                let center = Point::new(*center_x, *center_y);
                Self::new(vec![
                    NodeSpec::new("North", center, Heading::South),
                    NodeSpec::new("South", center, Heading::North),
                    NodeSpec::new("East", center, Heading::West),
                    NodeSpec::new("West", center, Heading::East),
                ])
            }
            CorridorLayout::Corridor { road_y, crossings } => {
                let mut nodes = Vec::with_capacity(crossings.len() * 2);
                for (i, x) in crossings.iter().enumerate() {
                    nodes.push(NodeSpec::new(
                        format!("West{}", i + 1),
                        Point::new(*x, *road_y),
                        Heading::East,
                    ));
                }
                for (i, x) in crossings.iter().rev().enumerate() {
                    nodes.push(NodeSpec::new(
                        format!("East{}", i + 1),
                        Point::new(*x, *road_y),
                        Heading::West,
                    ));
                }
                Self::new(nodes)
            }
        }
    }

    // Closest node with `heading` on the same line, strictly ahead of `from`.
    fn nearest_ahead(&self, from: NodeId, heading: Heading) -> Option<NodeId> {
        let frame = Frame::new(self.center(from), heading);
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.heading == heading)
            .map(|(i, n)| (i, frame.along(n.center), frame.lateral(n.center)))
            .filter(|&(_, along, lateral)| along > EPS && lateral.abs() < EPS)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _, _)| NodeId(i))
    }

    fn same_center(&self, of: NodeId, heading: Heading) -> Option<NodeId> {
        let center = self.center(of);
        self.nodes
            .iter()
            .position(|n| n.heading == heading && n.center.distance(center) < EPS)
            .map(NodeId)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Next intersection reached travelling `heading` from `id`.
    pub fn next(&self, id: NodeId, heading: Heading) -> Option<NodeId> {
        if self.heading(id) == heading {
            self.next[id.0]
        } else {
            self.nearest_ahead(id, heading)
        }
    }

    /// Approach of the same crossing carrying traffic the other way.
    pub fn opposite(&self, id: NodeId) -> Option<NodeId> {
        self.opposite[id.0]
    }

    /// The crossing's x for horizontal traffic, its y for vertical traffic.
    pub fn reference_line(&self, id: NodeId) -> f64 {
        let node = &self.nodes[id.0];
        if node.heading.is_horizontal() {
            node.center.x
        } else {
            node.center.y
        }
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id.0].name
    }

    pub fn center(&self, id: NodeId) -> Point {
        self.nodes[id.0].center
    }

    pub fn heading(&self, id: NodeId) -> Heading {
        self.nodes[id.0].heading
    }

    pub fn frame(&self, id: NodeId) -> Frame {
        Frame::new(self.center(id), self.heading(id))
    }

    /// Whether two approaches meet at one crossing, and so can conflict.
    pub fn same_crossing(&self, a: NodeId, b: NodeId) -> bool {
        self.center(a).distance(self.center(b)) < EPS
    }
}
