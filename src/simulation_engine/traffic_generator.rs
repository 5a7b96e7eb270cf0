// Random traffic for demos and soak tests. Picks an approach, a maneuver that
// is possible there and a vehicle class, then spawns through the world.

use crate::error::{ParseError, SpawnError};
use crate::global_variables::EMERGENCY_PROBABILITY;
use crate::simulation_engine::topology::NodeId;
use crate::simulation_engine::vehicles::{Maneuver, VehicleClass, VehicleId};
use crate::simulation_engine::world::World;
use log::debug;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::str::FromStr;

/// A spawn request drawn by the generator.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub class: VehicleClass,
    pub maneuver: Maneuver,
    pub lane: String,
}

impl SpawnRequest {
    pub fn spawn(&self, world: &World) -> Result<VehicleId, SpawnError> {
        world.spawn_vehicle(self.class, self.maneuver, &self.lane)
    }
}

/// Parses `lane:maneuver[:class]`, e.g. `West1:u-turn:emergency`. The class
/// defaults to normal.
impl FromStr for SpawnRequest {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':').map(str::trim);
        let (Some(lane), Some(maneuver)) = (parts.next(), parts.next()) else {
            return Err(ParseError::MalformedSpawn(s.to_string()));
        };
        let class = match parts.next() {
            Some(class) => class.parse()?,
            None => VehicleClass::Normal,
        };
        if lane.is_empty() || parts.next().is_some() {
            return Err(ParseError::MalformedSpawn(s.to_string()));
        }
        Ok(SpawnRequest { class, maneuver: maneuver.parse()?, lane: lane.to_string() })
    }
}

pub struct TrafficGenerator {
    rng: StdRng,
    emergency_probability: f64,
}

impl TrafficGenerator {
    pub fn new(seed: u64) -> Self {
        Self::with_emergency_probability(seed, EMERGENCY_PROBABILITY)
    }

    pub fn with_emergency_probability(seed: u64, probability: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            emergency_probability: probability.clamp(0.0, 1.0),
        }
    }

    /// Draws a request that is valid for the world's topology.
    pub fn next_request(&mut self, world: &World) -> Option<SpawnRequest> {
        let ids: Vec<NodeId> = world.topology().ids().collect();
        let node = *ids.choose(&mut self.rng)?;
        let has_next = world.node(node).next.is_some();
        let maneuvers: Vec<Maneuver> = Maneuver::ALL
            .into_iter()
            .filter(|m| has_next || !m.is_second())
            .collect();
        let maneuver = *maneuvers.choose(&mut self.rng)?;
        let class = if self.rng.random_bool(self.emergency_probability) {
            VehicleClass::Emergency
        } else {
            VehicleClass::Normal
        };
        Some(SpawnRequest { class, maneuver, lane: world.topology().name(node).to_string() })
    }

    /// Draws a request and spawns it. A full spawn slot is reported, not retried.
    pub fn spawn_random(&mut self, world: &World) -> Option<Result<VehicleId, SpawnError>> {
        let request = self.next_request(world)?;
        let result = request.spawn(world);
        if let Err(e) = &result {
            debug!("Generated spawn rejected: {}", e);
        }
        Some(result)
    }

    /// Spawns one vehicle every period with probability `rate`.
    pub fn maybe_spawn(&mut self, world: &World, rate: f64) -> Option<Result<VehicleId, SpawnError>> {
        if self.rng.random_bool(rate.clamp(0.0, 1.0)) {
            self.spawn_random(world)
        } else {
            None
        }
    }
}
