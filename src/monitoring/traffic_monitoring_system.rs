use crate::simulation_engine::grid::Point;
use crate::simulation_engine::intersections::LightState;
use crate::simulation_engine::vehicles::VehicleId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// What happened to a vehicle or a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Spawned,
    LightChanged,
    HandedOff,
    Removed,
}

/// One row of the event journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerEvent {
    pub timestamp_ms: u64,
    pub event: EventKind,
    pub vehicle_id: Option<u64>,
    pub intersection: String,
    pub detail: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl SchedulerEvent {
    pub fn vehicle(event: EventKind, id: VehicleId, intersection: &str, detail: String, at: Point) -> Self {
        Self {
            timestamp_ms: current_timestamp_ms(),
            event,
            vehicle_id: Some(id.0),
            intersection: intersection.to_string(),
            detail,
            x: Some(at.x),
            y: Some(at.y),
        }
    }

    pub fn light(intersection: &str, state: LightState) -> Self {
        Self {
            timestamp_ms: current_timestamp_ms(),
            event: EventKind::LightChanged,
            vehicle_id: None,
            intersection: intersection.to_string(),
            detail: format!("{:?}", state),
            x: None,
            y: None,
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Bounded in-memory log of scheduler events. The oldest entries are
/// dropped once `capacity` is reached.
#[derive(Debug)]
pub struct EventJournal {
    events: Mutex<VecDeque<SchedulerEvent>>,
    capacity: usize,
}

impl EventJournal {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<SchedulerEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, event: SchedulerEvent) {
        let mut events = self.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.lock().iter().cloned().collect()
    }

    pub fn events_of(&self, kind: EventKind) -> Vec<SchedulerEvent> {
        self.lock().iter().filter(|e| e.event == kind).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Writes every event as CSV, with a header row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let events = self.events();
        let mut wtr = csv::WriterBuilder::new().has_headers(true).from_writer(writer);
        for event in &events {
            wtr.serialize(event)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Writes the journal to `path`, replacing any previous export.
    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), csv::Error> {
        let file = File::create(path)?;
        self.write_csv(file)
    }
}

/// Queue and light state of one intersection approach.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntersectionStats {
    pub name: String,
    pub light: LightState,
    pub queued: usize,
    pub emergencies: usize,
}

/// Summary counters of the whole world.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficStats {
    pub spawned: usize,
    pub removed: usize,
    pub queued: usize,
    pub intersections: Vec<IntersectionStats>,
}

impl TrafficStats {
    pub fn green(&self) -> Vec<&str> {
        self.intersections
            .iter()
            .filter(|i| i.light == LightState::Green)
            .map(|i| i.name.as_str())
            .collect()
    }
}
