use crate::config::SchedulerConfig;
use crate::control_system::periodic::PeriodicTask;
use crate::control_system::traffic_light_controller::{run_control_cycle, CycleDecision};
use crate::error::{InvariantViolation, SchedulerError, SpawnError};
use crate::monitoring::traffic_monitoring_system::{EventJournal, TrafficStats};
use crate::simulation_engine::intersections::LightState;
use crate::simulation_engine::stepper::{self, StepReport};
use crate::simulation_engine::vehicles::{Maneuver, VehicleClass, VehicleId};
use crate::simulation_engine::world::{VehicleSnapshot, World};
use log::info;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;

struct RunningTasks {
    control: PeriodicTask,
    motion: PeriodicTask,
}

/// Owns the world and drives it with two periodic tasks: the control cycle
/// that sets the lights and the stepper that moves vehicles.
///
/// Every method takes `&self` and is safe to call while the tasks run.
pub struct TrafficScheduler {
    world: Arc<World>,
    tasks: Mutex<Option<RunningTasks>>,
}

impl TrafficScheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self {
            world: Arc::new(World::new(config)),
            tasks: Mutex::new(None),
        })
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    pub fn spawn_vehicle(
        &self,
        class: VehicleClass,
        maneuver: Maneuver,
        lane: &str,
    ) -> Result<VehicleId, SpawnError> {
        self.world.spawn_vehicle(class, maneuver, lane)
    }

    /// Point-in-time copy of every vehicle. Never sees a hand-off half done.
    pub fn snapshot(&self) -> Vec<VehicleSnapshot> {
        self.world.snapshot()
    }

    pub fn light_state(&self, intersection: &str) -> Option<LightState> {
        self.world.light_state(intersection)
    }

    /// Runs one control cycle now, outside the periodic task.
    pub fn run_control_cycle(&self) -> CycleDecision {
        run_control_cycle(&self.world)
    }

    /// Runs one stepper tick now, outside the periodic task.
    pub fn step(&self) -> Result<StepReport, InvariantViolation> {
        stepper::step(&self.world)
    }

    pub fn stats(&self) -> TrafficStats {
        self.world.stats()
    }

    pub fn journal(&self) -> &EventJournal {
        self.world.journal()
    }

    fn tasks(&self) -> MutexGuard<'_, Option<RunningTasks>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.tasks().is_some()
    }

    /// Starts both periodic tasks on the current tokio runtime. The first
    /// control cycle runs immediately. Calling it again while running does nothing.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut tasks = self.tasks();
        if tasks.is_some() {
            return Ok(());
        }
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        let config = self.world.config();

        let world = Arc::clone(&self.world);
        let control = PeriodicTask::spawn(&runtime, "control cycle", config.control_period(), move || {
            run_control_cycle(&world);
            Ok(())
        });
        let world = Arc::clone(&self.world);
        let motion = PeriodicTask::spawn(&runtime, "stepper", config.step_period(), move || {
            stepper::step(&world).map(|_| ()).map_err(SchedulerError::from)
        });

        *tasks = Some(RunningTasks { control, motion });
        info!("Traffic scheduler started with {} intersections", self.world.topology().len());
        Ok(())
    }

    /// Stops both tasks, waiting at most the configured grace period before
    /// aborting them. Returns after both have terminated. Idempotent.
    pub async fn stop(&self) {
        let running = self.tasks().take();
        let Some(RunningTasks { control, motion }) = running else {
            return;
        };
        let grace = self.world.config().stop_grace();
        tokio::join!(control.shutdown(grace), motion.shutdown(grace));
        info!("Traffic scheduler stopped");
    }
}
