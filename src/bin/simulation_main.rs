// simulation_main.rs
use log::{debug, error, info};
use std::time::Duration;
use traffic_scheduler::global_variables::EVENTS_CSV;
use traffic_scheduler::simulation_engine::traffic_generator::{SpawnRequest, TrafficGenerator};
use traffic_scheduler::{SchedulerConfig, TrafficScheduler};

const RUN_SECONDS: u64 = 30;

#[tokio::main]
async fn main() {
    env_logger::init();

    // Usage: simulation_main [config.json] [--spawn lane:maneuver[:class]]...
    let mut config_path = None;
    let mut requests = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg != "--spawn" {
            config_path = Some(arg);
            continue;
        }
        match args.next().map(|text| text.parse::<SpawnRequest>()) {
            Some(Ok(request)) => requests.push(request),
            Some(Err(e)) => {
                error!("Bad --spawn argument: {}", e);
                std::process::exit(1);
            }
            None => {
                error!("--spawn needs a lane:maneuver[:class] value");
                std::process::exit(1);
            }
        }
    }

    let config = match config_path {
        Some(path) => match SchedulerConfig::from_json_file(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => SchedulerConfig::default(),
    };

    let scheduler = match TrafficScheduler::new(config) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = scheduler.start() {
        error!("Failed to start scheduler: {}", e);
        std::process::exit(1);
    }

    for request in &requests {
        match request.spawn(scheduler.world()) {
            Ok(id) => info!("Spawned vehicle {} on {}", id, request.lane),
            Err(e) => error!("Spawn on {} rejected: {}", request.lane, e),
        }
    }

    let mut generator = TrafficGenerator::new(42);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    for _ in 0..RUN_SECONDS {
        ticker.tick().await;
        generator.maybe_spawn(scheduler.world(), 0.8);
        match serde_json::to_string(&scheduler.snapshot()) {
            Ok(json) => debug!("Snapshot: {}", json),
            Err(e) => error!("Failed to serialize snapshot: {}", e),
        }
    }

    scheduler.stop().await;

    let stats = scheduler.stats();
    info!(
        "Spawned {}, removed {}, still queued {}",
        stats.spawned, stats.removed, stats.queued
    );
    if let Ok(json) = serde_json::to_string_pretty(&stats) {
        println!("{}", json);
    }
    match scheduler.journal().export_csv(EVENTS_CSV) {
        Ok(()) => info!("Event journal written to {}", EVENTS_CSV),
        Err(e) => error!("Error exporting event journal: {}", e),
    }
}
