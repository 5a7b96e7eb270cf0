// simulation_engine/mod.rs
pub mod grid;
pub mod intersections;
pub mod lanes;
pub mod movement;
pub mod stepper;
pub mod topology;
pub mod traffic_generator;
pub mod vehicles;
pub mod world;
