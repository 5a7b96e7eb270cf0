pub mod compatibility;
pub mod periodic;
pub mod traffic_light_controller;
