// Library exports for the fleetmon server performance monitor

pub mod cli;
pub mod config;
pub mod error;
pub mod monitor;
