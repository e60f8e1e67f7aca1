// Common library shared by the scheduler daemon and integration tests

pub mod config;
pub mod db;
pub mod errors;
pub mod gateway;
pub mod message;
pub mod models;
pub mod schedule;
pub mod scheduler;
pub mod telemetry;
