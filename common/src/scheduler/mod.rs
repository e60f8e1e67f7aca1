// Scheduler module: the live-reconfigurable daily reminder timer

pub mod engine;

pub use engine::{EngineConfig, ReminderScheduler};
