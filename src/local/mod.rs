// Offline command generation for degraded mode

pub mod heuristic;

pub use heuristic::fallback_command;
