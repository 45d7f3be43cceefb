//! Worker for the orchestration engine: configuration, service wiring, a
//! polling scheduler and the command-line interface.

pub mod cli;
pub mod config;
pub mod scheduler;
pub mod services;

pub use config::WorkerConfig;
pub use scheduler::{Scheduler, TickReport};
pub use services::Services;
