// Contract Worker - Orchestration Core
//
// Mediates every write to the contract store, reacts to writes by firing
// declarative triggers, schedules recurring triggers, selects the latest
// transformers, and drives action requests from the queue to a posted
// result.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
pub use kernel::{Worker, WorkerDeps, WorkerError};
