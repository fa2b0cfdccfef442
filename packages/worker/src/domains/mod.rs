// Orchestration domains
pub mod actions;
pub mod commit;
pub mod transformers;
pub mod triggers;
