pub mod markers;
pub mod mediated;
pub mod options;
pub mod pipeline;
pub mod reactions;
pub mod type_triggers;

pub use markers::same_markers;
pub use options::CommitOptions;
