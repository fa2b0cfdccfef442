// Kernel: collaborator traits, dependency container and the worker handle

pub mod deps;
pub mod error;
pub mod in_memory;
pub mod plugins;
pub mod registry;
pub mod schema;
pub mod traits;
pub mod worker;

pub use deps::WorkerDeps;
pub use error::{SerializedError, WorkerError};
pub use plugins::{Plugin, PluginRegistry};
pub use schema::SchemaFilter;
pub use traits::{
    BaseFormulaEvaluator, BaseQueue, BaseStore, BaseSubscriptionEvaluator,
    BaseTransformerEvaluator, QueryOptions,
};
pub use worker::{ReactionStage, ReactionStats, ReactionStatsSnapshot, Worker};
