pub mod builtin;
pub mod context;
pub mod execution;
pub mod library;
pub mod models;

pub use builtin::core_plugin;
pub use context::ActionContext;
pub use execution::ExecutionStage;
pub use library::{ActionHandler, RegisteredAction};
pub use models::{
    ActionDefinition, ActionRequest, ActionRequestDraft, ActionResult, ExecutionEvent, LogContext,
};
