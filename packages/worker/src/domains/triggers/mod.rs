pub mod dispatch;
pub mod matcher;
pub mod models;
pub mod registry;
pub mod schedule;
pub mod template;
pub mod tick;

pub use matcher::{match_trigger, materialize_scheduled};
pub use models::{
    TriggerDefinition, TriggerMode, TriggeredAction, TriggeredRequest, TRIGGERED_ACTION_TYPE,
};
pub use registry::TriggerRegistry;
pub use schedule::{next_execution, IsoDuration};
pub use template::ArgumentTemplate;
