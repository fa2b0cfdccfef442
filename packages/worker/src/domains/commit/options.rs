use chrono::{DateTime, Utc};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::ContractId;
use crate::domains::actions::models::LogContext;

/// Options threaded through one commit.
#[derive(Debug, Clone, TypedBuilder)]
pub struct CommitOptions {
    /// The commit's notion of "now": trigger start dates and templates are
    /// evaluated against it.
    #[builder(default = Utc::now())]
    pub timestamp: DateTime<Utc>,
    #[builder(default, setter(strip_option, into))]
    pub reason: Option<String>,
    pub actor: ContractId,
    /// Causal root of the commit. The inline change event is recorded under
    /// it.
    #[builder(default, setter(strip_option))]
    pub originator: Option<Uuid>,
    /// Record a create/update event on the contract's timeline.
    #[builder(default = false)]
    pub attach_events: bool,
    #[builder(default)]
    pub log_context: LogContext,
}
