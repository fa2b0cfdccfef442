use serde::{Deserialize, Serialize};

use super::contract::ContractId;

/// An authenticated store session: every store call is scoped to one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    /// The user contract acting through this session.
    pub actor: ContractId,
}

impl Session {
    pub fn new(token: impl Into<String>, actor: ContractId) -> Self {
        Self {
            token: token.into(),
            actor,
        }
    }
}
