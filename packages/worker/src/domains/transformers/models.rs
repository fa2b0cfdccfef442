use serde::{Deserialize, Serialize};

use crate::common::{Contract, ContractId};
use crate::kernel::registry::Keyed;

/// A versioned transformer contract, reduced to what selection needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transformer {
    pub id: ContractId,
    pub slug: String,
    pub version: String,
}

impl Transformer {
    pub fn new(id: ContractId, slug: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id,
            slug: slug.into(),
            version: version.into(),
        }
    }

    pub fn versioned_slug(&self) -> String {
        format!("{}@{}", self.slug, self.version)
    }
}

impl From<&Contract> for Transformer {
    fn from(contract: &Contract) -> Self {
        Self::new(contract.id, contract.slug.clone(), contract.version.clone())
    }
}

impl Keyed for Transformer {
    fn key(&self) -> ContractId {
        self.id
    }
}
