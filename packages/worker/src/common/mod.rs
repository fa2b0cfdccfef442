// Common types shared by the kernel and every domain

pub mod contract;
pub mod id;
pub mod patch;
pub mod session;
pub mod versioned;

pub use contract::{strip_volatile, Contract, ContractDraft, ContractId, TYPE_SLUG, VOLATILE_FIELDS};
pub use id::Id;
pub use patch::{apply_patch, PatchOp};
pub use session::Session;
pub use versioned::VersionedSlug;

/// Marker type for action request ids.
pub struct Request;

pub type RequestId = Id<Request>;
