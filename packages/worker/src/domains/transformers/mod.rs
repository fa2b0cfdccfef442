pub mod models;
pub mod registry;
pub mod selection;

pub use models::Transformer;
pub use registry::TransformerRegistry;
pub use selection::select_latest;
