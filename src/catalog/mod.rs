pub mod record;
pub mod snapshot;
pub mod store;

pub use record::{Capabilities, ModelRecord, Provider, TriState};
pub use snapshot::Snapshot;
pub use store::CatalogStore;
