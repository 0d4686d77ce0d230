pub mod snapshot;

pub use snapshot::{PersistedCatalog, SnapshotFile};
