//! Storage adapters - snapshot persistence.

mod file_store;

pub use file_store::FileSnapshotStore;
