//! Persistence layer: atomic file-backed state storage.

pub mod store;

pub use store::CheckpointStore;
