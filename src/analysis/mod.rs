//! Reports and read models built over the engine and the store.

pub mod dashboard;
pub mod snapshot;
pub mod summary;
