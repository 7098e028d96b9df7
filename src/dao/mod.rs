/// Database model definitions.
pub mod models;
/// Finished-game statistics persistence.
pub mod stats_store;
/// Storage abstraction layer for persistence operations.
pub mod storage;
