//! In-memory repositories.
//!
//! Same contracts as the Postgres implementations, held behind a single lock.
//! Used by tests and by local runs without a database.

mod store;

pub use store::InMemoryStore;
