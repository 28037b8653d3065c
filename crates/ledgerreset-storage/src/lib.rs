//! ledgerreset-storage: store backends that execute reset deletes.
//!
//! Backends:
//! - [`memory`]: in-memory tables (tests, dry runs, no persistence)
//! - `sqlite`: SQLite via `sqlx` (feature `sqlite`)
//! - `postgres`: PostgreSQL via `sqlx` (feature `postgres`)

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
mod outcome;

pub use memory::InMemoryStore;
