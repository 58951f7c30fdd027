//! SQLite backend for the Sift import pipeline.
//!
//! One [`rusqlite::Connection`] behind a mutex serves every caller; archive
//! jobs running on separate threads take turns writing their batches.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
