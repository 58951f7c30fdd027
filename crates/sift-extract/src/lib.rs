//! Archive extraction for Sift.
//!
//! Turns one uploaded export (a zip, or a bare CSV for Amazon) into
//! sanitized [`sift_core::record::NewRecord`]s. The [`registry::Registry`]
//! maps service ids to [`extractors::Extractor`]s; the [`pipeline::Pipeline`]
//! drives an uploaded archive through its lifecycle.
//!
//! All I/O here is blocking. Callers that live on an async runtime should
//! run imports on a blocking thread.

pub mod archive;
pub mod context;
pub mod error;
pub mod extractors;
pub mod fields;
pub mod pipeline;
pub mod registry;
pub mod timestamp;

#[cfg(test)]
mod testing;

pub use context::{ImportContext, ImportSummary};
pub use error::{Error, Result};
pub use extractors::{Direction, EventDescription, Extractor};
pub use pipeline::{Attempt, Pipeline};
pub use registry::Registry;
