//! Operator tooling for the Sift import pipeline.
//!
//! The `sift` binary is a thin clap front end over these modules: it loads
//! a [`WorkerConfig`], opens the SQLite store and runs one command.

pub mod config;
pub mod files;
pub mod jobs;
pub mod merge;

pub use config::{Runtime, WorkerConfig};
