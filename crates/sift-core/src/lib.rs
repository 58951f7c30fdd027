//! Core types and trait definitions for the Sift import pipeline.
//!
//! This crate is deliberately free of archive, crypto, and database
//! dependencies. Every other crate depends on it: extractors build
//! [`record::NewRecord`]s, push them through a [`buffer::BatchBuffer`], and a
//! storage backend implements [`store::RecordStore`] and
//! [`store::ImportLedger`].

pub mod archive;
pub mod buffer;
pub mod engagement;
pub mod error;
pub mod policy;
pub mod record;
pub mod request;
pub mod service;
pub mod store;

pub use error::{Error, Result};
