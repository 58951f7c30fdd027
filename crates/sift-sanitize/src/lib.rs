//! Field sanitization for Sift.
//!
//! Removes sensitive cleartext from decoded export payloads and replaces it
//! with derived fields:
//!
//! - `pdk_encrypted_<field>`: a sealed box only the research team's private
//!   key can open;
//! - `pdk_hashed_<field>`: a deployment-salted SHA-512 digest, stable within
//!   one deployment so equal values can still be grouped;
//! - annotations such as `pdk_length_<field>` and `pdk_word_count_<field>`.
//!
//! Pure synchronous code; no archive or database dependencies.

pub mod annotate;
pub mod crypto;
pub mod error;
pub mod rules;
mod sanitizer;

pub use error::{Error, Result};
pub use rules::{Action, FieldRule};
pub use sanitizer::Sanitizer;
