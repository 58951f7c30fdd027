//! Error types for the sanitizer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid key: {0}")]
  InvalidKey(String),

  #[error("base64 error: {0}")]
  Base64(#[from] base64::DecodeError),

  #[error("encryption failed")]
  Seal,

  #[error("decryption failed")]
  Open,

  #[error("decrypted content is not UTF-8")]
  NotUtf8,

  #[error("encryption is enabled but no public key is configured")]
  MissingPublicKey,

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
