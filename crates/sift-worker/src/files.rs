//! At-rest protection for uploaded files.
//!
//! Handled uploads are replaced by a sealed box that only the private-key
//! holder can open. Operators can additionally encrypt any file with the
//! deployment's symmetric key. Each operation writes the transformed copy
//! next to the input and removes the input.

use std::{
  ffi::OsString,
  fs,
  path::{Path, PathBuf},
};

use anyhow::Context as _;
use sift_sanitize::crypto::{SealingKey, SecretBox, open_sealed};

/// Suffix appended to sealed uploads.
pub const SEALED_SUFFIX: &str = "encrypted";

/// Suffix appended to symmetrically encrypted files.
pub const SYMMETRIC_SUFFIX: &str = "secretbox";

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
  let mut name = OsString::from(path.as_os_str());
  name.push(".");
  name.push(suffix);
  PathBuf::from(name)
}

/// `path` without a trailing `.suffix`, or `path.decrypted` if it has none.
fn without_suffix(path: &Path, suffix: &str) -> PathBuf {
  match path.extension() {
    Some(ext) if ext == suffix => path.with_extension(""),
    _ => with_suffix(path, "decrypted"),
  }
}

fn replace(from: &Path, to: &Path, contents: &[u8]) -> anyhow::Result<()> {
  fs::write(to, contents).with_context(|| format!("writing {}", to.display()))?;
  fs::remove_file(from).with_context(|| format!("removing {}", from.display()))?;
  Ok(())
}

/// Seal the upload at `path` and return the sealed file's path.
pub fn seal_upload(key: &SealingKey, path: &Path) -> anyhow::Result<PathBuf> {
  let cleartext = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
  let sealed = key.seal(&cleartext)?;
  let target = with_suffix(path, SEALED_SUFFIX);
  replace(path, &target, sealed.as_bytes())?;
  Ok(target)
}

/// Reverse [`seal_upload`] with the base64 private key.
pub fn open_upload(private_key: &str, path: &Path) -> anyhow::Result<PathBuf> {
  let sealed = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
  let cleartext = open_sealed(private_key, &sealed).context("failed to open sealed upload")?;
  let target = without_suffix(path, SEALED_SUFFIX);
  replace(path, &target, &cleartext)?;
  Ok(target)
}

pub fn encrypt_file(secret: &SecretBox, path: &Path) -> anyhow::Result<PathBuf> {
  let cleartext = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
  let target = with_suffix(path, SYMMETRIC_SUFFIX);
  replace(path, &target, &secret.encrypt(&cleartext)?)?;
  Ok(target)
}

pub fn decrypt_file(secret: &SecretBox, path: &Path) -> anyhow::Result<PathBuf> {
  let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
  let cleartext = secret.decrypt(&data).context("wrong key or corrupted file")?;
  let target = without_suffix(path, SYMMETRIC_SUFFIX);
  replace(path, &target, &cleartext)?;
  Ok(target)
}
