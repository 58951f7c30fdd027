//! Cryptographic primitives.
//!
//! Sealed boxes are libsodium-compatible (`crypto_box_seal`): an ephemeral
//! X25519 key is generated per message, so anyone with the public key can
//! encrypt but only the private-key holder can decrypt. The pipeline itself
//! only ever holds the public key.

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use crypto_box::{PublicKey, SecretKey};
use crypto_secretbox::{
  Nonce, XSalsa20Poly1305,
  aead::{Aead, AeadCore, KeyInit},
};
use rand_core::OsRng;
use sha2::{Digest, Sha512};

use crate::{Error, Result};

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 24;

fn decode_key(encoded: &str) -> Result<[u8; KEY_SIZE]> {
  let bytes = B64.decode(encoded.trim())?;
  <[u8; KEY_SIZE]>::try_from(bytes.as_slice()).map_err(|_| {
    Error::InvalidKey(format!("expected {KEY_SIZE} bytes, got {}", bytes.len()))
  })
}

// ─── Sealed boxes ────────────────────────────────────────────────────────────

/// The deployment's public key together with its base64 text form, which
/// doubles as the hashing salt.
#[derive(Clone)]
pub struct SealingKey {
  public_key: PublicKey,
  encoded:    String,
}

impl SealingKey {
  /// Parse a base64-encoded X25519 public key.
  pub fn from_base64(encoded: &str) -> Result<Self> {
    let public_key = PublicKey::from(decode_key(encoded)?);
    Ok(Self {
      public_key,
      encoded: encoded.trim().to_owned(),
    })
  }

  /// Seal `cleartext` and return the base64 ciphertext.
  pub fn seal(&self, cleartext: &[u8]) -> Result<String> {
    let sealed = self
      .public_key
      .seal(&mut OsRng, cleartext)
      .map_err(|_| Error::Seal)?;
    Ok(B64.encode(sealed))
  }

  /// Salted one-way digest of `cleartext`, hex encoded.
  pub fn hash(&self, cleartext: &str) -> String {
    hash_content(&self.encoded, cleartext)
  }

  pub fn as_base64(&self) -> &str { &self.encoded }
}

impl std::fmt::Debug for SealingKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SealingKey").field("encoded", &self.encoded).finish()
  }
}

/// SHA-512 over `salt || cleartext`, hex encoded.
pub fn hash_content(salt: &str, cleartext: &str) -> String {
  let mut hasher = Sha512::new();
  hasher.update(salt.as_bytes());
  hasher.update(cleartext.as_bytes());
  hex::encode(hasher.finalize())
}

/// Open a base64 sealed box with the matching base64 private key.
///
/// Only operator tooling calls this; the import pipeline never has the
/// private key.
pub fn open_sealed(private_key: &str, sealed: &str) -> Result<Vec<u8>> {
  let secret = SecretKey::from(decode_key(private_key)?);
  let ciphertext = B64.decode(sealed.trim())?;
  secret.unseal(&ciphertext).map_err(|_| Error::Open)
}

/// Like [`open_sealed`], decoding the cleartext as UTF-8.
pub fn open_sealed_text(private_key: &str, sealed: &str) -> Result<String> {
  String::from_utf8(open_sealed(private_key, sealed)?).map_err(|_| Error::NotUtf8)
}

/// A fresh `(public, private)` key pair, both base64 encoded.
pub fn generate_keypair() -> (String, String) {
  let secret = SecretKey::generate(&mut OsRng);
  let public = secret.public_key();
  (B64.encode(public.as_bytes()), B64.encode(secret.to_bytes()))
}

// ─── Secret boxes ────────────────────────────────────────────────────────────

/// Symmetric XSalsa20-Poly1305 box. Output is `nonce || ciphertext`.
pub struct SecretBox {
  cipher: XSalsa20Poly1305,
}

impl SecretBox {
  pub fn from_base64(encoded: &str) -> Result<Self> {
    let key = decode_key(encoded)?;
    let cipher = XSalsa20Poly1305::new_from_slice(&key)
      .map_err(|e| Error::InvalidKey(e.to_string()))?;
    Ok(Self { cipher })
  }

  /// A fresh random key, base64 encoded.
  pub fn generate_key() -> String {
    let key = XSalsa20Poly1305::generate_key(&mut crypto_secretbox::aead::OsRng);
    B64.encode(key)
  }

  pub fn encrypt(&self, cleartext: &[u8]) -> Result<Vec<u8>> {
    let nonce = XSalsa20Poly1305::generate_nonce(&mut crypto_secretbox::aead::OsRng);
    let ciphertext = self
      .cipher
      .encrypt(&nonce, cleartext)
      .map_err(|_| Error::Seal)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
  }

  pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < NONCE_SIZE {
      return Err(Error::Open);
    }
    let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
    self
      .cipher
      .decrypt(Nonce::from_slice(nonce), ciphertext)
      .map_err(|_| Error::Open)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sealed_boxes_open_with_the_private_key() {
    let (public, private) = generate_keypair();
    let key = SealingKey::from_base64(&public).unwrap();

    let sealed = key.seal("Hello World".as_bytes()).unwrap();
    assert_ne!(sealed, "Hello World");
    assert_eq!(open_sealed_text(&private, &sealed).unwrap(), "Hello World");
  }

  #[test]
  fn sealing_is_randomised() {
    let (public, _) = generate_keypair();
    let key = SealingKey::from_base64(&public).unwrap();
    assert_ne!(key.seal(b"same").unwrap(), key.seal(b"same").unwrap());
  }

  #[test]
  fn wrong_private_key_cannot_open() {
    let (public, _) = generate_keypair();
    let (_, other_private) = generate_keypair();
    let sealed = SealingKey::from_base64(&public).unwrap().seal(b"x").unwrap();
    assert!(matches!(open_sealed(&other_private, &sealed), Err(Error::Open)));
  }

  #[test]
  fn hashes_are_deterministic_per_salt() {
    let (public_a, _) = generate_keypair();
    let (public_b, _) = generate_keypair();
    let a = SealingKey::from_base64(&public_a).unwrap();
    let b = SealingKey::from_base64(&public_b).unwrap();

    assert_eq!(a.hash("alice"), a.hash("alice"));
    assert_ne!(a.hash("alice"), a.hash("bob"));
    assert_ne!(a.hash("alice"), b.hash("alice"));
    assert_eq!(a.hash("alice").len(), 128);
  }

  #[test]
  fn hash_matches_reference_digest() {
    // sha512("salt" + "value")
    let expected = {
      let mut h = Sha512::new();
      h.update(b"saltvalue");
      hex::encode(h.finalize())
    };
    assert_eq!(hash_content("salt", "value"), expected);
  }

  #[test]
  fn rejects_short_keys() {
    let short = B64.encode([1u8; 16]);
    assert!(matches!(SealingKey::from_base64(&short), Err(Error::InvalidKey(_))));
    assert!(SealingKey::from_base64("not base64!").is_err());
  }

  #[test]
  fn secret_box_round_trip() {
    let key = SecretBox::generate_key();
    let sbox = SecretBox::from_base64(&key).unwrap();

    let data = sbox.encrypt(b"archive bytes").unwrap();
    assert_eq!(sbox.decrypt(&data).unwrap(), b"archive bytes");

    let other = SecretBox::from_base64(&SecretBox::generate_key()).unwrap();
    assert!(other.decrypt(&data).is_err());
    assert!(sbox.decrypt(&data[..10]).is_err());
  }
}
