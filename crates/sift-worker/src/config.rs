//! Worker configuration, deserialised from `config.toml` and `SIFT_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::Duration;
use chrono_tz::Tz;
use serde::Deserialize;
use sift_core::{buffer::DEFAULT_CAPACITY, policy::RetentionWindow};
use sift_extract::{Pipeline, Registry, timestamp::parse_time_zone};
use sift_sanitize::{
  Sanitizer,
  crypto::{SealingKey, SecretBox},
};
use tracing::warn;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime worker configuration. Every key is optional.
///
/// Nested keys use a double underscore in the environment, e.g.
/// `SIFT_RETENTION__NOT_BEFORE=2020-01-01T00:00:00Z`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  pub store_path:         PathBuf,
  /// Base64 X25519 public key used for sealed fields and sealed uploads.
  pub public_key:         Option<String>,
  /// Base64 key for `encrypt-file` / `decrypt-file`.
  pub symmetric_key:      Option<String>,
  pub encryption_enabled: bool,
  /// IANA zone for exports that record local wall-clock times.
  pub time_zone:          String,
  pub batch_capacity:     usize,
  pub workers:            usize,
  /// Replace each upload with a sealed copy once it has been handled.
  pub encrypt_uploads:    bool,
  /// Claims older than this are treated as crashed runs and skipped.
  pub claim_timeout_mins: i64,
  pub retention:          RetentionWindow,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      store_path:         PathBuf::from("sift.db"),
      public_key:         None,
      symmetric_key:      None,
      encryption_enabled: true,
      time_zone:          "UTC".into(),
      batch_capacity:     DEFAULT_CAPACITY,
      workers:            2,
      encrypt_uploads:    true,
      claim_timeout_mins: 360,
      retention:          RetentionWindow::default(),
    }
  }
}

impl WorkerConfig {
  /// Layer `path` (if it exists) and the environment over the defaults.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("SIFT")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .with_context(|| format!("failed to read config file {}", path.display()))?;

    settings
      .try_deserialize()
      .context("failed to deserialise WorkerConfig")
  }

  pub fn secret_box(&self) -> anyhow::Result<SecretBox> {
    let key = self
      .symmetric_key
      .as_deref()
      .context("symmetric_key is not configured")?;
    SecretBox::from_base64(key).context("invalid symmetric_key")
  }
}

// ─── Runtime ─────────────────────────────────────────────────────────────────

/// Everything an archive job needs, built once and shared by all jobs.
pub struct Runtime {
  pub registry:       Registry,
  pub sanitizer:      Sanitizer,
  pub retention:      RetentionWindow,
  pub time_zone:      Tz,
  pub batch_capacity: usize,
  /// Set when handled uploads should be sealed at rest.
  pub upload_key:     Option<SealingKey>,
  pub claim_timeout:  Duration,
}

impl Runtime {
  pub fn from_config(cfg: &WorkerConfig) -> anyhow::Result<Self> {
    let sanitizer = Sanitizer::from_config(cfg.public_key.as_deref(), cfg.encryption_enabled)
      .context("failed to build sanitizer")?;
    if !sanitizer.is_enabled() {
      warn!("field encryption is disabled; records will hold cleartext");
    }

    let upload_key = match (cfg.encrypt_uploads, cfg.public_key.as_deref()) {
      (true, Some(key)) => Some(SealingKey::from_base64(key).context("invalid public_key")?),
      (true, None) => {
        warn!("encrypt_uploads is set but no public_key is configured; uploads stay in the clear");
        None
      }
      (false, _) => None,
    };

    Ok(Self {
      registry: Registry::builtin(),
      sanitizer,
      retention: cfg.retention,
      time_zone: parse_time_zone(&cfg.time_zone)?,
      batch_capacity: cfg.batch_capacity.max(1),
      upload_key,
      claim_timeout: Duration::minutes(cfg.claim_timeout_mins.max(0)),
    })
  }

  pub fn pipeline(&self) -> Pipeline<'_> {
    Pipeline::new(&self.registry, &self.sanitizer)
      .with_policy(&self.retention)
      .with_time_zone(self.time_zone)
      .with_batch_capacity(self.batch_capacity)
  }
}
