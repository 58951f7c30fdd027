//! `sift`: operator CLI for the Sift import pipeline.
//!
//! Reads `config.toml` (or the path given with `--config`) plus `SIFT_*`
//! environment variables, opens the SQLite store, and runs one command.
//!
//! # Usage
//!
//! ```
//! sift keygen
//! sift seed-services
//! sift request create --subject p-0042 --email p@example.com --service facebook
//! sift upload --request <id> --service facebook ~/uploads/facebook.zip
//! sift process --workers 4
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value, json};
use sift_core::{
  archive::UploadedArchive,
  request::NewImportRequest,
  service::ServiceDefinition,
  store::{ImportLedger, RecordQuery, RecordStore},
};
use sift_extract::Registry;
use sift_sanitize::crypto::{SecretBox, generate_keypair, open_sealed_text};
use sift_store_sqlite::SqliteStore;
use sift_worker::{Runtime, WorkerConfig, files, jobs, merge};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Sift personal-data import worker")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml", global = true)]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Import every pending upload.
  Process {
    /// Leave handled uploads unsealed.
    #[arg(long)]
    skip_encryption: bool,

    /// Concurrent archive jobs; overrides `workers`.
    #[arg(long)]
    workers: Option<usize>,
  },

  /// Import one file for a subject without recording an upload.
  Import {
    #[arg(long)]
    service: String,
    #[arg(long)]
    subject: String,
    path:    PathBuf,
  },

  /// Insert or refresh the built-in service definitions.
  SeedServices,

  #[command(subcommand)]
  Request(RequestCommand),

  /// Register an uploaded file against an import request.
  Upload {
    #[arg(long)]
    request: Uuid,
    #[arg(long)]
    service: String,
    path:    PathBuf,
  },

  /// Fold the SOURCE import request into DESTINATION.
  MergeRequests { source: Uuid, destination: Uuid },

  /// Print a fresh sealing key pair and symmetric key.
  Keygen,

  /// Open a sealed field value.
  DecryptText {
    #[arg(long)]
    private_key: String,
    value:       String,
  },

  /// Open an upload sealed by `process`.
  OpenUpload {
    #[arg(long)]
    private_key: String,
    path:        PathBuf,
  },

  /// Encrypt a file with the configured symmetric key.
  EncryptFile { path: PathBuf },

  /// Decrypt a file produced by `encrypt-file`.
  DecryptFile { path: PathBuf },

  /// Print a subject's records with their event descriptions, one JSON
  /// object per line.
  Events {
    #[arg(long)]
    subject: String,
    #[arg(long)]
    limit:   Option<usize>,
  },
}

/// Import request management.
#[derive(Subcommand)]
enum RequestCommand {
  /// Create a request and print its id and upload token.
  Create {
    #[arg(long)]
    subject:  String,
    #[arg(long)]
    email:    String,
    /// Service id in scope; repeat for several.
    #[arg(long = "service")]
    services: Vec<String>,
    /// JSON object of extra fields.
    #[arg(long)]
    extras:   Option<String>,
  },

  /// Show a request's uploads and the services still missing.
  Status { id: Uuid },
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let mut cfg = WorkerConfig::load(&cli.config)?;
  cfg.store_path = expand_tilde(&cfg.store_path);

  match cli.command {
    Command::Process {
      skip_encryption,
      workers,
    } => {
      cfg.encrypt_uploads &= !skip_encryption;
      let store = Arc::new(open_store(&cfg)?);
      let runtime = Arc::new(Runtime::from_config(&cfg)?);
      let outcome = jobs::process_pending(store, runtime, workers.unwrap_or(cfg.workers)).await?;
      println!(
        "processed {} skipped {} abandoned {}",
        outcome.processed, outcome.skipped, outcome.abandoned
      );
    }

    Command::Import {
      service,
      subject,
      path,
    } => {
      let store = open_store(&cfg)?;
      let runtime = Runtime::from_config(&cfg)?;
      let summary = runtime
        .pipeline()
        .import_file(&store, &service, &subject, &path)
        .with_context(|| format!("failed to import {}", path.display()))?;
      println!(
        "imported {} records ({} excluded, {} flushes)",
        summary.records, summary.excluded, summary.flushes
      );
    }

    Command::SeedServices => {
      let store = open_store(&cfg)?;
      for service in ServiceDefinition::builtin() {
        store.upsert_service(&service)?;
      }
      for service in store.list_services()? {
        println!("{:>3}  {:<10} {}", service.priority, service.id, service.archive_extension.as_str());
      }
    }

    Command::Request(RequestCommand::Create {
      subject,
      email,
      services,
      extras,
    }) => {
      let registry = Registry::builtin();
      if let Some(unknown) = services.iter().find(|s| registry.get(s).is_none()) {
        bail!("unknown service {unknown:?}");
      }

      let mut input = NewImportRequest::new(subject, email);
      input.services.extend(services);
      if let Some(extras) = extras {
        input.extras = serde_json::from_str::<Map<String, Value>>(&extras)
          .context("--extras must be a JSON object")?;
      }

      let request = open_store(&cfg)?.create_request(input)?;
      println!("{}", request.request_id);
      println!("{}", request.token);
    }

    Command::Request(RequestCommand::Status { id }) => {
      let store = open_store(&cfg)?;
      let request = store
        .get_request(id)?
        .with_context(|| format!("import request {id} not found"))?;
      let archives = store.archives_for_request(id)?;

      for archive in &archives {
        println!(
          "{}  {:<10} {:<10} {}",
          archive.archive_id,
          archive.service_id,
          archive.state().as_str(),
          archive.path.display()
        );
      }
      let missing = request.incomplete_services(&archives);
      if missing.is_empty() {
        println!("complete");
      } else {
        println!("missing: {}", missing.join(", "));
      }
    }

    Command::Upload {
      request,
      service,
      path,
    } => {
      if Registry::builtin().get(&service).is_none() {
        bail!("unknown service {service:?}");
      }
      let path = path
        .canonicalize()
        .with_context(|| format!("cannot read upload {}", path.display()))?;

      let store = open_store(&cfg)?;
      store
        .get_request(request)?
        .with_context(|| format!("import request {request} not found"))?;
      let archive = UploadedArchive::new(request, service, path, Utc::now());
      store.add_archive(&archive)?;
      println!("{}", archive.archive_id);
    }

    Command::MergeRequests {
      source,
      destination,
    } => {
      let report = merge::merge_requests(&open_store(&cfg)?, source, destination)?;
      println!("moved {} uploads and {} records", report.archives, report.records);
    }

    Command::Keygen => {
      let (public, private) = generate_keypair();
      println!("public_key    = \"{public}\"");
      println!("symmetric_key = \"{}\"", SecretBox::generate_key());
      println!("# keep offline; never put this in the worker's config");
      println!("# private_key = \"{private}\"");
    }

    Command::DecryptText { private_key, value } => {
      println!("{}", open_sealed_text(&private_key, &value)?);
    }

    Command::OpenUpload { private_key, path } => {
      println!("{}", files::open_upload(&private_key, &path)?.display());
    }

    Command::EncryptFile { path } => {
      println!("{}", files::encrypt_file(&cfg.secret_box()?, &path)?.display());
    }

    Command::DecryptFile { path } => {
      println!("{}", files::decrypt_file(&cfg.secret_box()?, &path)?.display());
    }

    Command::Events { subject, limit } => {
      let store = open_store(&cfg)?;
      let registry = Registry::builtin();
      let query = RecordQuery {
        limit,
        ..RecordQuery::for_subject(subject)
      };

      for record in store.list_records(&query)? {
        let description = registry.describe_event(&record.generator_id, &record.properties);
        let line = json!({
          "record_id":    record.record_id,
          "generator_id": record.generator_id,
          "occurred_at":  record.occurred_at,
          "description":  description,
        });
        println!("{line}");
      }
    }
  }

  Ok(())
}

fn open_store(cfg: &WorkerConfig) -> anyhow::Result<SqliteStore> {
  SqliteStore::open(&cfg.store_path)
    .with_context(|| format!("failed to open store at {}", cfg.store_path.display()))
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
