//! Registry access.
//!
//! The registry is a JSON index of packages plus a tree of package sources.
//! [`RegistryClient`] reads both, from the network or from a local checkout,
//! and also downloads and unpacks prebuilt archives.

mod client;
mod extract;
mod types;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use client::{RegistryClient, SourceEntry, url_to_filename};
pub use extract::{extract_archive, extract_archive_blocking};
pub use types::{
  ArchiveFormat, DependencySpec, DownloadEntry, DownloadSpec, RegistryEntry, RegistryIndex, RegistryPackages,
  RegistrySection, Requires, SecretSpec,
};

/// Errors that can occur while talking to the registry or unpacking payloads.
#[derive(Debug, Error)]
pub enum RegistryError {
  /// HTTP request failed or returned a non-success status.
  #[error("fetch failed for {url}: {message}")]
  FetchFailed { url: String, message: String },

  /// A registry document could not be parsed.
  #[error("failed to parse {what}: {source}")]
  Parse {
    what: String,
    #[source]
    source: serde_json::Error,
  },

  /// A registry-relative path tried to escape the registry root.
  #[error("invalid registry path '{0}'")]
  InvalidPath(String),

  /// Archive extraction failed.
  #[error("failed to extract {path}: {message}")]
  Extract { path: PathBuf, message: String },

  #[error("io error: {0}")]
  Io(#[from] io::Error),
}
