//! The per-install manifest.
//!
//! Every install directory carries a `manifest.json` describing what was
//! installed and how. The shim manager and the uninstaller read it back.
//!
//! ```json
//! {
//!   "id": "runtime:python",
//!   "kind": "runtime",
//!   "name": "python",
//!   "version": "3.12.1",
//!   "bins": ["python3"],
//!   "installType": "binary",
//!   "installedAt": "2025-01-01T00:00:00Z",
//!   "source": { "type": "download", "url": "https://..." },
//!   "binPaths": { "python3": "bin/python3" }
//! }
//! ```
//!
//! Stacks ship their own `manifest.json`; saving merges over it so the
//! stack's fields survive.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::consts::MANIFEST_FILENAME;
use crate::package::{PackageId, PackageKind};

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write manifest {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse manifest {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize manifest: {0}")]
  Serialize(#[source] serde_json::Error),
}

/// How a package ended up on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallType {
  Npm,
  Pip,
  Binary,
  System,
  Source,
  Prompt,
  None,
}

/// Where the payload came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InstallSource {
  Npm { package: String, version: String },
  Pip { package: String, version: String },
  Download { url: String },
  Registry { path: String },
  System,
  /// A degraded install: the payload could not be fetched.
  Failed {
    error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
  },
  None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledManifest {
  pub id: PackageId,
  pub kind: PackageKind,
  pub name: String,
  pub version: String,
  #[serde(default)]
  pub bins: Vec<String>,
  pub install_type: InstallType,
  pub installed_at: DateTime<Utc>,
  pub source: InstallSource,
  /// Executable locations, relative to the install directory or absolute
  /// for system packages.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub bin_paths: BTreeMap<String, PathBuf>,
}

impl InstalledManifest {
  pub fn new(id: PackageId, name: impl Into<String>, version: impl Into<String>, install_type: InstallType) -> Self {
    Self {
      kind: id.kind,
      id,
      name: name.into(),
      version: version.into(),
      bins: Vec::new(),
      install_type,
      installed_at: Utc::now(),
      source: InstallSource::None,
      bin_paths: BTreeMap::new(),
    }
  }

  pub fn with_source(mut self, source: InstallSource) -> Self {
    self.source = source;
    self
  }

  pub fn with_bins(mut self, bins: Vec<String>) -> Self {
    self.bins = bins;
    self
  }

  /// Whether this records a degraded install.
  pub fn is_placeholder(&self) -> bool {
    matches!(self.source, InstallSource::Failed { .. })
  }

  /// Load the manifest from an install directory.
  ///
  /// Returns `Ok(None)` if there is no manifest.
  pub fn load(dir: &Path) -> Result<Option<Self>, ManifestError> {
    let path = dir.join(MANIFEST_FILENAME);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => return Err(ManifestError::Read { path, source }),
    };

    serde_json::from_str(&content)
      .map(Some)
      .map_err(|source| ManifestError::Parse { path, source })
  }

  /// Write the manifest into `dir`, keeping unrelated fields of an existing one.
  pub fn save(&self, dir: &Path) -> Result<(), ManifestError> {
    let path = dir.join(MANIFEST_FILENAME);
    let write_err = |source| ManifestError::Write {
      path: path.clone(),
      source,
    };

    let mut doc = fs::read(&path)
      .ok()
      .and_then(|bytes| serde_json::from_slice::<Map<String, Value>>(&bytes).ok())
      .unwrap_or_default();
    if let Value::Object(ours) = serde_json::to_value(self).map_err(ManifestError::Serialize)? {
      doc.extend(ours);
    }

    let content = serde_json::to_string_pretty(&doc).map_err(ManifestError::Serialize)?;
    fs::create_dir_all(dir).map_err(write_err)?;
    fs::write(&path, content).map_err(write_err)?;
    Ok(())
  }
}
