//! Shim ownership registry (`shims.json`).
//!
//! ```json
//! {
//!   "rg": {
//!     "owner": "binary:rg",
//!     "type": "symlink",
//!     "target": "/home/me/.rudi/binaries/rg/bin/rg",
//!     "createdAt": "2025-01-01T00:00:00Z"
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ShimError;
use crate::package::PackageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShimType {
  Symlink,
  Wrapper,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShimEntry {
  pub owner: PackageId,
  #[serde(rename = "type")]
  pub shim_type: ShimType,
  pub target: PathBuf,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ShimRegistry {
  path: PathBuf,
  entries: BTreeMap<String, ShimEntry>,
}

impl ShimRegistry {
  /// Load the registry; a missing file is an empty registry.
  pub fn load(path: &Path) -> Result<Self, ShimError> {
    let entries = match fs::read_to_string(path) {
      Ok(content) => serde_json::from_str(&content).map_err(|source| ShimError::Registry {
        path: path.to_path_buf(),
        source,
      })?,
      Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
      Err(source) => {
        return Err(ShimError::Io {
          path: path.to_path_buf(),
          source,
        });
      }
    };

    Ok(Self {
      path: path.to_path_buf(),
      entries,
    })
  }

  /// Write the registry through a temp file and rename.
  pub fn save(&self) -> Result<(), ShimError> {
    let io_err = |source| ShimError::Io {
      path: self.path.clone(),
      source,
    };
    let dir = self.path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(io_err)?;

    let content = serde_json::to_vec_pretty(&self.entries).map_err(|source| ShimError::Registry {
      path: self.path.clone(),
      source,
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(&content).map_err(io_err)?;
    tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
    Ok(())
  }

  pub fn get(&self, bin: &str) -> Option<&ShimEntry> {
    self.entries.get(bin)
  }

  pub fn entries(&self) -> &BTreeMap<String, ShimEntry> {
    &self.entries
  }

  /// Record `entry` as the owner of `bin`.
  ///
  /// Returns the displaced owner when a different package held the name.
  pub fn register(&mut self, bin: &str, entry: ShimEntry) -> Option<PackageId> {
    let owner = entry.owner.clone();
    self
      .entries
      .insert(bin.to_string(), entry)
      .map(|previous| previous.owner)
      .filter(|previous| *previous != owner)
  }

  pub fn unregister(&mut self, bin: &str) -> Option<ShimEntry> {
    self.entries.remove(bin)
  }
}
