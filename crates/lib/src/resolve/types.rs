//! Resolution result types.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::package::{PackageId, PackageIdError, PackageKind};
use crate::registry::{DownloadSpec, RegistryError, Requires};

#[derive(Debug, Error)]
pub enum ResolveError {
  /// No registry entry matches the identifier.
  #[error("package not found: {0}")]
  NotFound(PackageId),

  #[error(transparent)]
  InvalidIdentifier(#[from] PackageIdError),

  #[error(transparent)]
  Registry(#[from] RegistryError),
}

/// Third-party package index an ecosystem package comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
  Npm,
  Pip,
}

impl fmt::Display for Ecosystem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Ecosystem::Npm => write!(f, "npm"),
      Ecosystem::Pip => write!(f, "pip"),
    }
  }
}

/// What the installer needs to know to materialize a package.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InstallDetails {
  /// Installed through npm or pip.
  Ecosystem {
    ecosystem: Ecosystem,
    package: String,
    version: String,
  },
  /// Prebuilt archive per platform tag.
  Binary { downloads: BTreeMap<String, DownloadSpec> },
  /// Already provided by the host; only shims are published for `commands`.
  System { commands: Vec<String> },
  /// Registry-relative source path (a directory for stacks, a file for prompts).
  Source { path: String },
  /// No install mechanism applies.
  None,
}

/// A package identifier enriched with registry metadata and its direct dependencies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPackage {
  pub id: PackageId,
  pub name: String,
  pub version: String,
  pub install_path: PathBuf,
  pub description: Option<String>,
  pub installed: bool,
  /// Direct dependencies. Always empty on a dependency itself.
  pub dependencies: Vec<ResolvedPackage>,
  pub requires: Requires,
  pub install_details: InstallDetails,
  pub bins: Vec<String>,
  /// Version constraint on the edge this package was reached through.
  pub constraint: Option<String>,
  pub post_install: Option<String>,
  pub runtime: Option<String>,
  pub entry: Option<String>,
}

impl ResolvedPackage {
  pub fn kind(&self) -> PackageKind {
    self.id.kind
  }

  /// Executable names a shim should exist for, falling back to the short name.
  pub fn bins_or_name(&self) -> Vec<String> {
    if self.bins.is_empty() {
      vec![short_name(&self.id.name)]
    } else {
      self.bins.clone()
    }
  }
}

/// The last path segment of a possibly scoped package name.
pub fn short_name(name: &str) -> String {
  name.rsplit('/').next().unwrap_or(name).to_string()
}

/// Installed/missing summary of a resolved dependency tree.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyReport {
  pub satisfied: bool,
  pub missing: Vec<PackageId>,
}
