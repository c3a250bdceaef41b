//! Installer errors, options and reports.

use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use super::manifest::{InstallType, ManifestError};
use crate::lock::LockfileError;
use crate::package::{PackageId, PackageKind};
use crate::registry::RegistryError;
use crate::resolve::{Ecosystem, InstallDetails, ResolveError, ResolvedPackage};
use crate::shim::{ShimCollision, ShimError};

#[derive(Debug, Error)]
pub enum InstallError {
  #[error(transparent)]
  Resolve(#[from] ResolveError),

  /// A dependency edge's version constraint is not met.
  #[error("{package} requires {dependency} {constraint}, found {found}")]
  DependencyUnsatisfied {
    package: PackageId,
    dependency: PackageId,
    constraint: String,
    found: String,
  },

  /// A source-tree package has no `manifest.json` in the registry.
  #[error("{package} has no manifest.json at registry path '{path}'")]
  ManifestMissing { package: PackageId, path: String },

  /// A prompt's markdown file is missing from the registry.
  #[error("{package} has no source file at registry path '{path}'")]
  SourceMissing { package: PackageId, path: String },

  #[error("{package} has no download for platform {platform}")]
  UnsupportedPlatform { package: PackageId, platform: String },

  #[error("executable '{bin}' of {package} not found")]
  ExecutableNotFound { package: PackageId, bin: String },

  #[error("command failed: {command} (exit code {code:?}): {stderr}")]
  CommandFailed {
    command: String,
    code: Option<i32>,
    stderr: String,
  },

  /// A package in an install plan failed; the batch was aborted.
  #[error("installing {package} failed")]
  PackageFailed {
    package: PackageId,
    #[source]
    source: Box<InstallError>,
  },

  #[error(transparent)]
  Registry(#[from] RegistryError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Shim(#[from] ShimError),

  #[error(transparent)]
  Lockfile(#[from] LockfileError),

  #[error("io error: {0}")]
  Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
  /// Reinstall the requested package and skip dependency constraint checks.
  pub force: bool,
  /// Let npm run install/postinstall scripts of installed packages.
  pub allow_scripts: bool,
}

/// The state machine a package is installed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallMechanism {
  Npm,
  Pip,
  Binary,
  System,
  SourceTree,
  Prompt,
  Placeholder,
}

impl InstallMechanism {
  pub fn for_package(package: &ResolvedPackage) -> Self {
    if package.kind() == PackageKind::Prompt {
      return Self::Prompt;
    }
    match &package.install_details {
      InstallDetails::Ecosystem {
        ecosystem: Ecosystem::Npm,
        ..
      } => Self::Npm,
      InstallDetails::Ecosystem {
        ecosystem: Ecosystem::Pip,
        ..
      } => Self::Pip,
      InstallDetails::Binary { .. } => Self::Binary,
      InstallDetails::System { .. } => Self::System,
      InstallDetails::Source { .. } => Self::SourceTree,
      InstallDetails::None => Self::Placeholder,
    }
  }

  /// Whether a failure leaves a placeholder manifest instead of aborting.
  ///
  /// Archive downloads are usually runtimes and tools other packages need;
  /// a flaky mirror should not take the whole plan down with it.
  pub fn degrade_on_failure(&self) -> bool {
    matches!(self, Self::Binary)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PackageOutcome {
  Installed,
  /// The payload could not be installed; a placeholder manifest records why.
  Degraded { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageResult {
  pub id: PackageId,
  pub version: String,
  pub mechanism: InstallMechanism,
  pub install_path: PathBuf,
  #[serde(flatten)]
  pub outcome: PackageOutcome,
  pub shims: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
  pub package: PackageId,
  pub already_installed: bool,
  pub results: Vec<PackageResult>,
  pub collisions: Vec<ShimCollision>,
  /// Non-fatal problems for the caller to display.
  pub warnings: Vec<String>,
}

impl InstallReport {
  pub fn already_installed(package: PackageId) -> Self {
    Self {
      package,
      already_installed: true,
      results: Vec::new(),
      collisions: Vec::new(),
      warnings: Vec::new(),
    }
  }

  pub fn degraded(&self) -> impl Iterator<Item = &PackageResult> {
    self
      .results
      .iter()
      .filter(|r| matches!(r.outcome, PackageOutcome::Degraded { .. }))
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct UninstallReport {
  pub package: PackageId,
  /// Whether an install directory or prompt file existed.
  pub removed: bool,
  pub shims_removed: Vec<String>,
  pub lock_removed: bool,
}

/// One entry of `list_installed`.
#[derive(Debug, Clone, Serialize)]
pub struct InstalledPackage {
  pub id: PackageId,
  pub version: Option<String>,
  pub install_type: Option<InstallType>,
  pub placeholder: bool,
  pub path: PathBuf,
}
