//! Lock records.
//!
//! After a successful install, rudi writes one record for the requested package
//! to `<home>/locks/<kind>s/<name>.lock.yaml`:
//!
//! ```yaml
//! id: stack:notes
//! version: 0.2.0
//! name: notes
//! installedAt: 2025-01-01T00:00:00Z
//! checksum: 3f2a9c0d1b4e5f67
//! dependencies:
//!   - id: runtime:node
//!     version: 20.11.0
//!     checksum: 9a8b7c6d5e4f3a2b
//! ```
//!
//! The checksum covers `{id, version, name}` only. It detects identity drift,
//! not payload tampering.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RudiConfig;
use crate::consts::LOCK_EXTENSION;
use crate::install::manifest::InstalledManifest;
use crate::package::{PackageId, PackageKind};
use crate::resolve::{ResolvedPackage, is_installed_id};
use crate::util::hash::{Checksum, Checksummed};

#[derive(Debug, Error)]
pub enum LockfileError {
  #[error("failed to read lock record {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write lock record {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse lock record {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("failed to serialize lock record: {0}")]
  Serialize(#[source] serde_yaml::Error),

  #[error("failed to compute checksum: {0}")]
  Checksum(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
  pub id: PackageId,
  pub version: String,
  pub name: String,
  pub installed_at: DateTime<Utc>,
  pub checksum: Checksum,
  #[serde(default)]
  pub dependencies: Vec<LockedDependency>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockedDependency {
  pub id: PackageId,
  pub version: String,
  pub checksum: Checksum,
}

/// The fields a checksum is computed over.
#[derive(Serialize)]
struct Identity<'a> {
  id: &'a PackageId,
  version: &'a str,
  name: &'a str,
}

impl Checksummed for Identity<'_> {}

pub fn identity_checksum(id: &PackageId, version: &str, name: &str) -> Result<Checksum, LockfileError> {
  Identity { id, version, name }.checksum().map_err(LockfileError::Checksum)
}

#[derive(Debug, Clone, Serialize)]
pub struct LockVerification {
  pub valid: bool,
  pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
  pub removed: Vec<PathBuf>,
  pub kept: usize,
}

/// Write the lock record for a resolved top-level package.
pub fn write_lockfile(config: &RudiConfig, resolved: &ResolvedPackage) -> Result<LockRecord, LockfileError> {
  let dependencies = resolved
    .dependencies
    .iter()
    .map(|dep| {
      let version = installed_version(config, dep);
      Ok(LockedDependency {
        id: dep.id.clone(),
        checksum: identity_checksum(&dep.id, &version, &dep.name)?,
        version,
      })
    })
    .collect::<Result<Vec<_>, LockfileError>>()?;

  let version = installed_version(config, resolved);
  let record = LockRecord {
    id: resolved.id.clone(),
    checksum: identity_checksum(&resolved.id, &version, &resolved.name)?,
    version,
    name: resolved.name.clone(),
    installed_at: Utc::now(),
    dependencies,
  };

  let path = config.lock_path(&resolved.id);
  let write_err = |source| LockfileError::Write {
    path: path.clone(),
    source,
  };
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(write_err)?;
  }
  let content = serde_yaml::to_string(&record).map_err(LockfileError::Serialize)?;
  fs::write(&path, content).map_err(write_err)?;

  debug!(package = %record.id, path = %path.display(), "wrote lock record");
  Ok(record)
}

/// The version the install manifest recorded, else the resolved one.
///
/// npm reports the version it actually installed, which replaces `latest`.
fn installed_version(config: &RudiConfig, package: &ResolvedPackage) -> String {
  match InstalledManifest::load(&config.install_path(&package.id)) {
    Ok(Some(manifest)) => manifest.version,
    _ => package.version.clone(),
  }
}

/// Read a lock record. Returns `Ok(None)` if there is none.
pub fn read_lockfile(config: &RudiConfig, id: &PackageId) -> Result<Option<LockRecord>, LockfileError> {
  read_record(&config.lock_path(id))
}

pub fn has_lockfile(config: &RudiConfig, id: &PackageId) -> bool {
  config.lock_path(id).is_file()
}

/// Delete a lock record, returning whether one existed.
pub fn delete_lockfile(config: &RudiConfig, id: &PackageId) -> Result<bool, LockfileError> {
  let path = config.lock_path(id);
  match fs::remove_file(&path) {
    Ok(()) => Ok(true),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
    Err(source) => Err(LockfileError::Write { path, source }),
  }
}

/// Check a lock record against what is installed, collecting every problem.
pub fn verify_lockfile(config: &RudiConfig, id: &PackageId) -> Result<LockVerification, LockfileError> {
  let mut errors = Vec::new();

  let Some(record) = read_lockfile(config, id)? else {
    return Ok(LockVerification {
      valid: false,
      errors: vec![format!("no lock record for {}", id)],
    });
  };

  if identity_checksum(&record.id, &record.version, &record.name)? != record.checksum {
    errors.push(format!("checksum mismatch for {}", record.id));
  }

  if !is_installed_id(config, &record.id) {
    errors.push(format!("{} is not installed", record.id));
  } else if let Ok(Some(manifest)) = InstalledManifest::load(&config.install_path(&record.id))
    && manifest.version != record.version
  {
    errors.push(format!(
      "{} is installed at {} but locked at {}",
      record.id, manifest.version, record.version
    ));
  }

  for dep in &record.dependencies {
    if !is_installed_id(config, &dep.id) {
      errors.push(format!("dependency {} is not installed", dep.id));
    }
  }

  Ok(LockVerification {
    valid: errors.is_empty(),
    errors,
  })
}

/// Delete lock records that are unparsable or whose package is gone.
pub fn clean_orphaned_lockfiles(config: &RudiConfig) -> Result<CleanReport, LockfileError> {
  let mut report = CleanReport::default();

  for kind in PackageKind::STORED {
    let dir = config.locks_dir().join(kind.plural());
    let entries = match fs::read_dir(&dir) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
      Err(source) => return Err(LockfileError::Read { path: dir, source }),
    };

    for entry in entries {
      let path = entry
        .map_err(|source| LockfileError::Read {
          path: dir.clone(),
          source,
        })?
        .path();
      if !is_lock_file(&path) {
        continue;
      }

      let orphaned = match read_record(&path) {
        Ok(Some(record)) => !is_installed_id(config, &record.id),
        Ok(None) => false,
        Err(e) => {
          warn!(path = %path.display(), error = %e, "removing corrupt lock record");
          true
        }
      };

      if orphaned {
        fs::remove_file(&path).map_err(|source| LockfileError::Write {
          path: path.clone(),
          source,
        })?;
        info!(path = %path.display(), "removed orphaned lock record");
        report.removed.push(path);
      } else {
        report.kept += 1;
      }
    }
  }

  Ok(report)
}

fn is_lock_file(path: &Path) -> bool {
  path
    .file_name()
    .and_then(|n| n.to_str())
    .is_some_and(|n| n.ends_with(&format!(".{}", LOCK_EXTENSION)))
}

fn read_record(path: &Path) -> Result<Option<LockRecord>, LockfileError> {
  let content = match fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(source) => {
      return Err(LockfileError::Read {
        path: path.to_path_buf(),
        source,
      });
    }
  };

  serde_yaml::from_str(&content)
    .map(Some)
    .map_err(|source| LockfileError::Parse {
      path: path.to_path_buf(),
      source,
    })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resolve::InstallDetails;
  use tempfile::TempDir;

  fn package(config: &RudiConfig, id: &str, version: &str, dependencies: Vec<ResolvedPackage>) -> ResolvedPackage {
    let id = PackageId::parse(id).unwrap();
    ResolvedPackage {
      name: id.name.clone(),
      version: version.to_string(),
      install_path: config.install_path(&id),
      description: None,
      installed: true,
      dependencies,
      requires: Default::default(),
      install_details: InstallDetails::None,
      bins: Vec::new(),
      constraint: None,
      post_install: None,
      runtime: None,
      entry: None,
      id,
    }
  }

  fn install_dirs(resolved: &ResolvedPackage) {
    fs::create_dir_all(&resolved.install_path).unwrap();
    for dep in &resolved.dependencies {
      fs::create_dir_all(&dep.install_path).unwrap();
    }
  }

  fn notes(config: &RudiConfig) -> ResolvedPackage {
    package(
      config,
      "stack:notes",
      "0.2.0",
      vec![
        package(config, "runtime:node", "20.11.0", vec![]),
        package(config, "binary:rg", "14.1.0", vec![]),
      ],
    )
  }

  #[test]
  fn write_then_read() {
    let temp = TempDir::new().unwrap();
    let config = RudiConfig::with_home(temp.path());
    let resolved = notes(&config);

    let written = write_lockfile(&config, &resolved).unwrap();
    assert!(has_lockfile(&config, &resolved.id));
    assert!(config.lock_path(&resolved.id).ends_with("locks/stacks/notes.lock.yaml"));

    let read = read_lockfile(&config, &resolved.id).unwrap().unwrap();
    assert_eq!(read, written);
    assert_eq!(read.checksum.0.len(), crate::consts::CHECKSUM_LEN);
    assert_eq!(read.dependencies.len(), 2);
    assert_eq!(read.dependencies[0].id.to_string(), "runtime:node");

    let raw = fs::read_to_string(config.lock_path(&resolved.id)).unwrap();
    assert!(raw.contains("installedAt:"));
    assert!(raw.contains("stack:notes"));
  }

  #[test]
  fn checksum_depends_on_identity_only() {
    let id = PackageId::new(PackageKind::Runtime, "python");
    let a = identity_checksum(&id, "3.12.1", "python").unwrap();
    assert_eq!(a, identity_checksum(&id, "3.12.1", "python").unwrap());
    assert_ne!(a, identity_checksum(&id, "3.12.2", "python").unwrap());
  }

  mod verify {
    use super::*;
    use crate::install::InstallType;

    #[test]
    fn locks_the_version_the_manifest_recorded() {
      let temp = TempDir::new().unwrap();
      let config = RudiConfig::with_home(temp.path());
      let resolved = package(&config, "pkg:cowsay", "latest", vec![]);
      install_dirs(&resolved);
      InstalledManifest::new(resolved.id.clone(), "cowsay", "1.6.0", InstallType::Npm)
        .save(&resolved.install_path)
        .unwrap();

      let record = write_lockfile(&config, &resolved).unwrap();
      assert_eq!(record.version, "1.6.0");
      assert_eq!(record.checksum, identity_checksum(&resolved.id, "1.6.0", "cowsay").unwrap());

      let result = verify_lockfile(&config, &resolved.id).unwrap();
      assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn round_trip_is_valid() {
      let temp = TempDir::new().unwrap();
      let config = RudiConfig::with_home(temp.path());
      let resolved = notes(&config);
      install_dirs(&resolved);

      write_lockfile(&config, &resolved).unwrap();
      let result = verify_lockfile(&config, &resolved.id).unwrap();

      assert!(result.valid, "{:?}", result.errors);
      assert!(result.errors.is_empty());
    }

    #[test]
    fn one_missing_dependency_is_one_error() {
      let temp = TempDir::new().unwrap();
      let config = RudiConfig::with_home(temp.path());
      let resolved = notes(&config);
      install_dirs(&resolved);
      write_lockfile(&config, &resolved).unwrap();

      fs::remove_dir_all(&resolved.dependencies[1].install_path).unwrap();
      let result = verify_lockfile(&config, &resolved.id).unwrap();

      assert!(!result.valid);
      assert_eq!(result.errors.len(), 1);
      assert!(result.errors[0].contains("binary:rg"));
    }

    #[test]
    fn errors_accumulate() {
      let temp = TempDir::new().unwrap();
      let config = RudiConfig::with_home(temp.path());
      let resolved = notes(&config);
      write_lockfile(&config, &resolved).unwrap();

      let result = verify_lockfile(&config, &resolved.id).unwrap();
      assert_eq!(result.errors.len(), 3, "{:?}", result.errors);
    }

    #[test]
    fn missing_record_is_invalid() {
      let temp = TempDir::new().unwrap();
      let config = RudiConfig::with_home(temp.path());
      let result = verify_lockfile(&config, &PackageId::new(PackageKind::Stack, "nope")).unwrap();
      assert!(!result.valid);
      assert_eq!(result.errors, vec!["no lock record for stack:nope"]);
    }

    #[test]
    fn tampered_identity_is_detected() {
      let temp = TempDir::new().unwrap();
      let config = RudiConfig::with_home(temp.path());
      let resolved = package(&config, "binary:rg", "14.1.0", vec![]);
      install_dirs(&resolved);
      write_lockfile(&config, &resolved).unwrap();

      let path = config.lock_path(&resolved.id);
      let edited = fs::read_to_string(&path).unwrap().replace("version: 14.1.0", "version: 15.0.0");
      fs::write(&path, edited).unwrap();

      let result = verify_lockfile(&config, &resolved.id).unwrap();
      assert_eq!(result.errors, vec!["checksum mismatch for binary:rg"]);
    }
  }

  mod clean {
    use super::*;

    #[test]
    fn removes_exactly_the_orphan() {
      let temp = TempDir::new().unwrap();
      let config = RudiConfig::with_home(temp.path());
      let kept = package(&config, "runtime:node", "20.11.0", vec![]);
      let orphan = package(&config, "binary:rg", "14.1.0", vec![]);
      install_dirs(&kept);
      install_dirs(&orphan);
      write_lockfile(&config, &kept).unwrap();
      write_lockfile(&config, &orphan).unwrap();

      fs::remove_dir_all(&orphan.install_path).unwrap();
      let report = clean_orphaned_lockfiles(&config).unwrap();

      assert_eq!(report.removed, vec![config.lock_path(&orphan.id)]);
      assert_eq!(report.kept, 1);
      assert!(has_lockfile(&config, &kept.id));
      assert!(!has_lockfile(&config, &orphan.id));
    }

    #[test]
    fn removes_corrupt_records() {
      let temp = TempDir::new().unwrap();
      let config = RudiConfig::with_home(temp.path());
      let corrupt = config.locks_dir().join("stacks/broken.lock.yaml");
      fs::create_dir_all(corrupt.parent().unwrap()).unwrap();
      fs::write(&corrupt, "id: [unterminated").unwrap();
      fs::write(config.locks_dir().join("stacks/notes.txt"), "not a lock").unwrap();

      let report = clean_orphaned_lockfiles(&config).unwrap();
      assert_eq!(report.removed, vec![corrupt.clone()]);
      assert!(!corrupt.exists());
      assert!(config.locks_dir().join("stacks/notes.txt").exists());
    }

    #[test]
    fn empty_home_is_fine() {
      let temp = TempDir::new().unwrap();
      let report = clean_orphaned_lockfiles(&RudiConfig::with_home(temp.path())).unwrap();
      assert!(report.removed.is_empty());
      assert_eq!(report.kept, 0);
    }
  }
}
