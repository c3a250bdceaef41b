//! Shim publication.
//!
//! Every installed executable is exposed under one shared directory
//! (`<home>/bins`) that users put on `PATH`. Archive installs get a symlink;
//! everything else gets a small wrapper script that `exec`s the real target.
//!
//! Names are owned by the package that published them last. Publishing a
//! name another package owns succeeds and is reported as a collision.

mod registry;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use registry::{ShimEntry, ShimRegistry, ShimType};

use crate::config::RudiConfig;
use crate::install::manifest::{InstallType, InstalledManifest};
use crate::install::pip::venv_bin_dir;
use crate::package::PackageId;

#[derive(Debug, Error)]
pub enum ShimError {
  #[error("shim io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("shim registry {path} is unreadable: {source}")]
  Registry {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

/// A name that changed owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShimCollision {
  pub bin: String,
  pub previous_owner: PackageId,
  pub new_owner: PackageId,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ShimReport {
  pub created: Vec<String>,
  /// Names whose target did not exist.
  pub skipped: Vec<String>,
  pub collisions: Vec<ShimCollision>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RemoveReport {
  pub removed: Vec<String>,
  pub not_found: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShimValidation {
  pub bin: String,
  pub valid: bool,
  pub shim_type: Option<ShimType>,
  pub target: Option<PathBuf>,
  pub error: Option<String>,
}

pub struct ShimManager {
  bins_dir: PathBuf,
  registry_path: PathBuf,
}

impl ShimManager {
  pub fn new(config: &RudiConfig) -> Self {
    Self {
      bins_dir: config.bins_dir(),
      registry_path: config.shim_registry_path(),
    }
  }

  pub fn bins_dir(&self) -> &Path {
    &self.bins_dir
  }

  /// Where the shim for `bin` lives.
  pub fn shim_path(&self, bin: &str) -> PathBuf {
    if cfg!(windows) {
      self.bins_dir.join(format!("{}.cmd", bin))
    } else {
      self.bins_dir.join(bin)
    }
  }

  /// Publish a shim for every executable `manifest` declares.
  pub fn create_shims_for_tool(&self, manifest: &InstalledManifest, install_dir: &Path) -> Result<ShimReport, ShimError> {
    let mut report = ShimReport::default();
    if manifest.bins.is_empty() {
      return Ok(report);
    }

    std::fs::create_dir_all(&self.bins_dir).map_err(|source| ShimError::Io {
      path: self.bins_dir.clone(),
      source,
    })?;
    let mut registry = ShimRegistry::load(&self.registry_path)?;

    for bin in &manifest.bins {
      let Some(target) = shim_target(manifest, install_dir, bin).filter(|t| t.exists()) else {
        warn!(package = %manifest.id, bin = %bin, "shim target missing, skipping");
        report.skipped.push(bin.clone());
        continue;
      };

      let shim_type = if manifest.install_type == InstallType::Binary && cfg!(unix) {
        ShimType::Symlink
      } else {
        ShimType::Wrapper
      };

      let path = self.shim_path(bin);
      let published = match shim_type {
        ShimType::Symlink => publish_symlink(&target, &path),
        ShimType::Wrapper => publish_wrapper(&target, &path, &manifest.id),
      };
      published.map_err(|source| ShimError::Io { path, source })?;
      debug!(bin = %bin, target = %target.display(), ?shim_type, "published shim");

      let entry = ShimEntry {
        owner: manifest.id.clone(),
        shim_type,
        target,
        created_at: Utc::now(),
      };
      if let Some(previous_owner) = registry.register(bin, entry) {
        warn!(bin = %bin, previous = %previous_owner, owner = %manifest.id, "shim collision, last install wins");
        report.collisions.push(ShimCollision {
          bin: bin.clone(),
          previous_owner,
          new_owner: manifest.id.clone(),
        });
      }
      report.created.push(bin.clone());
    }

    registry.save()?;
    info!(package = %manifest.id, created = report.created.len(), "shims published");
    Ok(report)
  }

  /// Remove shims and their registry entries.
  ///
  /// Entries are unregistered even when the shim file is already gone.
  pub fn remove_shims(&self, bins: &[String]) -> Result<RemoveReport, ShimError> {
    let mut report = RemoveReport::default();
    let mut registry = ShimRegistry::load(&self.registry_path)?;

    for bin in bins {
      let path = self.shim_path(bin);
      match std::fs::remove_file(&path) {
        Ok(()) => report.removed.push(bin.clone()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => report.not_found.push(bin.clone()),
        Err(source) => return Err(ShimError::Io { path, source }),
      }
      registry.unregister(bin);
    }

    registry.save()?;
    Ok(report)
  }

  /// Check that a shim exists and its target is still there.
  pub fn validate_shim(&self, bin: &str) -> ShimValidation {
    let path = self.shim_path(bin);
    let invalid = |shim_type, target, error: String| ShimValidation {
      bin: bin.to_string(),
      valid: false,
      shim_type,
      target,
      error: Some(error),
    };

    let Ok(metadata) = std::fs::symlink_metadata(&path) else {
      return invalid(None, None, "shim not found".to_string());
    };

    let (shim_type, target) = if metadata.file_type().is_symlink() {
      match std::fs::read_link(&path) {
        Ok(target) => (ShimType::Symlink, target),
        Err(e) => return invalid(Some(ShimType::Symlink), None, e.to_string()),
      }
    } else {
      let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => return invalid(None, None, e.to_string()),
      };
      match wrapper_target(&content) {
        Some(target) => (ShimType::Wrapper, target),
        None => return invalid(None, None, "not a rudi shim".to_string()),
      }
    };

    if !target.exists() {
      return invalid(
        Some(shim_type),
        Some(target.clone()),
        format!("target {} does not exist", target.display()),
      );
    }

    ShimValidation {
      bin: bin.to_string(),
      valid: true,
      shim_type: Some(shim_type),
      target: Some(target),
      error: None,
    }
  }

  pub fn list_shims(&self) -> Result<ShimRegistry, ShimError> {
    ShimRegistry::load(&self.registry_path)
  }

  pub fn owner(&self, bin: &str) -> Result<Option<PackageId>, ShimError> {
    Ok(self.list_shims()?.get(bin).map(|entry| entry.owner.clone()))
  }
}

/// Absolute path a shim for `bin` should point at.
///
/// Recorded `binPaths` win; otherwise the location follows the install type.
pub fn shim_target(manifest: &InstalledManifest, install_dir: &Path, bin: &str) -> Option<PathBuf> {
  if let Some(path) = manifest.bin_paths.get(bin) {
    return Some(if path.is_absolute() {
      path.clone()
    } else {
      install_dir.join(path)
    });
  }

  match manifest.install_type {
    InstallType::Npm => Some(install_dir.join("node_modules").join(".bin").join(npm_bin_name(bin))),
    InstallType::Pip => Some(venv_bin_dir(install_dir).join(exe_name(bin))),
    InstallType::System => which::which(bin).ok(),
    InstallType::Binary => Some(install_dir.join("bin").join(exe_name(bin))),
    InstallType::Source | InstallType::None => Some(install_dir.join(bin)),
    InstallType::Prompt => None,
  }
}

fn exe_name(bin: &str) -> String {
  if cfg!(windows) { format!("{}.exe", bin) } else { bin.to_string() }
}

fn npm_bin_name(bin: &str) -> String {
  if cfg!(windows) { format!("{}.cmd", bin) } else { bin.to_string() }
}

/// Replace `link` with a symlink to `target` via a temporary name.
#[cfg(unix)]
fn publish_symlink(target: &Path, link: &Path) -> io::Result<()> {
  let tmp = link.with_file_name(format!(
    ".{}.{}.tmp",
    link.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
    std::process::id()
  ));
  let _ = std::fs::remove_file(&tmp);
  std::os::unix::fs::symlink(target, &tmp)?;
  std::fs::rename(&tmp, link)
}

#[cfg(windows)]
fn publish_symlink(target: &Path, link: &Path) -> io::Result<()> {
  std::os::windows::fs::symlink_file(target, link)
}

/// Write a wrapper script atomically: temp file in the same directory, then rename.
fn publish_wrapper(target: &Path, path: &Path, owner: &PackageId) -> io::Result<()> {
  let dir = path.parent().unwrap_or(Path::new("."));
  let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
  tmp.write_all(wrapper_script(target, owner).as_bytes())?;
  tmp.flush()?;

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    tmp.as_file().set_permissions(std::fs::Permissions::from_mode(0o755))?;
  }

  tmp.persist(path).map_err(|e| e.error)?;
  Ok(())
}

#[cfg(unix)]
fn wrapper_script(target: &Path, owner: &PackageId) -> String {
  format!(
    "#!/bin/sh\n# rudi shim for {}\nexec {} \"$@\"\n",
    owner,
    sh_quote(&target.to_string_lossy())
  )
}

/// Quote `value` as a single POSIX shell word.
#[cfg(unix)]
fn sh_quote(value: &str) -> String {
  format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(windows)]
fn wrapper_script(target: &Path, owner: &PackageId) -> String {
  format!("@echo off\r\nrem rudi shim for {}\r\n\"{}\" %*\r\n", owner, target.display())
}

/// Target of a wrapper written by [`wrapper_script`].
#[cfg(unix)]
fn wrapper_target(content: &str) -> Option<PathBuf> {
  let line = content.lines().map(str::trim).find_map(|line| line.strip_prefix("exec "))?;

  let mut target = String::new();
  let mut chars = line.chars();
  while let Some(c) = chars.next() {
    match c {
      '\'' => {
        for quoted in chars.by_ref() {
          if quoted == '\'' {
            break;
          }
          target.push(quoted);
        }
      }
      '\\' => target.extend(chars.next()),
      c if c.is_whitespace() => break,
      c => target.push(c),
    }
  }

  if target.is_empty() { None } else { Some(PathBuf::from(target)) }
}

/// Target of a wrapper written by [`wrapper_script`].
#[cfg(windows)]
fn wrapper_target(content: &str) -> Option<PathBuf> {
  content.lines().find_map(|line| {
    let rest = line.trim().strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(PathBuf::from(&rest[..end]))
  })
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use crate::install::manifest::InstallSource;
  use crate::package::PackageKind;
  use crate::util::testutil::write_executable;
  use tempfile::TempDir;
  use tracing_test::traced_test;

  struct Fixture {
    temp: TempDir,
    shims: ShimManager,
  }

  impl Fixture {
    fn new() -> Self {
      let temp = TempDir::new().unwrap();
      let shims = ShimManager::new(&RudiConfig::with_home(temp.path()));
      Self { temp, shims }
    }

    fn install_dir(&self, name: &str) -> PathBuf {
      self.temp.path().join("installs").join(name)
    }
  }

  fn manifest(id: &str, install_type: InstallType, bins: &[&str]) -> InstalledManifest {
    let id = PackageId::parse(id).unwrap();
    let name = id.name.clone();
    InstalledManifest::new(id, name, "1.0.0", install_type)
      .with_bins(bins.iter().map(|b| b.to_string()).collect())
      .with_source(InstallSource::None)
  }

  mod create {
    use super::*;

    #[test]
    fn binary_installs_get_symlinks() {
      let fx = Fixture::new();
      let dir = fx.install_dir("rg");
      write_executable(&dir.join("bin/rg"), "#!/bin/sh\necho rg\n");

      let report = fx
        .shims
        .create_shims_for_tool(&manifest("binary:rg", InstallType::Binary, &["rg"]), &dir)
        .unwrap();

      assert_eq!(report.created, vec!["rg"]);
      let shim = fx.shims.shim_path("rg");
      assert!(std::fs::symlink_metadata(&shim).unwrap().file_type().is_symlink());
      assert_eq!(std::fs::read_link(&shim).unwrap(), dir.join("bin/rg"));
    }

    #[test]
    fn npm_installs_get_wrappers() {
      let fx = Fixture::new();
      let dir = fx.install_dir("claude");
      write_executable(&dir.join("node_modules/.bin/claude"), "");

      fx.shims
        .create_shims_for_tool(&manifest("agent:claude", InstallType::Npm, &["claude"]), &dir)
        .unwrap();

      let shim = fx.shims.shim_path("claude");
      let content = std::fs::read_to_string(&shim).unwrap();
      assert!(content.starts_with("#!/bin/sh\n"));
      assert!(content.contains(&format!("exec '{}' \"$@\"", dir.join("node_modules/.bin/claude").display())));

      use std::os::unix::fs::PermissionsExt;
      assert_eq!(std::fs::metadata(&shim).unwrap().permissions().mode() & 0o111, 0o111);
    }

    #[test]
    fn wrapper_forwards_arguments() {
      let fx = Fixture::new();
      let dir = fx.install_dir("echoer");
      write_executable(&dir.join("venv/bin/echoer"), "#!/bin/sh\necho \"$@\"\n");

      fx.shims
        .create_shims_for_tool(&manifest("binary:echoer", InstallType::Pip, &["echoer"]), &dir)
        .unwrap();

      let output = std::process::Command::new(fx.shims.shim_path("echoer"))
        .args(["a", "b c"])
        .output()
        .unwrap();
      assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "a b c");
    }

    #[test]
    fn wrapper_survives_shell_metacharacters_in_home() {
      let fx = Fixture::new();
      let dir = fx.temp.path().join("it's $HOME `x`").join("echoer");
      write_executable(&dir.join("venv/bin/echoer"), "#!/bin/sh\necho ran \"$@\"\n");

      fx.shims
        .create_shims_for_tool(&manifest("binary:echoer", InstallType::Pip, &["echoer"]), &dir)
        .unwrap();

      let output = std::process::Command::new(fx.shims.shim_path("echoer"))
        .arg("ok")
        .output()
        .unwrap();
      assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
      assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "ran ok");
      assert!(fx.shims.validate_shim("echoer").valid);
    }

    #[traced_test]
    #[test]
    fn missing_targets_are_skipped() {
      let fx = Fixture::new();
      let dir = fx.install_dir("tool");
      write_executable(&dir.join("bin/present"), "");

      let report = fx
        .shims
        .create_shims_for_tool(
          &manifest("binary:tool", InstallType::Binary, &["present", "absent"]),
          &dir,
        )
        .unwrap();

      assert_eq!(report.created, vec!["present"]);
      assert_eq!(report.skipped, vec!["absent"]);
      assert!(!fx.shims.shim_path("absent").exists());
      assert!(logs_contain("shim target missing"));
    }

    #[traced_test]
    #[test]
    fn last_writer_wins_and_reports_collision() {
      let fx = Fixture::new();
      let a = fx.install_dir("a");
      let b = fx.install_dir("b");
      write_executable(&a.join("bin/x"), "");
      write_executable(&b.join("bin/x"), "");

      let first = fx
        .shims
        .create_shims_for_tool(&manifest("binary:a", InstallType::Binary, &["x"]), &a)
        .unwrap();
      assert!(first.collisions.is_empty());

      let second = fx
        .shims
        .create_shims_for_tool(&manifest("binary:b", InstallType::Binary, &["x"]), &b)
        .unwrap();

      assert_eq!(
        second.collisions,
        vec![ShimCollision {
          bin: "x".to_string(),
          previous_owner: PackageId::new(PackageKind::Binary, "a"),
          new_owner: PackageId::new(PackageKind::Binary, "b"),
        }]
      );
      assert_eq!(std::fs::read_link(fx.shims.shim_path("x")).unwrap(), b.join("bin/x"));
      assert_eq!(fx.shims.owner("x").unwrap(), Some(PackageId::new(PackageKind::Binary, "b")));
      assert!(logs_contain("shim collision"));
    }

    #[test]
    fn recorded_bin_paths_win() {
      let fx = Fixture::new();
      let dir = fx.install_dir("node");
      write_executable(&dir.join("node-v20/bin/node"), "");

      let mut m = manifest("runtime:node", InstallType::Binary, &["node"]);
      m.bin_paths.insert("node".to_string(), PathBuf::from("node-v20/bin/node"));
      fx.shims.create_shims_for_tool(&m, &dir).unwrap();

      assert_eq!(
        std::fs::read_link(fx.shims.shim_path("node")).unwrap(),
        dir.join("node-v20/bin/node")
      );
    }
  }

  mod remove {
    use super::*;

    #[test]
    fn removes_files_and_registry_entries() {
      let fx = Fixture::new();
      let dir = fx.install_dir("rg");
      write_executable(&dir.join("bin/rg"), "");
      fx.shims
        .create_shims_for_tool(&manifest("binary:rg", InstallType::Binary, &["rg"]), &dir)
        .unwrap();

      let report = fx.shims.remove_shims(&["rg".to_string(), "ghost".to_string()]).unwrap();

      assert_eq!(report.removed, vec!["rg"]);
      assert_eq!(report.not_found, vec!["ghost"]);
      assert!(std::fs::symlink_metadata(fx.shims.shim_path("rg")).is_err());
      assert!(fx.shims.list_shims().unwrap().entries().is_empty());
    }

    #[test]
    fn unregisters_even_when_file_is_gone() {
      let fx = Fixture::new();
      let dir = fx.install_dir("rg");
      write_executable(&dir.join("bin/rg"), "");
      fx.shims
        .create_shims_for_tool(&manifest("binary:rg", InstallType::Binary, &["rg"]), &dir)
        .unwrap();
      std::fs::remove_file(fx.shims.shim_path("rg")).unwrap();

      let report = fx.shims.remove_shims(&["rg".to_string()]).unwrap();
      assert_eq!(report.not_found, vec!["rg"]);
      assert!(fx.shims.owner("rg").unwrap().is_none());
    }
  }

  mod validate {
    use super::*;

    #[test]
    fn symlink_and_wrapper_are_classified() {
      let fx = Fixture::new();
      let bin_dir = fx.install_dir("rg");
      let npm_dir = fx.install_dir("claude");
      write_executable(&bin_dir.join("bin/rg"), "");
      write_executable(&npm_dir.join("node_modules/.bin/claude"), "");
      fx.shims
        .create_shims_for_tool(&manifest("binary:rg", InstallType::Binary, &["rg"]), &bin_dir)
        .unwrap();
      fx.shims
        .create_shims_for_tool(&manifest("agent:claude", InstallType::Npm, &["claude"]), &npm_dir)
        .unwrap();

      let rg = fx.shims.validate_shim("rg");
      assert!(rg.valid);
      assert_eq!(rg.shim_type, Some(ShimType::Symlink));
      assert_eq!(rg.target, Some(bin_dir.join("bin/rg")));

      let claude = fx.shims.validate_shim("claude");
      assert!(claude.valid);
      assert_eq!(claude.shim_type, Some(ShimType::Wrapper));
      assert_eq!(claude.target, Some(npm_dir.join("node_modules/.bin/claude")));
    }

    #[test]
    fn dangling_target_is_invalid() {
      let fx = Fixture::new();
      let dir = fx.install_dir("rg");
      write_executable(&dir.join("bin/rg"), "");
      fx.shims
        .create_shims_for_tool(&manifest("binary:rg", InstallType::Binary, &["rg"]), &dir)
        .unwrap();
      std::fs::remove_dir_all(&dir).unwrap();

      let result = fx.shims.validate_shim("rg");
      assert!(!result.valid);
      assert!(result.error.unwrap().contains("does not exist"));
    }

    #[test]
    fn missing_shim_is_invalid() {
      let fx = Fixture::new();
      let result = fx.shims.validate_shim("nothing");
      assert!(!result.valid);
      assert_eq!(result.shim_type, None);
      assert_eq!(result.error.as_deref(), Some("shim not found"));
    }

    #[test]
    fn parses_wrapper_target() {
      let script = "#!/bin/sh\n# rudi shim for agent:claude\nexec '/x/node_modules/.bin/claude' \"$@\"\n";
      assert_eq!(wrapper_target(script), Some(PathBuf::from("/x/node_modules/.bin/claude")));
      assert_eq!(wrapper_target("#!/bin/sh\necho hi\n"), None);
    }

    #[test]
    fn quoted_target_round_trips() {
      let target = Path::new("/home/o'neil/$HOME/`id`/\"q\"/tool");
      let script = wrapper_script(target, &PackageId::parse("binary:tool").unwrap());
      assert!(script.contains(r#"exec '/home/o'\''neil/$HOME/`id`/"q"/tool' "$@""#));
      assert_eq!(wrapper_target(&script), Some(target.to_path_buf()));
    }
  }
}
