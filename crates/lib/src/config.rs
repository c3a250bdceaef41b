//! Runtime configuration for rudi.
//!
//! Everything rudi writes lives below one home directory (`~/.rudi` by
//! default). The registry can be pointed at a different remote or at a local
//! checkout for development.
//!
//! # Environment
//!
//! | variable                  | meaning                                   |
//! |---------------------------|-------------------------------------------|
//! | `RUDI_HOME`               | home directory                            |
//! | `RUDI_REGISTRY_URL`       | registry index URL                        |
//! | `RUDI_REGISTRY_RAW`       | base URL for raw registry files           |
//! | `RUDI_REGISTRY_API`       | base URL for registry directory listings  |
//! | `RUDI_USE_LOCAL_REGISTRY` | read the index from `RUDI_REGISTRY_PATH`  |
//! | `RUDI_REGISTRY_PATH`      | local index file                          |
//! | `RUDI_ALLOW_SCRIPTS`      | run npm lifecycle scripts during installs |

use std::path::{Path, PathBuf};

use crate::consts::{
  DEFAULT_REGISTRY_API, DEFAULT_REGISTRY_RAW, DEFAULT_REGISTRY_URL, LOCK_EXTENSION, SHIM_REGISTRY_FILENAME,
};
use crate::package::{PackageId, PackageKind};
use crate::platform::paths::rudi_home;

/// Where the registry index and package sources come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
  /// URL of the JSON index.
  pub index_url: String,
  /// Base URL that registry-relative file paths are appended to.
  pub raw_base: String,
  /// Base URL of a contents API returning `[{name, type}]` listings.
  pub api_base: String,
  /// Local index file that overrides the network when present.
  pub local_index: Option<PathBuf>,
}

impl Default for RegistryConfig {
  fn default() -> Self {
    Self {
      index_url: DEFAULT_REGISTRY_URL.to_string(),
      raw_base: DEFAULT_REGISTRY_RAW.to_string(),
      api_base: DEFAULT_REGISTRY_API.to_string(),
      local_index: None,
    }
  }
}

impl RegistryConfig {
  /// A registry read entirely from a local index file.
  ///
  /// Package sources resolve relative to the directory containing the index.
  pub fn local(index: impl Into<PathBuf>) -> Self {
    Self {
      local_index: Some(index.into()),
      ..Self::default()
    }
  }

  /// Root directory for registry-relative paths when running locally.
  pub fn local_root(&self) -> Option<&Path> {
    self.local_index.as_deref().and_then(Path::parent)
  }
}

#[derive(Debug, Clone)]
pub struct RudiConfig {
  pub home: PathBuf,
  pub registry: RegistryConfig,
  /// Allow npm install/postinstall scripts of installed packages to run.
  pub allow_scripts: bool,
}

impl RudiConfig {
  /// Build a configuration from the process environment.
  pub fn from_env() -> Self {
    let mut registry = RegistryConfig::default();

    if let Ok(url) = std::env::var("RUDI_REGISTRY_URL") {
      registry.index_url = url;
    }
    if let Ok(raw) = std::env::var("RUDI_REGISTRY_RAW") {
      registry.raw_base = raw;
    }
    if let Ok(api) = std::env::var("RUDI_REGISTRY_API") {
      registry.api_base = api;
    }
    if env_flag("RUDI_USE_LOCAL_REGISTRY") {
      let path = std::env::var("RUDI_REGISTRY_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("registry").join("index.json"));
      registry.local_index = Some(path);
    }

    Self {
      home: rudi_home(),
      registry,
      allow_scripts: env_flag("RUDI_ALLOW_SCRIPTS"),
    }
  }

  /// A configuration rooted at `home` with the default remote registry.
  pub fn with_home(home: impl Into<PathBuf>) -> Self {
    Self {
      home: home.into(),
      registry: RegistryConfig::default(),
      allow_scripts: false,
    }
  }

  pub fn with_registry(mut self, registry: RegistryConfig) -> Self {
    self.registry = registry;
    self
  }

  /// Directory holding every install of `kind` (`stacks/`, `binaries/`, ...).
  pub fn kind_dir(&self, kind: PackageKind) -> PathBuf {
    self.home.join(kind.storage_kind().plural())
  }

  /// Where a package is installed.
  ///
  /// Prompts are single files; everything else is a directory.
  pub fn install_path(&self, id: &PackageId) -> PathBuf {
    let dir = self.kind_dir(id.kind);
    let name = sanitize_name(&id.name);
    match id.kind {
      PackageKind::Prompt => dir.join(format!("{}.md", name)),
      _ => dir.join(name),
    }
  }

  /// The shared shim directory.
  pub fn bins_dir(&self) -> PathBuf {
    self.home.join("bins")
  }

  pub fn shim_registry_path(&self) -> PathBuf {
    self.home.join(SHIM_REGISTRY_FILENAME)
  }

  pub fn locks_dir(&self) -> PathBuf {
    self.home.join("locks")
  }

  /// Lock record location for a package.
  pub fn lock_path(&self, id: &PackageId) -> PathBuf {
    self
      .locks_dir()
      .join(id.kind.storage_kind().plural())
      .join(format!("{}.{}", sanitize_name(&id.name), LOCK_EXTENSION))
  }

  pub fn cache_dir(&self) -> PathBuf {
    self.home.join("cache")
  }

  pub fn registry_cache_path(&self) -> PathBuf {
    self.cache_dir().join("registry.json")
  }

  /// Scratch directory for archive downloads.
  pub fn downloads_dir(&self) -> PathBuf {
    self.cache_dir().join("downloads")
  }
}

/// Make a package name safe for use as a single path component.
///
/// Scoped npm names (`@scope/name`) become `scope__name`.
pub fn sanitize_name(name: &str) -> String {
  let trimmed = name.trim_start_matches('@');
  let sanitized: String = trimmed
    .replace('/', "__")
    .chars()
    .map(|c| {
      if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
        c
      } else {
        '_'
      }
    })
    .collect();

  if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
    "_".to_string()
  } else {
    sanitized
  }
}

fn env_flag(name: &str) -> bool {
  std::env::var(name)
    .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  fn install_paths_by_kind() {
    let config = RudiConfig::with_home("/r");

    assert_eq!(
      config.install_path(&PackageId::new(PackageKind::Stack, "notes")),
      PathBuf::from("/r/stacks/notes")
    );
    assert_eq!(
      config.install_path(&PackageId::new(PackageKind::Prompt, "review")),
      PathBuf::from("/r/prompts/review.md")
    );
    assert_eq!(
      config.install_path(&PackageId::new(PackageKind::Package, "@scope/tool")),
      PathBuf::from("/r/binaries/scope__tool")
    );
  }

  #[test]
  fn lock_path_is_partitioned_by_kind() {
    let config = RudiConfig::with_home("/r");
    let path = config.lock_path(&PackageId::new(PackageKind::Runtime, "python"));
    assert_eq!(path, PathBuf::from("/r/locks/runtimes/python.lock.yaml"));
  }

  #[test]
  fn sanitize_rejects_traversal() {
    assert_eq!(sanitize_name(".."), "_");
    assert_eq!(sanitize_name("a/../b"), "a__..__b");
    assert_eq!(sanitize_name("my tool"), "my_tool");
  }

  #[test]
  #[serial]
  fn local_registry_from_env() {
    temp_env::with_vars(
      [
        ("RUDI_HOME", Some("/tmp/rudi-home")),
        ("RUDI_USE_LOCAL_REGISTRY", Some("1")),
        ("RUDI_REGISTRY_PATH", Some("/src/registry/index.json")),
        ("RUDI_ALLOW_SCRIPTS", None),
      ],
      || {
        let config = RudiConfig::from_env();
        assert_eq!(config.home, PathBuf::from("/tmp/rudi-home"));
        assert_eq!(
          config.registry.local_index,
          Some(PathBuf::from("/src/registry/index.json"))
        );
        assert_eq!(config.registry.local_root(), Some(Path::new("/src/registry")));
        assert!(!config.allow_scripts);
      },
    );
  }

  #[test]
  #[serial]
  fn allow_scripts_from_env() {
    temp_env::with_var("RUDI_ALLOW_SCRIPTS", Some("1"), || {
      assert!(RudiConfig::from_env().allow_scripts);
    });
    temp_env::with_var("RUDI_ALLOW_SCRIPTS", None::<&str>, || {
      assert!(!RudiConfig::from_env().allow_scripts);
    });
  }

  #[test]
  #[serial]
  fn local_registry_disabled_by_default() {
    temp_env::with_vars([("RUDI_USE_LOCAL_REGISTRY", None::<&str>)], || {
      let config = RudiConfig::from_env();
      assert!(config.registry.local_index.is_none());
    });
  }
}
