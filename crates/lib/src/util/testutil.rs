//! Test utilities for rudi-lib.
//!
//! [`TestRegistry`] lays out a throwaway home directory next to a local
//! registry checkout, so resolver and installer tests never touch the network
//! unless they point a download at a mock server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::config::{RegistryConfig, RudiConfig};
use crate::registry::RegistryClient;

pub struct TestRegistry {
  pub temp: TempDir,
}

impl TestRegistry {
  /// A registry serving `index` with no package sources.
  pub fn new(index: Value) -> Self {
    let temp = TempDir::new().unwrap();
    let registry = temp.path().join("registry");
    std::fs::create_dir_all(&registry).unwrap();
    std::fs::write(registry.join("index.json"), serde_json::to_vec_pretty(&index).unwrap()).unwrap();
    std::fs::create_dir_all(temp.path().join("home")).unwrap();
    Self { temp }
  }

  /// A small registry covering every package kind.
  ///
  /// - `stack:notes` requires `node>=18`, `rg`, a missing binary and `claude`
  /// - `stack:legacy` declares its binary through the `tools` alias
  /// - `runtime:python` and `runtime:node` are archive downloads
  /// - `agent:claude` is an npm package
  /// - `prompt:review` is a markdown file
  pub fn standard() -> Self {
    let registry = Self::new(json!({
      "version": "1",
      "packages": {
        "stacks": {
          "official": [
            { "id": "stack:notes", "name": "notes", "version": "0.2.0", "path": "stacks/notes" },
            { "id": "stack:legacy", "name": "legacy", "path": "stacks/legacy", "requires": { "tools": ["rg"] } }
          ]
        },
        "prompts": {
          "official": [{ "id": "prompt:review", "name": "review", "path": "prompts/review.md" }]
        },
        "runtimes": {
          "official": [
            {
              "id": "runtime:python",
              "name": "python",
              "version": "3.12.1",
              "bins": ["python3"],
              "download": { "linux-x64": "https://example.invalid/python-{version}.tar.gz" }
            },
            {
              "id": "runtime:node",
              "name": "node",
              "version": "20.11.0",
              "bins": ["node"],
              "download": { "linux-x64": "https://example.invalid/node-{version}.tar.xz" }
            }
          ]
        },
        "binaries": {
          "official": [{ "id": "binary:rg", "name": "rg", "version": "14.1.0", "system": true }]
        },
        "agents": {
          "official": [
            {
              "id": "agent:claude",
              "name": "claude",
              "version": "1.0.0",
              "npmPackage": "@anthropic-ai/claude-code",
              "bins": ["claude"]
            }
          ]
        }
      }
    }));

    registry.write_source(
      "stacks/notes/manifest.json",
      json!({
        "name": "notes",
        "bins": ["notes"],
        "requires": {
          "runtimes": ["node>=18"],
          "binaries": ["rg", "does-not-exist"],
          "agents": ["claude"]
        }
      })
      .to_string(),
    );
    registry.write_source("stacks/notes/src/index.js", "console.log('notes')\n");
    registry.write_source("prompts/review.md", "# Review\n\nLook closely.\n");
    registry
  }

  pub fn root(&self) -> PathBuf {
    self.temp.path().join("registry")
  }

  pub fn home(&self) -> PathBuf {
    self.temp.path().join("home")
  }

  pub fn config(&self) -> RudiConfig {
    RudiConfig::with_home(self.home()).with_registry(RegistryConfig::local(self.root().join("index.json")))
  }

  pub fn client(&self) -> Arc<RegistryClient> {
    let config = self.config();
    Arc::new(RegistryClient::new(config.registry.clone(), config.registry_cache_path()))
  }

  /// Write a registry-relative source file.
  pub fn write_source(&self, rel: &str, contents: impl AsRef<[u8]>) {
    let path = self.root().join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
  }

  /// Create a fake install directory so the package counts as installed.
  pub fn mark_installed(&self, rel: &str) -> PathBuf {
    let path = self.home().join(rel);
    std::fs::create_dir_all(&path).unwrap();
    path
  }
}

/// Build an in-memory `.tar.gz` from `(path, contents, mode)` entries.
pub fn tar_gz(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
  let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
  for (path, contents, mode) in entries {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(*mode);
    header.set_cksum();
    builder.append_data(&mut header, path, *contents).unwrap();
  }
  builder.into_inner().unwrap().finish().unwrap()
}

/// Write an executable file, creating parent directories.
pub fn write_executable(path: &Path, contents: &str) {
  std::fs::create_dir_all(path.parent().unwrap()).unwrap();
  std::fs::write(path, contents).unwrap();
  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
  }
}
