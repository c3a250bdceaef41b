//! Registry index loading, caching and file transfer.
//!
//! # Index sources
//!
//! 1. A local index file, when configured and readable
//! 2. The cached index, when younger than [`REGISTRY_CACHE_TTL`]
//! 3. The remote index (refreshing the cache)
//! 4. A stale cached index, if the network is unavailable

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::RegistryError;
use super::types::{RegistryEntry, RegistryIndex};
use crate::config::RegistryConfig;
use crate::consts::{APP_NAME, MANIFEST_FILENAME, REGISTRY_CACHE_TTL};
use crate::package::PackageKind;

/// One entry of a registry directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceEntry {
  pub name: String,
  #[serde(rename = "type")]
  pub entry_type: String,
}

impl SourceEntry {
  pub fn is_dir(&self) -> bool {
    self.entry_type == "dir"
  }
}

pub struct RegistryClient {
  config: RegistryConfig,
  cache_path: PathBuf,
  http: reqwest::Client,
  index: OnceCell<RegistryIndex>,
}

impl RegistryClient {
  pub fn new(config: RegistryConfig, cache_path: PathBuf) -> Self {
    let http = reqwest::Client::builder()
      .user_agent(format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION")))
      .build()
      .unwrap_or_default();

    Self {
      config,
      cache_path,
      http,
      index: OnceCell::new(),
    }
  }

  pub fn config(&self) -> &RegistryConfig {
    &self.config
  }

  /// The registry index, loaded once per client.
  pub async fn index(&self) -> Result<&RegistryIndex, RegistryError> {
    self.index.get_or_try_init(|| self.load_index()).await
  }

  async fn load_index(&self) -> Result<RegistryIndex, RegistryError> {
    if let Some(local) = &self.config.local_index {
      match read_index_file(local).await {
        Ok(index) => {
          debug!(path = %local.display(), "using local registry index");
          return Ok(index);
        }
        Err(e) => warn!(path = %local.display(), error = %e, "local registry unavailable, falling back to network"),
      }
    }

    if self.cache_is_fresh().await
      && let Ok(index) = read_index_file(&self.cache_path).await
    {
      debug!(path = %self.cache_path.display(), "using cached registry index");
      return Ok(index);
    }

    match self.fetch_remote_index().await {
      Ok(index) => Ok(index),
      Err(e) => match read_index_file(&self.cache_path).await {
        Ok(stale) => {
          warn!(error = %e, "registry fetch failed, using stale cache");
          Ok(stale)
        }
        Err(_) => Err(e),
      },
    }
  }

  async fn fetch_remote_index(&self) -> Result<RegistryIndex, RegistryError> {
    let url = &self.config.index_url;
    info!(url = %url, "fetching registry index");

    let bytes = self.get_bytes(url).await?.ok_or_else(|| RegistryError::FetchFailed {
      url: url.clone(),
      message: "HTTP 404 Not Found".to_string(),
    })?;

    let index: RegistryIndex = serde_json::from_slice(&bytes).map_err(|source| RegistryError::Parse {
      what: format!("registry index from {}", url),
      source,
    })?;

    if let Some(parent) = self.cache_path.parent() {
      fs::create_dir_all(parent).await?;
    }
    if let Err(e) = fs::write(&self.cache_path, &bytes).await {
      warn!(path = %self.cache_path.display(), error = %e, "failed to write registry cache");
    }

    Ok(index)
  }

  async fn cache_is_fresh(&self) -> bool {
    let Ok(metadata) = fs::metadata(&self.cache_path).await else {
      return false;
    };
    metadata
      .modified()
      .ok()
      .and_then(|modified| SystemTime::now().duration_since(modified).ok())
      .is_some_and(|age| age < REGISTRY_CACHE_TTL)
  }

  /// Look up a package in the index.
  ///
  /// Official entries are searched before community ones. An entry matches on
  /// its `id` (`kind:name` or bare name) or its `name`.
  pub async fn find_entry(&self, kind: PackageKind, name: &str) -> Result<Option<RegistryEntry>, RegistryError> {
    let index = self.index().await?;
    let qualified = format!("{}:{}", kind.storage_kind(), name);

    Ok(
      index
        .packages
        .section(kind)
        .iter()
        .find(|entry| entry.id == qualified || entry.id == name || entry.name == name)
        .cloned(),
    )
  }

  /// Fetch the optional `manifest.json` published next to a package's sources.
  pub async fn fetch_package_manifest(&self, path: &str) -> Result<Option<RegistryEntry>, RegistryError> {
    let rel = format!("{}/{}", path.trim_end_matches('/'), MANIFEST_FILENAME);
    let Some(bytes) = self.read_source(&rel).await? else {
      return Ok(None);
    };

    match serde_json::from_slice(&bytes) {
      Ok(manifest) => Ok(Some(manifest)),
      Err(e) => {
        warn!(path = %rel, error = %e, "ignoring unparsable package manifest");
        Ok(None)
      }
    }
  }

  /// Read a registry-relative file. Returns `Ok(None)` if it does not exist.
  pub async fn read_source(&self, rel: &str) -> Result<Option<Vec<u8>>, RegistryError> {
    let rel = checked_relative(rel)?;

    if let Some(root) = self.local_root() {
      return match fs::read(root.join(&rel)).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
      };
    }

    let url = join_url(&self.config.raw_base, &rel);
    self.get_bytes(&url).await
  }

  /// List a registry-relative directory. Returns `Ok(None)` if it does not exist.
  pub async fn list_source_dir(&self, rel: &str) -> Result<Option<Vec<SourceEntry>>, RegistryError> {
    let rel = checked_relative(rel)?;

    if let Some(root) = self.local_root() {
      let mut dir = match fs::read_dir(root.join(&rel)).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
      };

      let mut entries = Vec::new();
      while let Some(entry) = dir.next_entry().await? {
        let entry_type = if entry.file_type().await?.is_dir() { "dir" } else { "file" };
        entries.push(SourceEntry {
          name: entry.file_name().to_string_lossy().to_string(),
          entry_type: entry_type.to_string(),
        });
      }
      entries.sort_by(|a, b| a.name.cmp(&b.name));
      return Ok(Some(entries));
    }

    let url = join_url(&self.config.api_base, &rel);
    let Some(bytes) = self.get_bytes(&url).await? else {
      return Ok(None);
    };
    let entries = serde_json::from_slice(&bytes).map_err(|source| RegistryError::Parse {
      what: format!("directory listing {}", url),
      source,
    })?;
    Ok(Some(entries))
  }

  /// Stream `url` into `dest`, returning the number of bytes written.
  pub async fn download_to(&self, url: &str, dest: &Path) -> Result<u64, RegistryError> {
    info!(url = %url, "downloading");

    let fetch_failed = |message: String| RegistryError::FetchFailed {
      url: url.to_string(),
      message,
    };

    let mut response = self.http.get(url).send().await.map_err(|e| fetch_failed(e.to_string()))?;
    if !response.status().is_success() {
      return Err(fetch_failed(format!("HTTP {}", response.status())));
    }

    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent).await?;
    }

    let mut file = fs::File::create(dest).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await.map_err(|e| fetch_failed(e.to_string()))? {
      file.write_all(&chunk).await?;
      written += chunk.len() as u64;
    }
    file.flush().await?;

    debug!(path = %dest.display(), size = written, "download complete");
    Ok(written)
  }

  fn local_root(&self) -> Option<&Path> {
    self
      .config
      .local_index
      .as_deref()
      .filter(|index| index.is_file())
      .and_then(Path::parent)
  }

  /// GET a URL, mapping 404 to `None`.
  async fn get_bytes(&self, url: &str) -> Result<Option<Vec<u8>>, RegistryError> {
    let fetch_failed = |message: String| RegistryError::FetchFailed {
      url: url.to_string(),
      message,
    };

    let response = self.http.get(url).send().await.map_err(|e| fetch_failed(e.to_string()))?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !response.status().is_success() {
      return Err(fetch_failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| fetch_failed(e.to_string()))?;
    Ok(Some(bytes.to_vec()))
  }
}

async fn read_index_file(path: &Path) -> Result<RegistryIndex, RegistryError> {
  let bytes = fs::read(path).await?;
  serde_json::from_slice(&bytes).map_err(|source| RegistryError::Parse {
    what: path.display().to_string(),
    source,
  })
}

/// Normalize a registry-relative path, rejecting anything that could escape the root.
fn checked_relative(rel: &str) -> Result<String, RegistryError> {
  let trimmed = rel.trim_start_matches('/');
  let path = Path::new(trimmed);
  if path.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
    return Err(RegistryError::InvalidPath(rel.to_string()));
  }
  Ok(trimmed.to_string())
}

fn join_url(base: &str, rel: &str) -> String {
  if rel.is_empty() {
    base.trim_end_matches('/').to_string()
  } else {
    format!("{}/{}", base.trim_end_matches('/'), rel)
  }
}

/// Convert a URL to a safe filename.
///
/// Takes the last path component and sanitizes it. Falls back to a hash of the
/// URL if no suitable filename can be extracted.
pub fn url_to_filename(url: &str) -> String {
  if let Some(filename) = url.split(['?', '#']).next().and_then(|u| u.rsplit('/').next()) {
    let sanitized: String = filename
      .chars()
      .map(|c| {
        if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
          c
        } else {
          '_'
        }
      })
      .collect();

    if !sanitized.is_empty() && sanitized != "." && sanitized != ".." {
      return sanitized;
    }
  }

  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  format!("download_{}", &hex::encode(hasher.finalize())[..16])
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  const INDEX: &str = r#"{
    "packages": {
      "binaries": {
        "official": [{ "id": "binary:rg", "name": "rg", "version": "14.1.0" }],
        "community": [{ "id": "binary:rg", "name": "rg", "version": "0.0.1" }, { "id": "jq", "name": "jq" }]
      },
      "stacks": { "official": [{ "id": "stack:notes", "name": "notes", "path": "stacks/notes" }] }
    }
  }"#;

  fn local_client(temp: &TempDir) -> RegistryClient {
    let index = temp.path().join("registry").join("index.json");
    std::fs::create_dir_all(index.parent().unwrap()).unwrap();
    std::fs::write(&index, INDEX).unwrap();
    RegistryClient::new(RegistryConfig::local(index), temp.path().join("cache/registry.json"))
  }

  mod filenames {
    use super::*;

    #[test]
    fn url_to_filename_simple() {
      assert_eq!(url_to_filename("https://example.com/file.tar.gz"), "file.tar.gz");
    }

    #[test]
    fn url_to_filename_with_query() {
      assert_eq!(url_to_filename("https://example.com/file.tar.gz?token=abc"), "file.tar.gz");
    }

    #[test]
    fn url_to_filename_fallback_for_empty() {
      assert!(url_to_filename("https://example.com/").starts_with("download_"));
    }

    #[test]
    fn relative_paths_cannot_escape() {
      assert!(checked_relative("stacks/../../etc/passwd").is_err());
      assert_eq!(checked_relative("/stacks/notes").unwrap(), "stacks/notes");
    }
  }

  mod lookup {
    use super::*;

    #[tokio::test]
    async fn official_entries_win() {
      let temp = TempDir::new().unwrap();
      let client = local_client(&temp);

      let entry = client.find_entry(PackageKind::Binary, "rg").await.unwrap().unwrap();
      assert_eq!(entry.version.as_deref(), Some("14.1.0"));
    }

    #[tokio::test]
    async fn matches_bare_id_and_pkg_kind_shares_binaries() {
      let temp = TempDir::new().unwrap();
      let client = local_client(&temp);

      assert!(client.find_entry(PackageKind::Binary, "jq").await.unwrap().is_some());
      assert!(client.find_entry(PackageKind::Package, "rg").await.unwrap().is_some());
      assert!(client.find_entry(PackageKind::Agent, "rg").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reads_and_lists_local_sources() {
      let temp = TempDir::new().unwrap();
      let client = local_client(&temp);
      let stack_dir = temp.path().join("registry/stacks/notes");
      std::fs::create_dir_all(stack_dir.join("src")).unwrap();
      std::fs::write(stack_dir.join("manifest.json"), r#"{ "bins": ["notes"] }"#).unwrap();

      let manifest = client.fetch_package_manifest("stacks/notes").await.unwrap().unwrap();
      assert_eq!(manifest.bins, vec!["notes"]);

      let listing = client.list_source_dir("stacks/notes").await.unwrap().unwrap();
      let names: Vec<_> = listing.iter().map(|e| (e.name.as_str(), e.is_dir())).collect();
      assert_eq!(names, vec![("manifest.json", false), ("src", true)]);

      assert!(client.read_source("stacks/notes/missing.txt").await.unwrap().is_none());
    }
  }

  mod remote {
    use super::*;

    #[tokio::test]
    async fn fetches_and_caches_index() {
      let mut server = mockito::Server::new_async().await;
      let mock = server
        .mock("GET", "/index.json")
        .with_status(200)
        .with_body(INDEX)
        .expect(1)
        .create_async()
        .await;

      let temp = TempDir::new().unwrap();
      let cache = temp.path().join("cache/registry.json");
      let config = RegistryConfig {
        index_url: format!("{}/index.json", server.url()),
        ..RegistryConfig::default()
      };

      let client = RegistryClient::new(config.clone(), cache.clone());
      assert!(client.find_entry(PackageKind::Stack, "notes").await.unwrap().is_some());
      assert!(cache.exists());

      // A second client within the freshness window reads the cache only.
      let client = RegistryClient::new(config, cache);
      assert!(client.find_entry(PackageKind::Stack, "notes").await.unwrap().is_some());
      mock.assert_async().await;
    }

    #[tokio::test]
    async fn stale_cache_used_when_network_fails() {
      let mut server = mockito::Server::new_async().await;
      let _mock = server.mock("GET", "/index.json").with_status(500).create_async().await;

      let temp = TempDir::new().unwrap();
      let cache = temp.path().join("registry.json");
      std::fs::write(&cache, INDEX).unwrap();
      let old = SystemTime::now() - REGISTRY_CACHE_TTL - std::time::Duration::from_secs(60);
      std::fs::File::options()
        .write(true)
        .open(&cache)
        .unwrap()
        .set_modified(old)
        .unwrap();

      let config = RegistryConfig {
        index_url: format!("{}/index.json", server.url()),
        ..RegistryConfig::default()
      };
      let client = RegistryClient::new(config, cache);
      assert!(client.find_entry(PackageKind::Binary, "rg").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn download_reports_http_errors() {
      let mut server = mockito::Server::new_async().await;
      let _mock = server.mock("GET", "/a.tar.gz").with_status(503).create_async().await;

      let temp = TempDir::new().unwrap();
      let client = RegistryClient::new(RegistryConfig::default(), temp.path().join("c.json"));
      let err = client
        .download_to(&format!("{}/a.tar.gz", server.url()), &temp.path().join("a.tar.gz"))
        .await
        .unwrap_err();

      assert!(matches!(err, RegistryError::FetchFailed { ref message, .. } if message.contains("503")));
    }
  }
}
