//! npm-backed installs.
//!
//! Each package gets a private npm project in its install directory;
//! executables end up in `node_modules/.bin`.

use std::path::Path;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::InstallError;
use super::cmd;
use super::manifest::{InstallSource, InstallType, InstalledManifest};
use crate::config::sanitize_name;
use crate::resolve::{ResolvedPackage, short_name};

#[cfg(windows)]
const NPM: &str = "npm.cmd";
#[cfg(not(windows))]
const NPM: &str = "npm";

pub async fn install(
  package: &ResolvedPackage,
  npm_package: &str,
  version: &str,
  allow_scripts: bool,
) -> Result<InstalledManifest, InstallError> {
  let dir = &package.install_path;
  tokio::fs::create_dir_all(dir).await?;
  ensure_package_json(dir, &package.name).await?;

  let mut args = vec![
    "install".to_string(),
    format!("{}@{}", npm_package, version),
    "--no-audit".to_string(),
    "--no-fund".to_string(),
  ];
  if !allow_scripts {
    args.push("--ignore-scripts".to_string());
  }
  cmd::run(NPM, &args, dir).await?;

  let installed = read_package_json(&dir.join("node_modules").join(npm_package)).await;
  let bins = if package.bins.is_empty() {
    let discovered = installed.as_ref().map(|pj| bins_from_package_json(pj, npm_package)).unwrap_or_default();
    debug!(package = %package.id, bins = ?discovered, "discovered executables");
    discovered
  } else {
    package.bins.clone()
  };

  if let Some(script) = &package.post_install {
    info!(package = %package.id, "running post-install command");
    cmd::run_shell(script, dir).await?;
  }

  let resolved_version = installed
    .as_ref()
    .and_then(|pj| pj.get("version"))
    .and_then(Value::as_str)
    .unwrap_or(version)
    .to_string();

  Ok(
    InstalledManifest::new(package.id.clone(), &package.name, &resolved_version, InstallType::Npm)
      .with_bins(bins)
      .with_source(InstallSource::Npm {
        package: npm_package.to_string(),
        version: resolved_version,
      }),
  )
}

/// Install a source tree's own `package.json` dependencies.
pub async fn install_dependencies(dir: &Path, allow_scripts: bool) -> Result<(), InstallError> {
  let mut args = vec!["install", "--no-audit", "--no-fund"];
  if !allow_scripts {
    args.push("--ignore-scripts");
  }
  cmd::run(NPM, args, dir).await.map(|_| ())
}

async fn ensure_package_json(dir: &Path, name: &str) -> Result<(), InstallError> {
  let path = dir.join("package.json");
  if tokio::fs::try_exists(&path).await? {
    return Ok(());
  }

  let doc = json!({
    "name": format!("rudi-{}", sanitize_name(name).to_lowercase()),
    "version": "0.0.0",
    "private": true,
  });
  tokio::fs::write(&path, serde_json::to_vec_pretty(&doc).unwrap_or_default()).await?;
  Ok(())
}

async fn read_package_json(dir: &Path) -> Option<Value> {
  let bytes = tokio::fs::read(dir.join("package.json")).await.ok()?;
  match serde_json::from_slice(&bytes) {
    Ok(value) => Some(value),
    Err(e) => {
      warn!(path = %dir.display(), error = %e, "unparsable package.json");
      None
    }
  }
}

/// Executable names from a `package.json` `bin` field.
///
/// A string `bin` is exposed under the unscoped package name.
fn bins_from_package_json(package_json: &Value, npm_package: &str) -> Vec<String> {
  match package_json.get("bin") {
    Some(Value::String(_)) => vec![short_name(npm_package)],
    Some(Value::Object(map)) => map.keys().cloned().collect(),
    _ => Vec::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn bin_field_forms() {
    let single = json!({ "name": "@anthropic-ai/claude-code", "bin": "cli.js" });
    assert_eq!(bins_from_package_json(&single, "@anthropic-ai/claude-code"), vec!["claude-code"]);

    let map = json!({ "bin": { "tsc": "bin/tsc", "tsserver": "bin/tsserver" } });
    assert_eq!(bins_from_package_json(&map, "typescript"), vec!["tsc", "tsserver"]);

    assert!(bins_from_package_json(&json!({}), "left-pad").is_empty());
  }

  #[tokio::test]
  async fn package_json_created_once() {
    let temp = TempDir::new().unwrap();
    ensure_package_json(temp.path(), "@scope/Tool").await.unwrap();

    let doc = read_package_json(temp.path()).await.unwrap();
    assert_eq!(doc["name"], "rudi-scope__tool");
    assert_eq!(doc["private"], true);

    std::fs::write(temp.path().join("package.json"), r#"{ "name": "mine" }"#).unwrap();
    ensure_package_json(temp.path(), "other").await.unwrap();
    assert_eq!(read_package_json(temp.path()).await.unwrap()["name"], "mine");
  }
}
