//! Installs fetched straight from the registry source tree: stacks and prompts.

use std::path::Path;

use tracing::{debug, info, warn};

use super::manifest::{InstallSource, InstallType, InstalledManifest};
use super::{InstallError, npm, pip};
use crate::consts::MANIFEST_FILENAME;
use crate::registry::RegistryClient;
use crate::resolve::ResolvedPackage;

/// Top-level files copied when present.
const OPTIONAL_FILES: [&str; 4] = ["package.json", ".env.example", "tsconfig.json", "requirements.txt"];

/// Source directories mirrored recursively when present.
const SOURCE_DIRS: [&str; 5] = ["src", "dist", "node", "python", "lib"];

pub async fn install_tree(
  registry: &RegistryClient,
  package: &ResolvedPackage,
  path: &str,
  allow_scripts: bool,
) -> Result<InstalledManifest, InstallError> {
  let root = path.trim_end_matches('/');
  let dest = &package.install_path;

  let manifest = registry
    .read_source(&format!("{}/{}", root, MANIFEST_FILENAME))
    .await?
    .ok_or_else(|| InstallError::ManifestMissing {
      package: package.id.clone(),
      path: root.to_string(),
    })?;

  tokio::fs::create_dir_all(dest).await?;
  tokio::fs::write(dest.join(MANIFEST_FILENAME), manifest).await?;

  for file in OPTIONAL_FILES {
    if let Some(bytes) = registry.read_source(&format!("{}/{}", root, file)).await? {
      debug!(file, "fetched");
      tokio::fs::write(dest.join(file), bytes).await?;
    }
  }

  for dir in SOURCE_DIRS {
    mirror_dir(registry, &format!("{}/{}", root, dir), &dest.join(dir)).await?;
  }

  install_ecosystem_dependencies(package, dest, allow_scripts).await;

  info!(package = %package.id, "installed source tree");
  Ok(
    InstalledManifest::new(package.id.clone(), &package.name, &package.version, InstallType::Source)
      .with_bins(package.bins.clone())
      .with_source(InstallSource::Registry { path: root.to_string() }),
  )
}

/// Recursively copy a registry directory. Missing directories are skipped.
async fn mirror_dir(registry: &RegistryClient, rel: &str, dest: &Path) -> Result<(), InstallError> {
  let Some(entries) = registry.list_source_dir(rel).await? else {
    return Ok(());
  };
  tokio::fs::create_dir_all(dest).await?;

  for entry in entries {
    if !is_plain_name(&entry.name) {
      warn!(dir = %rel, name = %entry.name, "skipping suspicious entry");
      continue;
    }

    let child_rel = format!("{}/{}", rel, entry.name);
    let child_dest = dest.join(&entry.name);
    if entry.is_dir() {
      Box::pin(mirror_dir(registry, &child_rel, &child_dest)).await?;
    } else if let Some(bytes) = registry.read_source(&child_rel).await? {
      tokio::fs::write(&child_dest, bytes).await?;
    }
  }

  Ok(())
}

fn is_plain_name(name: &str) -> bool {
  !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Install a stack's own npm and pip dependencies. Failures only warn.
async fn install_ecosystem_dependencies(package: &ResolvedPackage, dir: &Path, allow_scripts: bool) {
  if dir.join("package.json").exists()
    && let Err(e) = npm::install_dependencies(dir, allow_scripts).await
  {
    warn!(package = %package.id, error = %e, "npm dependencies not installed");
  }

  if dir.join("requirements.txt").exists()
    && let Err(e) = pip::install_requirements(dir).await
  {
    warn!(package = %package.id, error = %e, "python dependencies not installed");
  }
}

/// Fetch a prompt's markdown file to its install path.
pub async fn install_prompt(registry: &RegistryClient, package: &ResolvedPackage, path: &str) -> Result<(), InstallError> {
  let bytes = registry
    .read_source(path)
    .await?
    .ok_or_else(|| InstallError::SourceMissing {
      package: package.id.clone(),
      path: path.to_string(),
    })?;

  let dest = &package.install_path;
  if let Some(parent) = dest.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  tokio::fs::write(dest, bytes).await?;

  info!(package = %package.id, path = %dest.display(), "installed prompt");
  Ok(())
}
