//! Prebuilt archive installs for runtimes and binaries.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use super::InstallError;
use super::manifest::{InstallSource, InstallType, InstalledManifest};
use crate::config::RudiConfig;
use crate::platform::Platform;
use crate::registry::{ArchiveFormat, DownloadSpec, RegistryClient, extract_archive, url_to_filename};
use crate::resolve::ResolvedPackage;

/// The download matching the current platform, if any.
pub fn select_download<'a>(
  downloads: &'a BTreeMap<String, DownloadSpec>,
  platform: Option<Platform>,
) -> Option<&'a DownloadSpec> {
  platform?
    .download_keys()
    .iter()
    .find_map(|key| downloads.get(key))
}

pub async fn install(
  config: &RudiConfig,
  registry: &RegistryClient,
  package: &ResolvedPackage,
  downloads: &BTreeMap<String, DownloadSpec>,
) -> Result<InstalledManifest, InstallError> {
  let platform = Platform::current();
  let spec = select_download(downloads, platform).ok_or_else(|| InstallError::UnsupportedPlatform {
    package: package.id.clone(),
    platform: platform.map(|p| p.tag()).unwrap_or_else(|| "unknown".to_string()),
  })?;
  let url = spec.resolved_url(&package.version);
  let format = spec.archive_format();

  // Dropping the scratch directory removes the download on every path.
  tokio::fs::create_dir_all(config.downloads_dir()).await?;
  let scratch = tempfile::Builder::new()
    .prefix("rudi-download-")
    .tempdir_in(config.downloads_dir())?;
  let archive = scratch.path().join(url_to_filename(&url));

  registry.download_to(&url, &archive).await?;

  let dest = &package.install_path;
  extract_archive(archive.clone(), dest.clone(), format, spec.strip).await?;

  let bins = package.bins_or_name();
  if format == ArchiveFormat::Raw
    && let (Some(bin), Some(file_name)) = (bins.first(), archive.file_name())
  {
    let copied = dest.join(file_name);
    let renamed = dest.join(exe_name(bin));
    if copied != renamed && !spec.bin_paths.contains_key(bin) {
      tokio::fs::rename(&copied, &renamed).await?;
    }
  }

  let mut bin_paths = BTreeMap::new();
  for bin in &bins {
    let found = locate_executable(dest, bin, spec.bin_paths.get(bin).map(String::as_str)).ok_or_else(|| {
      InstallError::ExecutableNotFound {
        package: package.id.clone(),
        bin: bin.clone(),
      }
    })?;
    make_executable(&found)?;
    let relative = found.strip_prefix(dest).map(Path::to_path_buf).unwrap_or(found);
    debug!(bin = %bin, path = %relative.display(), "located executable");
    bin_paths.insert(bin.clone(), relative);
  }

  info!(package = %package.id, version = %package.version, "installed from archive");
  let mut manifest = InstalledManifest::new(package.id.clone(), &package.name, &package.version, InstallType::Binary)
    .with_bins(bins)
    .with_source(InstallSource::Download { url });
  manifest.bin_paths = bin_paths;
  Ok(manifest)
}

/// Find `bin` below `root`.
///
/// A declared path may contain glob segments (`node-*/bin/node`). Without
/// one, `bin/<bin>` and `<bin>` are tried before searching the whole tree.
pub fn locate_executable(root: &Path, bin: &str, declared: Option<&str>) -> Option<PathBuf> {
  if let Some(declared) = declared {
    let pattern = root.join(declared);
    return glob::glob(&pattern.to_string_lossy())
      .ok()?
      .filter_map(Result::ok)
      .find(|path| path.is_file());
  }

  let name = exe_name(bin);
  for candidate in [root.join("bin").join(&name), root.join(&name)] {
    if candidate.is_file() {
      return Some(candidate);
    }
  }

  WalkDir::new(root)
    .into_iter()
    .filter_map(Result::ok)
    .find(|entry| entry.file_type().is_file() && entry.file_name() == name.as_str())
    .map(|entry| entry.into_path())
}

fn exe_name(bin: &str) -> String {
  if cfg!(windows) && !bin.ends_with(".exe") {
    format!("{}.exe", bin)
  } else {
    bin.to_string()
  }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
  use std::os::unix::fs::PermissionsExt;

  let mut perms = std::fs::metadata(path)?.permissions();
  perms.set_mode(perms.mode() | 0o755);
  std::fs::set_permissions(path, perms)
}

#[cfg(windows)]
fn make_executable(_path: &Path) -> std::io::Result<()> {
  Ok(())
}
