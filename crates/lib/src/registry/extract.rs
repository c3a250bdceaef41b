//! Archive extraction.
//!
//! Supports:
//! - `.zip`
//! - `.tar.gz` / `.tgz`
//! - `.tar.xz` / `.txz`
//! - `.tar`
//! - raw executables (copied as-is)
//!
//! Entries are unpacked below `dest` after dropping `strip` leading path
//! components. Entries that would land outside `dest` are rejected.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info};
use xz2::read::XzDecoder;

use super::RegistryError;
use super::types::ArchiveFormat;

/// Extract on a blocking thread.
pub async fn extract_archive(
  archive: PathBuf,
  dest: PathBuf,
  format: ArchiveFormat,
  strip: usize,
) -> Result<(), RegistryError> {
  let archive_for_err = archive.clone();
  tokio::task::spawn_blocking(move || extract_archive_blocking(&archive, &dest, format, strip))
    .await
    .map_err(|e| RegistryError::Extract {
      path: archive_for_err,
      message: e.to_string(),
    })?
}

pub fn extract_archive_blocking(
  archive: &Path,
  dest: &Path,
  format: ArchiveFormat,
  strip: usize,
) -> Result<(), RegistryError> {
  fs::create_dir_all(dest)?;
  debug!(archive = %archive.display(), ?format, strip, "extracting");

  match format {
    ArchiveFormat::TarGz => unpack_tar(GzDecoder::new(BufReader::new(File::open(archive)?)), archive, dest, strip)?,
    ArchiveFormat::TarXz => unpack_tar(XzDecoder::new(BufReader::new(File::open(archive)?)), archive, dest, strip)?,
    ArchiveFormat::Tar => unpack_tar(BufReader::new(File::open(archive)?), archive, dest, strip)?,
    ArchiveFormat::Zip => unpack_zip(archive, dest, strip)?,
    ArchiveFormat::Raw => {
      let name = archive.file_name().ok_or_else(|| RegistryError::Extract {
        path: archive.to_path_buf(),
        message: "download has no file name".to_string(),
      })?;
      fs::copy(archive, dest.join(name))?;
    }
  }

  info!(dest = %dest.display(), "unpacked");
  Ok(())
}

/// Drop `strip` leading components and reject anything but plain names.
fn stripped_path(path: &Path, strip: usize) -> Option<PathBuf> {
  let mut out = PathBuf::new();
  for component in path.components().filter(|c| !matches!(c, Component::CurDir)).skip(strip) {
    match component {
      Component::Normal(part) => out.push(part),
      _ => return None,
    }
  }
  if out.as_os_str().is_empty() { None } else { Some(out) }
}

/// Whether a symlink at `link` pointing at `target` resolves inside the root.
///
/// Both paths are relative to the extraction root; the check is lexical.
fn link_stays_inside(link: &Path, target: &Path) -> bool {
  let mut depth = link.components().count().saturating_sub(1);
  for component in target.components() {
    match component {
      Component::CurDir => {}
      Component::Normal(_) => depth += 1,
      Component::ParentDir => match depth.checked_sub(1) {
        Some(up) => depth = up,
        None => return false,
      },
      Component::RootDir | Component::Prefix(_) => return false,
    }
  }
  true
}

/// Whether `path` (or its nearest existing ancestor) resolves below `root`.
fn resolves_inside(root: &Path, path: &Path) -> std::io::Result<bool> {
  match path.ancestors().find(|p| p.exists()) {
    Some(existing) => Ok(fs::canonicalize(existing)?.starts_with(root)),
    None => Ok(false),
  }
}

fn unpack_tar<R: Read>(reader: R, archive_path: &Path, dest: &Path, strip: usize) -> Result<(), RegistryError> {
  let extract_err = |e: std::io::Error| RegistryError::Extract {
    path: archive_path.to_path_buf(),
    message: e.to_string(),
  };
  let escapes = |entry: &Path| RegistryError::Extract {
    path: archive_path.to_path_buf(),
    message: format!("entry {} escapes the extraction directory", entry.display()),
  };

  let root = fs::canonicalize(dest)?;
  let mut archive = Archive::new(reader);
  archive.set_preserve_permissions(true);

  for entry in archive.entries().map_err(extract_err)? {
    let mut entry = entry.map_err(extract_err)?;
    let path = entry.path().map_err(extract_err)?.into_owned();

    let Some(stripped) = stripped_path(&path, strip) else {
      continue;
    };

    let dest_path = dest.join(&stripped);
    if !resolves_inside(&root, &dest_path)? {
      return Err(escapes(&path));
    }
    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent)?;
    }

    let entry_type = entry.header().entry_type();
    if entry_type.is_symlink() || entry_type.is_hard_link() {
      let target = entry
        .link_name()
        .map_err(extract_err)?
        .ok_or_else(|| escapes(&path))?
        .into_owned();

      if entry_type.is_hard_link() {
        // Hard link targets are archive paths.
        let source = stripped_path(&target, strip)
          .map(|t| dest.join(t))
          .ok_or_else(|| escapes(&path))?;
        if !resolves_inside(&root, &source)? {
          return Err(escapes(&path));
        }
        if dest_path.symlink_metadata().is_ok() {
          fs::remove_file(&dest_path)?;
        }
        fs::hard_link(&source, &dest_path)?;
        continue;
      }

      if !link_stays_inside(&stripped, &target) {
        return Err(escapes(&path));
      }
    }

    entry.unpack(&dest_path).map_err(extract_err)?;
  }

  Ok(())
}

fn unpack_zip(archive_path: &Path, dest: &Path, strip: usize) -> Result<(), RegistryError> {
  let extract_err = |message: String| RegistryError::Extract {
    path: archive_path.to_path_buf(),
    message,
  };

  let file = File::open(archive_path)?;
  let mut archive =
    zip::ZipArchive::new(BufReader::new(file)).map_err(|e| extract_err(format!("failed to open zip: {}", e)))?;

  for i in 0..archive.len() {
    let mut file = archive
      .by_index(i)
      .map_err(|e| extract_err(format!("failed to read zip entry: {}", e)))?;

    let Some(path) = file.enclosed_name() else {
      return Err(extract_err(format!("invalid zip entry name: {}", file.name())));
    };

    let Some(stripped) = stripped_path(&path, strip) else {
      continue;
    };
    let dest_path = dest.join(&stripped);

    if file.is_dir() {
      fs::create_dir_all(&dest_path)?;
      continue;
    }

    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent)?;
    }

    let mut outfile = File::create(&dest_path)?;
    std::io::copy(&mut file, &mut outfile)?;

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      if let Some(mode) = file.unix_mode() {
        fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode))?;
      }
    }
  }

  Ok(())
}
