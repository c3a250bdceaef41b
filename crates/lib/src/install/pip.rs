//! pip-backed installs into a per-package virtual environment.
//!
//! `uv` is used when it is on `PATH`; otherwise `python3 -m venv` and the
//! venv's own pip.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::InstallError;
use super::cmd;
use super::manifest::{InstallSource, InstallType, InstalledManifest};
use crate::resolve::ResolvedPackage;

pub const VENV_DIR: &str = "venv";

#[cfg(windows)]
const PYTHON: &str = "python";
#[cfg(not(windows))]
const PYTHON: &str = "python3";

/// Executable directory of the venv inside `install_dir`.
pub fn venv_bin_dir(install_dir: &Path) -> PathBuf {
  if cfg!(windows) {
    install_dir.join(VENV_DIR).join("Scripts")
  } else {
    install_dir.join(VENV_DIR).join("bin")
  }
}

pub async fn install(package: &ResolvedPackage, pip_package: &str, version: &str) -> Result<InstalledManifest, InstallError> {
  let dir = &package.install_path;
  tokio::fs::create_dir_all(dir).await?;

  let requirement = if version.is_empty() || version == "latest" {
    pip_package.to_string()
  } else {
    format!("{}=={}", pip_package, version)
  };
  pip_install(dir, &[requirement.as_str()]).await?;

  Ok(
    InstalledManifest::new(package.id.clone(), &package.name, version, InstallType::Pip)
      .with_bins(package.bins_or_name())
      .with_source(InstallSource::Pip {
        package: pip_package.to_string(),
        version: version.to_string(),
      }),
  )
}

/// Install a source tree's `requirements.txt` into its own venv.
pub async fn install_requirements(dir: &Path) -> Result<(), InstallError> {
  pip_install(dir, &["-r", "requirements.txt"]).await
}

async fn pip_install(dir: &Path, args: &[&str]) -> Result<(), InstallError> {
  let venv = dir.join(VENV_DIR);
  let python = venv_bin_dir(dir).join(if cfg!(windows) { "python.exe" } else { "python" });
  let venv_arg = venv.to_string_lossy();
  let python_arg = python.to_string_lossy();

  if which::which("uv").is_ok() {
    debug!(dir = %dir.display(), "creating venv with uv");
    cmd::run("uv", ["venv", &*venv_arg], dir).await?;

    let mut uv_args = vec!["pip", "install", "--python", &*python_arg];
    uv_args.extend_from_slice(args);
    cmd::run("uv", uv_args, dir).await?;
  } else {
    debug!(dir = %dir.display(), "creating venv with python -m venv");
    cmd::run(PYTHON, ["-m", "venv", &*venv_arg], dir).await?;

    let mut pip_args = vec!["-m", "pip", "install"];
    pip_args.extend_from_slice(args);
    cmd::run(&*python_arg, pip_args, dir).await?;
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(unix)]
  #[test]
  fn venv_executables_live_in_bin() {
    assert_eq!(venv_bin_dir(Path::new("/r/binaries/httpie")), PathBuf::from("/r/binaries/httpie/venv/bin"));
  }
}
