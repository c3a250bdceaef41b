//! Packages provided by the host system.
//!
//! Nothing is downloaded; each command is located on `PATH` and recorded so
//! the shim manager can point at it.

use std::collections::BTreeMap;

use tracing::debug;

use super::InstallError;
use super::manifest::{InstallSource, InstallType, InstalledManifest};
use crate::resolve::ResolvedPackage;

pub async fn install(package: &ResolvedPackage, commands: &[String]) -> Result<InstalledManifest, InstallError> {
  let mut bin_paths = BTreeMap::new();
  for command in commands {
    let path = which::which(command).map_err(|_| InstallError::ExecutableNotFound {
      package: package.id.clone(),
      bin: command.clone(),
    })?;
    debug!(command = %command, path = %path.display(), "found system executable");
    bin_paths.insert(command.clone(), path);
  }

  tokio::fs::create_dir_all(&package.install_path).await?;

  let mut manifest = InstalledManifest::new(package.id.clone(), &package.name, &package.version, InstallType::System)
    .with_bins(commands.to_vec())
    .with_source(InstallSource::System);
  manifest.bin_paths = bin_paths;
  Ok(manifest)
}
