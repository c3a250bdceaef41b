//! Implementation of the `rudi list` command.

use anyhow::{Context, Result};

use rudi_lib::RudiConfig;
use rudi_lib::install::Installer;
use rudi_lib::store_lock::{LockMode, StoreLock};

use crate::output::{OutputFormat, print_info, print_json, print_success, print_warning};

pub fn cmd_list(output: OutputFormat) -> Result<()> {
  let config = RudiConfig::from_env();
  let _lock = StoreLock::acquire(&config.home, LockMode::Shared, "list").context("Failed to acquire store lock")?;

  let packages = Installer::new(config)
    .list_installed()
    .context("Failed to list installed packages")?;

  if output.is_json() {
    return print_json(&packages);
  }

  if packages.is_empty() {
    print_info("No packages installed.");
    return Ok(());
  }

  for package in &packages {
    let label = match &package.version {
      Some(version) => format!("{} {}", package.id, version),
      None => package.id.to_string(),
    };
    if package.placeholder {
      print_warning(&format!("{} (placeholder, reinstall with --force)", label));
    } else {
      print_success(&label);
    }
  }

  Ok(())
}
