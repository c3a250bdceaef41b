//! Implementation of the `rudi uninstall` command.

use anyhow::{Context, Result};

use rudi_lib::RudiConfig;
use rudi_lib::install::Installer;
use rudi_lib::store_lock::{LockMode, StoreLock};

use crate::output::{OutputFormat, print_info, print_item, print_json, print_success, symbols};
use crate::prompts::confirm;

pub fn cmd_uninstall(id: &str, force: bool, output: OutputFormat) -> Result<()> {
  if !confirm(&format!("Uninstall {}?", id), force)? {
    print_info("Aborted");
    return Ok(());
  }

  let config = RudiConfig::from_env();
  let _lock =
    StoreLock::acquire(&config.home, LockMode::Exclusive, "uninstall").context("Failed to acquire store lock")?;

  let report = Installer::new(config)
    .uninstall_package(id)
    .with_context(|| format!("Failed to uninstall {}", id))?;

  if output.is_json() {
    return print_json(&report);
  }

  if !report.removed && !report.lock_removed && report.shims_removed.is_empty() {
    print_info(&format!("{} is not installed", report.package));
    return Ok(());
  }

  print_success(&format!("Uninstalled {}", report.package));
  for shim in &report.shims_removed {
    print_item(symbols::MINUS, shim);
  }

  Ok(())
}
