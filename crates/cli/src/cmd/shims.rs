//! Implementation of the `rudi shims` command.

use anyhow::{Context, Result, bail};

use rudi_lib::RudiConfig;
use rudi_lib::shim::{ShimManager, ShimValidation};
use rudi_lib::store_lock::{LockMode, StoreLock};

use crate::output::{OutputFormat, print_error, print_info, print_json, print_success, symbols};

/// List shims, or with `check` validate each one and fail if any is broken.
pub fn cmd_shims(check: bool, output: OutputFormat) -> Result<()> {
  let config = RudiConfig::from_env();
  let _lock = StoreLock::acquire(&config.home, LockMode::Shared, "shims").context("Failed to acquire store lock")?;

  let manager = ShimManager::new(&config);
  let registry = manager.list_shims().context("Failed to read shim registry")?;

  if !check {
    if output.is_json() {
      return print_json(registry.entries());
    }
    if registry.entries().is_empty() {
      print_info("No shims published.");
    }
    for (bin, entry) in registry.entries() {
      println!(
        "{} {} {} ({})",
        bin,
        symbols::ARROW,
        entry.target.display(),
        entry.owner
      );
    }
    return Ok(());
  }

  let validations: Vec<ShimValidation> = registry.entries().keys().map(|bin| manager.validate_shim(bin)).collect();
  let broken = validations.iter().filter(|v| !v.valid).count();

  if output.is_json() {
    print_json(&validations)?;
  } else {
    for validation in &validations {
      if validation.valid {
        print_success(&validation.bin);
      } else {
        print_error(&format!(
          "{}: {}",
          validation.bin,
          validation.error.as_deref().unwrap_or("invalid")
        ));
      }
    }
  }

  if broken > 0 {
    bail!("{} broken shim(s); reinstall the owning packages", broken);
  }
  Ok(())
}
