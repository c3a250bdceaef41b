//! Implementation of the `rudi install` command.

use std::time::Instant;

use anyhow::{Context, Result};
use tracing::debug;

use rudi_lib::RudiConfig;
use rudi_lib::install::{InstallOptions, Installer, PackageOutcome};
use rudi_lib::store_lock::{LockMode, StoreLock};

use crate::output::{
  OutputFormat, format_duration, print_info, print_item, print_json, print_stat, print_success, print_warning, symbols,
};

/// Execute the install command.
///
/// Resolves the package, installs whatever it needs that is missing in
/// dependency order, then publishes shims and writes the lock record.
/// Degraded installs and missing secrets are printed as warnings.
pub fn cmd_install(id: &str, force: bool, allow_scripts: bool, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let config = RudiConfig::from_env();

  let _lock = StoreLock::acquire(&config.home, LockMode::Exclusive, "install").context("Failed to acquire store lock")?;

  debug!(home = %config.home.display(), "store locked");

  let installer = Installer::new(config);
  let options = InstallOptions { force, allow_scripts };

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt
    .block_on(installer.install_package(id, &options))
    .with_context(|| format!("Failed to install {}", id))?;

  if output.is_json() {
    return print_json(&report);
  }

  if report.already_installed {
    print_info(&format!("{} is already installed (use --force to reinstall)", report.package));
    return Ok(());
  }

  for result in &report.results {
    match result.outcome {
      PackageOutcome::Installed => print_success(&format!("{} {}", result.id, result.version)),
      PackageOutcome::Degraded { .. } => print_warning(&format!("{} {} (placeholder)", result.id, result.version)),
    }
    for shim in &result.shims {
      print_item(symbols::ARROW, shim);
    }
  }

  for warning in &report.warnings {
    print_warning(warning);
  }

  println!();
  print_stat("Installed", &report.results.len().to_string());
  print_stat("Degraded", &report.degraded().count().to_string());
  print_stat("Duration", &format_duration(start.elapsed()));

  Ok(())
}
