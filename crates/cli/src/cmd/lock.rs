//! Implementation of the `rudi lock` subcommands.

use anyhow::{Context, Result, bail};
use clap::Subcommand;

use rudi_lib::store_lock::{LockMode, StoreLock};
use rudi_lib::{PackageId, RudiConfig, lock};

use crate::output::{OutputFormat, print_error, print_info, print_item, print_json, print_stat, print_success, symbols};

#[derive(Subcommand, Debug)]
pub enum LockCommand {
  /// Check a package's lock record against what is installed
  Verify {
    /// Package identifier
    id: String,
  },

  /// Remove lock records for packages that are no longer installed
  Clean,
}

pub fn cmd_lock(command: LockCommand, output: OutputFormat) -> Result<()> {
  let config = RudiConfig::from_env();

  match command {
    LockCommand::Verify { id } => {
      let _lock =
        StoreLock::acquire(&config.home, LockMode::Shared, "lock verify").context("Failed to acquire store lock")?;
      let id = PackageId::normalize_installed(&id).with_context(|| format!("Invalid package identifier: {}", id))?;
      let verification = lock::verify_lockfile(&config, &id).context("Failed to verify lock record")?;

      if output.is_json() {
        print_json(&verification)?;
      } else if verification.valid {
        print_success(&format!("Lock record for {} is valid", id));
      } else {
        for error in &verification.errors {
          print_error(error);
        }
      }

      if !verification.valid {
        bail!("Lock verification failed for {}", id);
      }
    }
    LockCommand::Clean => {
      let _lock =
        StoreLock::acquire(&config.home, LockMode::Exclusive, "lock clean").context("Failed to acquire store lock")?;
      let report = lock::clean_orphaned_lockfiles(&config).context("Failed to clean lock records")?;

      if output.is_json() {
        return print_json(&report);
      }

      if report.removed.is_empty() {
        print_info("No orphaned lock records.");
      } else {
        print_success("Removed orphaned lock records");
        for path in &report.removed {
          print_item(symbols::MINUS, &path.display().to_string());
        }
      }
      print_stat("Kept", &report.kept.to_string());
    }
  }

  Ok(())
}
