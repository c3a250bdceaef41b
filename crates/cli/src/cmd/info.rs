//! Implementation of the `rudi info` command.

use anyhow::{Context, Result};
use serde_json::json;

use rudi_lib::RudiConfig;
use rudi_lib::install::Installer;
use rudi_lib::store_lock::{LockMode, StoreLock};

use crate::output::{OutputFormat, print_info, print_item, print_json, print_stat, print_success, symbols};

pub fn cmd_info(id: &str, output: OutputFormat) -> Result<()> {
  let config = RudiConfig::from_env();
  let _lock = StoreLock::acquire(&config.home, LockMode::Shared, "info").context("Failed to acquire store lock")?;

  let installer = Installer::new(config);
  let resolver = installer.resolver();

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let resolved = rt
    .block_on(resolver.resolve_package(id))
    .with_context(|| format!("Failed to resolve {}", id))?;
  let report = resolver.check_dependencies(&resolved);
  let order: Vec<_> = resolver.get_install_order(&resolved).into_iter().map(|p| p.id).collect();

  if output.is_json() {
    return print_json(&json!({
      "package": resolved,
      "dependencies": report,
      "installOrder": order,
    }));
  }

  if resolved.installed {
    print_success(&format!("{} {} (installed)", resolved.id, resolved.version));
  } else {
    print_info(&format!("{} {}", resolved.id, resolved.version));
  }
  if let Some(description) = &resolved.description {
    print_stat("Description", description);
  }
  print_stat("Path", &resolved.install_path.display().to_string());
  if !resolved.bins.is_empty() {
    print_stat("Bins", &resolved.bins.join(", "));
  }

  if !resolved.dependencies.is_empty() {
    println!();
    println!("Dependencies:");
    for dep in &resolved.dependencies {
      let symbol = if dep.installed { symbols::SUCCESS } else { symbols::ERROR };
      match &dep.constraint {
        Some(constraint) => print_item(symbol, &format!("{} {} ({})", dep.id, dep.version, constraint)),
        None => print_item(symbol, &format!("{} {}", dep.id, dep.version)),
      }
    }
  }

  if !order.is_empty() {
    println!();
    println!("Install order:");
    for id in &order {
      print_item(symbols::ARROW, &id.to_string());
    }
  }

  Ok(())
}
