//! Package installation.
//!
//! [`Installer::install_package`] resolves a package, plans its missing
//! dependencies, installs each plan entry in order through the mechanism its
//! install details call for, publishes shims, and records a lock entry.
//!
//! Mechanisms differ in how failure is handled: archive downloads degrade to a
//! placeholder manifest (see [`InstallMechanism::degrade_on_failure`]), every
//! other failure aborts the batch.

mod binary;
mod cmd;
pub mod manifest;
mod npm;
pub mod pip;
mod source;
mod system;
mod types;

use std::sync::Arc;

use tracing::{debug, info, warn};

pub use manifest::{InstallSource, InstallType, InstalledManifest, ManifestError};
pub use types::{
  InstallError, InstallMechanism, InstallOptions, InstallReport, InstalledPackage, PackageOutcome, PackageResult,
  UninstallReport,
};

use crate::config::RudiConfig;
use crate::lock;
use crate::package::{PackageId, PackageKind};
use crate::registry::RegistryClient;
use crate::resolve::{
  Ecosystem, InstallDetails, ResolveError, ResolvedPackage, Resolver, satisfies_version, short_name,
};
use crate::secrets::{EnvSecretStore, SecretStore, missing_secrets};
use crate::shim::ShimManager;

pub struct Installer {
  config: RudiConfig,
  registry: Arc<RegistryClient>,
  resolver: Resolver,
  shims: ShimManager,
  secrets: Box<dyn SecretStore>,
}

impl Installer {
  pub fn new(config: RudiConfig) -> Self {
    let registry = Arc::new(RegistryClient::new(
      config.registry.clone(),
      config.registry_cache_path(),
    ));
    Self::with_registry(config, registry)
  }

  pub fn with_registry(config: RudiConfig, registry: Arc<RegistryClient>) -> Self {
    Self {
      resolver: Resolver::new(config.clone(), registry.clone()),
      shims: ShimManager::new(&config),
      secrets: Box::new(EnvSecretStore),
      registry,
      config,
    }
  }

  pub fn with_secrets(mut self, secrets: impl SecretStore + 'static) -> Self {
    self.secrets = Box::new(secrets);
    self
  }

  pub fn config(&self) -> &RudiConfig {
    &self.config
  }

  pub fn resolver(&self) -> &Resolver {
    &self.resolver
  }

  pub fn shims(&self) -> &ShimManager {
    &self.shims
  }

  /// Install a package and whatever it needs that is missing.
  pub async fn install_package(&self, input: &str, options: &InstallOptions) -> Result<InstallReport, InstallError> {
    let resolved = self.resolver.resolve_package(input).await?;
    let mut plan = self.resolver.get_install_order(&resolved);

    if plan.is_empty() && resolved.installed && !options.force {
      info!(package = %resolved.id, "already installed");
      return Ok(InstallReport::already_installed(resolved.id));
    }

    if options.force && !plan.iter().any(|p| p.id == resolved.id) {
      plan.push(resolved.clone());
    }

    if !options.force {
      self.check_constraints(&resolved)?;
    }

    let mut report = InstallReport {
      package: resolved.id.clone(),
      already_installed: false,
      results: Vec::with_capacity(plan.len()),
      collisions: Vec::new(),
      warnings: Vec::new(),
    };

    for name in missing_secrets(self.secrets.as_ref(), &resolved.requires.secrets) {
      warn!(package = %resolved.id, secret = %name, "required secret is not set");
      report.warnings.push(format!("secret {} is not set; {} needs it to run", name, resolved.id));
    }

    info!(package = %resolved.id, steps = plan.len(), "installing");
    for package in &plan {
      let (result, collisions) = self
        .install_single_package(package, options)
        .await
        .map_err(|e| InstallError::PackageFailed {
          package: package.id.clone(),
          source: Box::new(e),
        })?;

      if let PackageOutcome::Degraded { error } = &result.outcome {
        report
          .warnings
          .push(format!("{} was not installed ({}); a placeholder was recorded", package.id, error));
      }
      for collision in &collisions {
        report.warnings.push(format!(
          "{} now points at {} (was {})",
          collision.bin, collision.new_owner, collision.previous_owner
        ));
      }
      report.collisions.extend(collisions);
      report.results.push(result);
    }

    lock::write_lockfile(&self.config, &resolved)?;
    Ok(report)
  }

  /// Install one package, ignoring its dependencies.
  ///
  /// Returns the result plus any shim collisions.
  pub async fn install_single_package(
    &self,
    package: &ResolvedPackage,
    options: &InstallOptions,
  ) -> Result<(PackageResult, Vec<crate::shim::ShimCollision>), InstallError> {
    let mechanism = InstallMechanism::for_package(package);
    debug!(package = %package.id, ?mechanism, "installing package");

    // A reinstall starts from an empty directory.
    if mechanism != InstallMechanism::Prompt && package.install_path.is_dir() {
      tokio::fs::remove_dir_all(&package.install_path).await?;
    }

    let allow_scripts = options.allow_scripts || self.config.allow_scripts;
    let installed = match (&package.install_details, mechanism) {
      (_, InstallMechanism::Prompt) => {
        let path = match &package.install_details {
          InstallDetails::Source { path } => path.clone(),
          _ => format!("prompts/{}.md", package.id.name),
        };
        source::install_prompt(&self.registry, package, &path).await.map(|_| None)
      }
      (
        InstallDetails::Ecosystem {
          ecosystem: Ecosystem::Npm,
          package: npm_package,
          version,
        },
        _,
      ) => npm::install(package, npm_package, version, allow_scripts).await.map(Some),
      (
        InstallDetails::Ecosystem {
          ecosystem: Ecosystem::Pip,
          package: pip_package,
          version,
        },
        _,
      ) => pip::install(package, pip_package, version).await.map(Some),
      (InstallDetails::Binary { downloads }, _) => binary::install(&self.config, &self.registry, package, downloads)
        .await
        .map(Some),
      (InstallDetails::System { commands }, _) => system::install(package, commands).await.map(Some),
      (InstallDetails::Source { path }, _) => source::install_tree(&self.registry, package, path, allow_scripts)
        .await
        .map(Some),
      (InstallDetails::None, _) => fallback(package).await.map(Some),
    };

    let (manifest, outcome) = match installed {
      Ok(manifest) => (manifest, PackageOutcome::Installed),
      Err(e) if mechanism.degrade_on_failure() => {
        warn!(package = %package.id, error = %e, "install failed, recording placeholder");
        let placeholder = placeholder(package, &e);
        (Some(placeholder), PackageOutcome::Degraded { error: e.to_string() })
      }
      Err(e) => return Err(e),
    };

    let mut shims = Vec::new();
    let mut collisions = Vec::new();
    if let Some(manifest) = manifest {
      manifest.save(&package.install_path)?;
      if outcome == PackageOutcome::Installed {
        let report = self.shims.create_shims_for_tool(&manifest, &package.install_path)?;
        shims = report.created;
        collisions = report.collisions;
      }
    }

    info!(package = %package.id, version = %package.version, ?mechanism, "done");
    Ok((
      PackageResult {
        id: package.id.clone(),
        version: package.version.clone(),
        mechanism,
        install_path: package.install_path.clone(),
        outcome,
        shims,
      },
      collisions,
    ))
  }

  /// Check each dependency edge's version constraint.
  ///
  /// Installed dependencies are judged by their manifest version, the rest by
  /// the version about to be installed. Unknown versions are not judged.
  fn check_constraints(&self, resolved: &ResolvedPackage) -> Result<(), InstallError> {
    for dep in &resolved.dependencies {
      let Some(constraint) = &dep.constraint else {
        continue;
      };

      let version = if dep.installed {
        InstalledManifest::load(&dep.install_path)
          .ok()
          .flatten()
          .filter(|m| !m.is_placeholder())
          .map(|m| m.version)
          .unwrap_or_else(|| dep.version.clone())
      } else {
        dep.version.clone()
      };

      if version == "latest" {
        debug!(dependency = %dep.id, "version unknown, constraint not checked");
        continue;
      }

      if !satisfies_version(&version, Some(constraint)) {
        return Err(InstallError::DependencyUnsatisfied {
          package: resolved.id.clone(),
          dependency: dep.id.clone(),
          constraint: constraint.clone(),
          found: version,
        });
      }
    }
    Ok(())
  }

  /// Remove a package's shims, files and lock record.
  pub fn uninstall_package(&self, input: &str) -> Result<UninstallReport, InstallError> {
    let id = PackageId::normalize_installed(input).map_err(ResolveError::from)?;
    let path = self.config.install_path(&id);

    let bins = match InstalledManifest::load(&path) {
      Ok(Some(manifest)) => manifest.bins,
      _ => vec![short_name(&id.name)],
    };

    // Names another package has since taken over stay put.
    let registry = self.shims.list_shims()?;
    let owned: Vec<String> = bins
      .into_iter()
      .filter(|bin| match registry.get(bin) {
        Some(entry) if entry.owner != id => {
          debug!(bin = %bin, owner = %entry.owner, "shim owned by another package, keeping");
          false
        }
        _ => true,
      })
      .collect();
    let shims = self.shims.remove_shims(&owned)?;

    let removed = if path.is_dir() {
      std::fs::remove_dir_all(&path)?;
      true
    } else if path.is_file() {
      std::fs::remove_file(&path)?;
      true
    } else {
      false
    };

    let lock_removed = lock::delete_lockfile(&self.config, &id)?;
    info!(package = %id, removed, "uninstalled");

    Ok(UninstallReport {
      package: id,
      removed,
      shims_removed: shims.removed,
      lock_removed,
    })
  }

  /// Everything currently installed, by kind then name.
  pub fn list_installed(&self) -> Result<Vec<InstalledPackage>, InstallError> {
    let mut packages = Vec::new();

    for kind in PackageKind::STORED {
      let dir = self.config.kind_dir(kind);
      let mut entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries.filter_map(Result::ok).map(|e| e.path()).collect::<Vec<_>>(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
        Err(e) => return Err(e.into()),
      };
      entries.sort();

      for path in entries {
        if kind == PackageKind::Prompt {
          if path.extension().is_some_and(|ext| ext == "md")
            && let Some(stem) = path.file_stem()
          {
            packages.push(InstalledPackage {
              id: PackageId::new(kind, stem.to_string_lossy()),
              version: None,
              install_type: Some(InstallType::Prompt),
              placeholder: false,
              path,
            });
          }
          continue;
        }

        if !path.is_dir() {
          continue;
        }
        let manifest = match InstalledManifest::load(&path) {
          Ok(manifest) => manifest,
          Err(e) => {
            debug!(path = %path.display(), error = %e, "unreadable manifest");
            None
          }
        };
        let dir_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

        packages.push(match manifest {
          Some(m) => InstalledPackage {
            placeholder: m.is_placeholder(),
            id: m.id,
            version: Some(m.version),
            install_type: Some(m.install_type),
            path,
          },
          None => InstalledPackage {
            id: PackageId::new(kind, dir_name),
            version: None,
            install_type: None,
            placeholder: false,
            path,
          },
        });
      }
    }

    Ok(packages)
  }
}

/// Minimal manifest for packages with no install mechanism.
async fn fallback(package: &ResolvedPackage) -> Result<InstalledManifest, InstallError> {
  tokio::fs::create_dir_all(&package.install_path).await?;
  Ok(
    InstalledManifest::new(package.id.clone(), &package.name, &package.version, InstallType::None)
      .with_bins(package.bins.clone()),
  )
}

/// Manifest recording a degraded install.
fn placeholder(package: &ResolvedPackage, error: &InstallError) -> InstalledManifest {
  let url = match &package.install_details {
    InstallDetails::Binary { downloads } => {
      binary::select_download(downloads, crate::platform::Platform::current()).map(|d| d.resolved_url(&package.version))
    }
    _ => None,
  };

  InstalledManifest::new(package.id.clone(), &package.name, &package.version, InstallType::Binary)
    .with_bins(package.bins_or_name())
    .with_source(InstallSource::Failed {
      error: error.to_string(),
      url,
    })
}
