//! Package resolution.
//!
//! Turns identifiers into [`ResolvedPackage`]s using the registry, resolves
//! their declared runtime, binary and agent requirements one level deep, and
//! plans a dependency-first install order.
//!
//! Only direct dependencies are resolved: a dependency's own requirements are
//! not expanded, so deeper chains and cycles are invisible to the planner.

mod graph;
mod types;
mod version;

use std::sync::Arc;

use tracing::{debug, warn};

pub use graph::{DependencyGraph, MAX_RESOLVE_DEPTH};
pub use types::{DependencyReport, Ecosystem, InstallDetails, ResolveError, ResolvedPackage, short_name};
pub use version::satisfies_version;

use crate::config::RudiConfig;
use crate::install::manifest::InstalledManifest;
use crate::package::{EcosystemSpec, PackageId, PackageIdError, PackageKind};
use crate::registry::{DependencySpec, RegistryClient, RegistryEntry};

pub struct Resolver {
  config: RudiConfig,
  registry: Arc<RegistryClient>,
}

impl Resolver {
  pub fn new(config: RudiConfig, registry: Arc<RegistryClient>) -> Self {
    Self { config, registry }
  }

  pub fn registry(&self) -> &RegistryClient {
    &self.registry
  }

  /// Resolve a package identifier and its direct dependencies.
  ///
  /// A bare name means `stack:<name>`. `pkg:` identifiers are parsed locally
  /// without consulting the registry.
  pub async fn resolve_package(&self, input: &str) -> Result<ResolvedPackage, ResolveError> {
    let id = PackageId::normalize(input)?;
    debug!(package = %id, "resolving");

    if id.kind == PackageKind::Package {
      return Ok(self.resolve_ecosystem(&id.name, None)?);
    }

    let mut entry = self
      .registry
      .find_entry(id.kind, &id.name)
      .await?
      .ok_or_else(|| ResolveError::NotFound(id.clone()))?;

    if let Some(path) = entry.path.clone() {
      match self.registry.fetch_package_manifest(&path).await {
        Ok(Some(manifest)) => entry.merge(manifest),
        Ok(None) => {}
        Err(e) => warn!(package = %id, error = %e, "could not fetch package manifest"),
      }
    }

    let mut resolved = self.from_entry(id, entry, None);
    resolved.dependencies = self.resolve_dependencies(&resolved).await;
    Ok(resolved)
  }

  /// Resolve the declared requirements of `package` one level deep.
  ///
  /// Requirements that cannot be parsed or found are dropped with a warning.
  pub async fn resolve_dependencies(&self, package: &ResolvedPackage) -> Vec<ResolvedPackage> {
    let mut dependencies = Vec::new();

    for (default_kind, spec) in package.requires.dependencies() {
      let (id, constraint) = match parse_dependency(spec, default_kind) {
        Ok(parsed) => parsed,
        Err(e) => {
          warn!(package = %package.id, error = %e, "skipping malformed dependency");
          continue;
        }
      };

      if id.kind == PackageKind::Package {
        match self.resolve_ecosystem(&id.name, constraint) {
          Ok(dep) => dependencies.push(dep),
          Err(e) => warn!(package = %package.id, dependency = %id, error = %e, "skipping dependency"),
        }
        continue;
      }

      match self.registry.find_entry(id.kind, &id.name).await {
        Ok(Some(entry)) => dependencies.push(self.from_entry(id, entry, constraint)),
        Ok(None) => warn!(package = %package.id, dependency = %id, "dependency not in registry, skipping"),
        Err(e) => warn!(package = %package.id, dependency = %id, error = %e, "dependency lookup failed, skipping"),
      }
    }

    dependencies
  }

  /// Collect every dependency in the tree that is not installed.
  pub fn check_dependencies(&self, resolved: &ResolvedPackage) -> DependencyReport {
    let missing = DependencyGraph::from_resolved(resolved).missing();
    DependencyReport {
      satisfied: missing.is_empty(),
      missing,
    }
  }

  /// Packages to install, dependencies first, without duplicates or installed packages.
  pub fn get_install_order(&self, resolved: &ResolvedPackage) -> Vec<ResolvedPackage> {
    DependencyGraph::from_resolved(resolved).install_order()
  }

  fn resolve_ecosystem(&self, spec: &str, constraint: Option<String>) -> Result<ResolvedPackage, PackageIdError> {
    let spec = EcosystemSpec::parse(spec)?;
    let id = PackageId::new(PackageKind::Package, spec.full_name());
    let install_path = self.config.install_path(&id);

    Ok(ResolvedPackage {
      name: spec.full_name(),
      version: spec.version.clone(),
      installed: install_path.exists(),
      install_path,
      description: None,
      dependencies: Vec::new(),
      requires: Default::default(),
      install_details: InstallDetails::Ecosystem {
        ecosystem: Ecosystem::Npm,
        package: spec.full_name(),
        version: spec.version,
      },
      bins: Vec::new(),
      constraint,
      post_install: None,
      runtime: None,
      entry: None,
      id,
    })
  }

  fn from_entry(&self, id: PackageId, entry: RegistryEntry, constraint: Option<String>) -> ResolvedPackage {
    let install_path = self.config.install_path(&id);
    let installed = is_installed(&self.config, &id, &entry.bins);
    let install_details = install_details(&id, &entry);

    ResolvedPackage {
      name: if entry.name.is_empty() { id.name.clone() } else { entry.name },
      version: entry.version.unwrap_or_else(|| "latest".to_string()),
      install_path,
      description: entry.description,
      installed,
      dependencies: Vec::new(),
      requires: entry.requires,
      install_details,
      bins: entry.bins,
      constraint,
      post_install: entry.post_install,
      runtime: entry.runtime,
      entry: entry.entry,
      id,
    }
  }
}

/// Pick the install mechanism a registry entry calls for.
fn install_details(id: &PackageId, entry: &RegistryEntry) -> InstallDetails {
  let default_source = || match id.kind {
    PackageKind::Prompt => format!("prompts/{}.md", id.name),
    kind => format!("{}/{}", kind.plural(), id.name),
  };

  match id.kind {
    PackageKind::Stack | PackageKind::Prompt => InstallDetails::Source {
      path: entry.path.clone().unwrap_or_else(default_source),
    },
    _ => {
      if let Some(npm) = &entry.npm_package {
        let (package, version) = match EcosystemSpec::parse(npm) {
          Ok(spec) => (spec.full_name(), spec.version),
          Err(_) => (npm.clone(), "latest".to_string()),
        };
        InstallDetails::Ecosystem {
          ecosystem: Ecosystem::Npm,
          package,
          version,
        }
      } else if let Some(pip) = &entry.pip_package {
        let (package, version) = match pip.split_once("==") {
          Some((name, version)) => (name.trim().to_string(), version.trim().to_string()),
          None => (pip.trim().to_string(), "latest".to_string()),
        };
        InstallDetails::Ecosystem {
          ecosystem: Ecosystem::Pip,
          package,
          version,
        }
      } else if !entry.download.is_empty() {
        InstallDetails::Binary {
          downloads: entry
            .download
            .iter()
            .map(|(tag, d)| (tag.clone(), d.clone().into_spec()))
            .collect(),
        }
      } else if entry.system {
        InstallDetails::System {
          commands: if entry.bins.is_empty() {
            vec![short_name(&id.name)]
          } else {
            entry.bins.clone()
          },
        }
      } else if let Some(path) = &entry.path {
        InstallDetails::Source { path: path.clone() }
      } else {
        InstallDetails::None
      }
    }
  }
}

/// Split a dependency edge into its identifier and optional constraint.
///
/// `"python>=3.10"` becomes `(runtime:python, Some(">=3.10"))` when the edge
/// is declared under `runtimes`.
pub fn parse_dependency(
  spec: &DependencySpec,
  default_kind: PackageKind,
) -> Result<(PackageId, Option<String>), PackageIdError> {
  let (name, constraint) = match spec {
    DependencySpec::Name(raw) => {
      let raw = raw.trim();
      // Scoped `pkg:@scope/name@ver` references keep their `@`; only comparison operators split.
      match raw.find(['>', '<', '=']) {
        Some(pos) => (raw[..pos].trim(), Some(raw[pos..].trim().to_string())),
        None => (raw, None),
      }
    }
    DependencySpec::Detailed { name, version } => (name.trim(), version.clone()),
  };

  let id = PackageId::normalize_with(name, default_kind)?;
  Ok((id, constraint.filter(|c| !c.is_empty())))
}

/// Whether a package is present on disk.
///
/// Agents additionally need their executable inside `node_modules/.bin`.
pub fn is_installed(config: &RudiConfig, id: &PackageId, bins: &[String]) -> bool {
  let path = config.install_path(id);
  if !path.exists() {
    return false;
  }

  if id.kind == PackageKind::Agent {
    let bin = bins.first().cloned().unwrap_or_else(|| short_name(&id.name));
    return path.join("node_modules").join(".bin").join(bin).exists();
  }

  true
}

/// [`is_installed`] for callers that only have an identifier; bins come from the manifest.
pub fn is_installed_id(config: &RudiConfig, id: &PackageId) -> bool {
  let bins = InstalledManifest::load(&config.install_path(id))
    .ok()
    .flatten()
    .map(|m| m.bins)
    .unwrap_or_default();
  is_installed(config, id, &bins)
}
