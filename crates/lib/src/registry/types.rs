//! Registry index document types.
//!
//! ```json
//! {
//!   "packages": {
//!     "stacks":   { "official": [ ... ], "community": [ ... ] },
//!     "prompts":  { ... },
//!     "runtimes": { ... },
//!     "binaries": { ... },
//!     "agents":   { ... }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::package::PackageKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryIndex {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
  #[serde(default)]
  pub packages: RegistryPackages,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryPackages {
  #[serde(default)]
  pub stacks: RegistrySection,
  #[serde(default)]
  pub prompts: RegistrySection,
  #[serde(default)]
  pub runtimes: RegistrySection,
  #[serde(default)]
  pub binaries: RegistrySection,
  #[serde(default)]
  pub agents: RegistrySection,
}

impl RegistryPackages {
  pub fn section(&self, kind: PackageKind) -> &RegistrySection {
    match kind.storage_kind() {
      PackageKind::Stack => &self.stacks,
      PackageKind::Prompt => &self.prompts,
      PackageKind::Runtime => &self.runtimes,
      PackageKind::Agent => &self.agents,
      PackageKind::Binary | PackageKind::Package => &self.binaries,
    }
  }
}

/// Entries of one kind, official entries taking precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySection {
  #[serde(default)]
  pub official: Vec<RegistryEntry>,
  #[serde(default)]
  pub community: Vec<RegistryEntry>,
}

impl RegistrySection {
  pub fn iter(&self) -> impl Iterator<Item = &RegistryEntry> {
    self.official.iter().chain(self.community.iter())
  }
}

/// One package as described by the registry (or by its own `manifest.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  /// Registry-relative path of the package sources.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub runtime: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub entry: Option<String>,
  #[serde(default)]
  pub requires: Requires,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub npm_package: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pip_package: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub bins: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub post_install: Option<String>,
  /// Prebuilt archives keyed by platform tag.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub download: BTreeMap<String, DownloadEntry>,
  /// Provided by the host system; rudi only publishes shims for it.
  #[serde(default)]
  pub system: bool,
}

impl RegistryEntry {
  /// Overlay fields declared by a package's own manifest document.
  pub fn merge(&mut self, other: RegistryEntry) {
    if !other.name.is_empty() {
      self.name = other.name;
    }
    macro_rules! take {
      ($($field:ident),*) => {
        $(if other.$field.is_some() { self.$field = other.$field; })*
      };
    }
    take!(version, description, runtime, entry, npm_package, pip_package, post_install);
    if !other.requires.is_empty() {
      self.requires = other.requires;
    }
    if !other.bins.is_empty() {
      self.bins = other.bins;
    }
    if !other.download.is_empty() {
      self.download = other.download;
    }
    self.system |= other.system;
  }
}

/// Declared requirements of a package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requires {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub runtimes: Vec<DependencySpec>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub binaries: Vec<DependencySpec>,
  /// Legacy name for `binaries`.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tools: Vec<DependencySpec>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub agents: Vec<DependencySpec>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub secrets: Vec<SecretSpec>,
}

impl Requires {
  pub fn is_empty(&self) -> bool {
    self.runtimes.is_empty()
      && self.binaries.is_empty()
      && self.tools.is_empty()
      && self.agents.is_empty()
      && self.secrets.is_empty()
  }

  /// Dependency edges in declaration order, tagged with the kind a bare name defaults to.
  pub fn dependencies(&self) -> impl Iterator<Item = (PackageKind, &DependencySpec)> {
    let runtimes = self.runtimes.iter().map(|d| (PackageKind::Runtime, d));
    let binaries = self
      .binaries
      .iter()
      .chain(self.tools.iter())
      .map(|d| (PackageKind::Binary, d));
    let agents = self.agents.iter().map(|d| (PackageKind::Agent, d));
    runtimes.chain(binaries).chain(agents)
  }
}

/// A dependency edge: `"python>=3.10"` or `{ "name": "python", "version": ">=3.10" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
  Name(String),
  Detailed {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
  },
}

/// A secret a package needs at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SecretSpec {
  Name(String),
  Detailed {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
  },
}

impl SecretSpec {
  pub fn name(&self) -> &str {
    match self {
      SecretSpec::Name(name) => name,
      SecretSpec::Detailed { name, .. } => name,
    }
  }
}

/// A download table value: a bare URL or a full [`DownloadSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DownloadEntry {
  Url(String),
  Spec(DownloadSpec),
}

impl DownloadEntry {
  pub fn into_spec(self) -> DownloadSpec {
    match self {
      DownloadEntry::Url(url) => DownloadSpec {
        url,
        ..DownloadSpec::default()
      },
      DownloadEntry::Spec(spec) => spec,
    }
  }
}

/// How to fetch and unpack a prebuilt archive for one platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSpec {
  /// Archive URL; `{version}` is substituted with the package version.
  pub url: String,
  /// Archive format; inferred from the URL when absent.
  #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
  pub format: Option<ArchiveFormat>,
  /// Leading path components to drop while extracting.
  #[serde(default)]
  pub strip: usize,
  /// Executable locations inside the extracted tree; segments may be globs.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub bin_paths: BTreeMap<String, String>,
}

impl DownloadSpec {
  pub fn resolved_url(&self, version: &str) -> String {
    self.url.replace("{version}", version.trim_start_matches('v'))
  }

  pub fn archive_format(&self) -> ArchiveFormat {
    self.format.unwrap_or_else(|| ArchiveFormat::from_url(&self.url))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveFormat {
  #[serde(rename = "zip")]
  Zip,
  #[serde(rename = "tar.gz", alias = "tgz")]
  TarGz,
  #[serde(rename = "tar.xz", alias = "txz")]
  TarXz,
  #[serde(rename = "tar")]
  Tar,
  /// The download is the executable itself.
  #[serde(rename = "raw", alias = "binary")]
  Raw,
}

impl ArchiveFormat {
  /// Infer the format from a URL suffix, ignoring any query string.
  pub fn from_url(url: &str) -> Self {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    if path.ends_with(".zip") {
      Self::Zip
    } else if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
      Self::TarGz
    } else if path.ends_with(".tar.xz") || path.ends_with(".txz") {
      Self::TarXz
    } else if path.ends_with(".tar") {
      Self::Tar
    } else {
      Self::Raw
    }
  }
}
