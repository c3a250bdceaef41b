use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::EcosystemSpec;

/// Errors produced while parsing package identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackageIdError {
  #[error("invalid package identifier '{0}'")]
  InvalidIdentifier(String),

  #[error("unknown package kind '{kind}' in '{id}'")]
  UnknownKind { kind: String, id: String },
}

/// The kinds of installable unit rudi knows about.
///
/// `Package` is the ecosystem-package pseudo-kind (`pkg:`): a dynamically named
/// package from a third-party index, stored alongside binaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
  Stack,
  Prompt,
  Runtime,
  Binary,
  Agent,
  #[serde(rename = "pkg")]
  Package,
}

impl PackageKind {
  /// Every kind that owns a registry section and a storage directory.
  pub const STORED: [PackageKind; 5] = [
    PackageKind::Stack,
    PackageKind::Prompt,
    PackageKind::Runtime,
    PackageKind::Binary,
    PackageKind::Agent,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Stack => "stack",
      Self::Prompt => "prompt",
      Self::Runtime => "runtime",
      Self::Binary => "binary",
      Self::Agent => "agent",
      Self::Package => "pkg",
    }
  }

  /// Directory and registry section name (`stacks`, `binaries`, ...).
  pub fn plural(&self) -> &'static str {
    match self {
      Self::Stack => "stacks",
      Self::Prompt => "prompts",
      Self::Runtime => "runtimes",
      Self::Binary | Self::Package => "binaries",
      Self::Agent => "agents",
    }
  }

  /// The kind whose storage this kind shares.
  pub fn storage_kind(&self) -> PackageKind {
    match self {
      Self::Package => Self::Binary,
      other => *other,
    }
  }
}

impl fmt::Display for PackageKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for PackageKind {
  type Err = PackageIdError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "stack" => Ok(Self::Stack),
      "prompt" => Ok(Self::Prompt),
      "runtime" => Ok(Self::Runtime),
      "binary" => Ok(Self::Binary),
      "agent" => Ok(Self::Agent),
      "pkg" => Ok(Self::Package),
      other => Err(PackageIdError::UnknownKind {
        kind: other.to_string(),
        id: s.to_string(),
      }),
    }
  }
}

/// A `(kind, name)` pair identifying an installable unit.
///
/// Serializes as `"<kind>:<name>"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageId {
  pub kind: PackageKind,
  pub name: String,
}

impl PackageId {
  pub fn new(kind: PackageKind, name: impl Into<String>) -> Self {
    Self {
      kind,
      name: name.into(),
    }
  }

  /// Parse a fully qualified `kind:name` identifier.
  pub fn parse(s: &str) -> Result<Self, PackageIdError> {
    let (kind, name) = s
      .split_once(':')
      .ok_or_else(|| PackageIdError::InvalidIdentifier(s.to_string()))?;

    let kind = kind.parse::<PackageKind>().map_err(|_| PackageIdError::UnknownKind {
      kind: kind.to_string(),
      id: s.to_string(),
    })?;

    let name = name.trim();
    if name.is_empty() {
      return Err(PackageIdError::InvalidIdentifier(s.to_string()));
    }

    Ok(Self::new(kind, name))
  }

  /// Parse an identifier, treating a bare name as `default_kind:name`.
  pub fn normalize_with(s: &str, default_kind: PackageKind) -> Result<Self, PackageIdError> {
    let s = s.trim();
    if s.is_empty() {
      return Err(PackageIdError::InvalidIdentifier(s.to_string()));
    }
    if s.contains(':') {
      Self::parse(s)
    } else {
      Ok(Self::new(default_kind, s))
    }
  }

  /// Parse an identifier, treating a bare name as a stack.
  pub fn normalize(s: &str) -> Result<Self, PackageIdError> {
    Self::normalize_with(s, PackageKind::Stack)
  }

  /// Parse an identifier that names something already installed.
  ///
  /// Installed `pkg:` packages are stored under their unversioned name, so
  /// `pkg:@scope/tool@2.1.0` becomes `pkg:@scope/tool`.
  pub fn normalize_installed(s: &str) -> Result<Self, PackageIdError> {
    let id = Self::normalize(s)?;
    if id.kind != PackageKind::Package {
      return Ok(id);
    }
    let spec = EcosystemSpec::parse(&id.name)?;
    Ok(Self::new(PackageKind::Package, spec.full_name()))
  }
}

impl fmt::Display for PackageId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.kind, self.name)
  }
}

impl FromStr for PackageId {
  type Err = PackageIdError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl TryFrom<String> for PackageId {
  type Error = PackageIdError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Self::parse(&value)
  }
}

impl From<PackageId> for String {
  fn from(id: PackageId) -> Self {
    id.to_string()
  }
}
