//! Parser for ecosystem package references.
//!
//! Grammar:
//!
//! ```text
//! spec    := [ "@" scope "/" ] name [ "@" version ]
//! scope   := 1*( any char except "/" and "@" )
//! name    := 1*( any char except "/" and "@" )
//! version := 1*( any char )
//! ```
//!
//! A missing version means `latest`.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::PackageIdError;

pub const LATEST: &str = "latest";

/// A parsed `[@scope/]name[@version]` reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcosystemSpec {
  pub scope: Option<String>,
  pub name: String,
  pub version: String,
}

impl EcosystemSpec {
  pub fn parse(spec: &str) -> Result<Self, PackageIdError> {
    let invalid = || PackageIdError::InvalidIdentifier(spec.to_string());
    let spec_trimmed = spec.trim();

    let (scope, rest) = match spec_trimmed.strip_prefix('@') {
      Some(scoped) => {
        let (scope, rest) = scoped.split_once('/').ok_or_else(invalid)?;
        if !is_segment(scope) {
          return Err(invalid());
        }
        (Some(scope.to_string()), rest)
      }
      None => (None, spec_trimmed),
    };

    let (name, version) = match rest.split_once('@') {
      Some((name, version)) => {
        if version.is_empty() || version.chars().any(char::is_whitespace) {
          return Err(invalid());
        }
        (name, version)
      }
      None => (rest, LATEST),
    };

    if !is_segment(name) {
      return Err(invalid());
    }

    Ok(Self {
      scope,
      name: name.to_string(),
      version: version.to_string(),
    })
  }

  /// The package name as the index knows it (`@scope/name` or `name`).
  pub fn full_name(&self) -> String {
    match &self.scope {
      Some(scope) => format!("@{}/{}", scope, self.name),
      None => self.name.clone(),
    }
  }

  pub fn is_latest(&self) -> bool {
    self.version == LATEST
  }
}

impl fmt::Display for EcosystemSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}", self.full_name(), self.version)
  }
}

fn is_segment(s: &str) -> bool {
  !s.is_empty() && !s.contains('/') && !s.contains('@') && !s.chars().any(char::is_whitespace)
}
