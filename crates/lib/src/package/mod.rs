//! Package identity.
//!
//! A package is addressed by a [`PackageId`], a `(kind, name)` pair written as
//! `kind:name`. Ecosystem packages (`pkg:`) carry an npm-style name that is
//! parsed with [`EcosystemSpec`].

mod ecosystem;
mod id;

pub use ecosystem::EcosystemSpec;
pub use id::{PackageId, PackageIdError, PackageKind};
