//! rudi-lib: Core types and logic for rudi
//!
//! This crate implements the package pipeline behind the `rudi` CLI:
//! - `resolve`: turns package identifiers into resolved packages with their dependencies
//! - `install`: drives npm, pip, archive, system and registry source-tree installs
//! - `shim`: publishes installed executables into one shared bin directory
//! - `lock`: persists identity records for verification and orphan cleanup

pub mod config;
pub mod consts;
pub mod install;
pub mod lock;
pub mod package;
pub mod platform;
pub mod registry;
pub mod resolve;
pub mod secrets;
pub mod shim;
pub mod store_lock;
pub mod util;

pub use config::RudiConfig;
pub use install::{InstallOptions, InstallReport, Installer};
pub use package::{PackageId, PackageKind};
pub use registry::RegistryClient;
pub use resolve::{ResolvedPackage, Resolver};
pub use shim::ShimManager;
