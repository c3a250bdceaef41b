//! Shared constants.

use std::time::Duration;

pub const APP_NAME: &str = "rudi";

/// Name of the per-install manifest written into every install directory.
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Name of the shim ownership registry inside the rudi home.
pub const SHIM_REGISTRY_FILENAME: &str = "shims.json";

/// Extension used for lock records.
pub const LOCK_EXTENSION: &str = "lock.yaml";

/// How long a cached registry index is considered fresh.
pub const REGISTRY_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Length of the hex identity checksum stored in lock records.
pub const CHECKSUM_LEN: usize = 16;

/// Default registry index location.
pub const DEFAULT_REGISTRY_URL: &str = "https://raw.githubusercontent.com/learn-rudi/registry/main/index.json";

/// Default base for raw registry files.
pub const DEFAULT_REGISTRY_RAW: &str = "https://raw.githubusercontent.com/learn-rudi/registry/main";

/// Default base for registry directory listings.
pub const DEFAULT_REGISTRY_API: &str = "https://api.github.com/repos/learn-rudi/registry/contents";
