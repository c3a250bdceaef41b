pub mod arch;
pub mod os;
pub mod paths;

use arch::Arch;
use os::Os;
use std::fmt;

/// Platform identifier combining OS and architecture (e.g., "darwin-arm64")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
}

impl Platform {
  pub fn new(arch: Arch, os: Os) -> Self {
    Self { arch, os }
  }

  /// Detect the current platform at runtime
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      arch: Arch::current()?,
      os: Os::current()?,
    })
  }

  /// Registry download tag (e.g., "linux-x64")
  pub fn tag(&self) -> String {
    format!("{}-{}", self.os, self.arch)
  }

  /// Keys a download table may use for this platform, most specific first.
  ///
  /// Registries key downloads by the node-style tag, but Rust-style triples
  /// (`aarch64-darwin`) and a bare OS name are accepted too.
  pub fn download_keys(&self) -> Vec<String> {
    vec![
      self.tag(),
      format!("{}-{}", self.arch.rust_name(), self.os),
      self.os.as_str().to_string(),
    ]
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.tag())
  }
}

/// Returns the download tag for the current system (e.g., "darwin-arm64")
pub fn platform_tag() -> Option<String> {
  Platform::current().map(|p| p.tag())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn platform_tag_format() {
    let platform = Platform::new(Arch::Arm64, Os::MacOs);
    assert_eq!(platform.tag(), "darwin-arm64");

    let platform = Platform::new(Arch::X64, Os::Linux);
    assert_eq!(platform.tag(), "linux-x64");
  }

  #[test]
  fn download_keys_most_specific_first() {
    let platform = Platform::new(Arch::X64, Os::Linux);
    assert_eq!(platform.download_keys(), vec!["linux-x64", "x86_64-linux", "linux"]);
  }
}
