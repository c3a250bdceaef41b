//! Identity checksums.
//!
//! A checksum is a truncated SHA-256 of a value's JSON encoding. It identifies
//! *what* was recorded (id, version, name), not the bytes on disk.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::CHECKSUM_LEN;

pub type HashError = serde_json::Error;

/// A [`CHECKSUM_LEN`]-character lowercase hex digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(pub String);

impl std::fmt::Display for Checksum {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait Checksummed: Serialize {
  fn checksum(&self) -> Result<Checksum, HashError> {
    let serialized = serde_json::to_string(self)?;
    Ok(Checksum(hash_bytes(serialized.as_bytes())[..CHECKSUM_LEN].to_string()))
  }
}

/// Full 64-character SHA-256 of arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(data);
  hex::encode(hasher.finalize())
}
