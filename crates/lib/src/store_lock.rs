//! Advisory locking of the rudi home.
//!
//! The shim registry and lock directory are shared by every invocation.
//! Commands that mutate them take an exclusive lock on `<home>/.lock`;
//! read-only commands take a shared one. Locks are non-blocking: a second
//! writer fails fast with [`StoreLockError::Contention`].

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const LOCK_FILENAME: &str = ".lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  Shared,
  Exclusive,
}

/// Who holds an exclusive lock, written into the lock file.
#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at: DateTime<Utc>,
  pub command: String,
  pub home: PathBuf,
}

#[derive(Debug, Error)]
pub enum StoreLockError {
  #[error(
    "rudi home is locked by another process: {command} (PID {pid}, started {started_at})\n\
             If you're sure no rudi process is running, remove the lock file:\n  {lock_path}"
  )]
  Contention {
    command: String,
    pid: u32,
    started_at: String,
    lock_path: PathBuf,
  },

  #[error(
    "rudi home is locked (could not read lock metadata)\n\
             If you're sure no rudi process is running, remove the lock file:\n  {lock_path}"
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to create rudi home: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// A held lock; released when dropped.
pub struct StoreLock {
  file: File,
  lock_path: PathBuf,
}

impl StoreLock {
  pub fn acquire(home: &Path, mode: LockMode, command: &str) -> Result<Self, StoreLockError> {
    let lock_path = home.join(LOCK_FILENAME);
    std::fs::create_dir_all(home).map_err(StoreLockError::CreateDir)?;

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(StoreLockError::OpenFile)?;

    if let Err(err) = try_lock(&file, mode) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(read_contention_error(&lock_path));
      }
      return Err(StoreLockError::LockFailed(err));
    }

    if mode == LockMode::Exclusive {
      write_metadata(&file, command, home)?;
    }

    debug!(path = %lock_path.display(), ?mode, "acquired home lock");
    Ok(StoreLock { file, lock_path })
  }

  /// Read the metadata through the held handle.
  ///
  /// Opening a second handle would fail on Windows, where locks are mandatory.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::{Seek, SeekFrom};

    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

fn write_metadata(file: &File, command: &str, home: &Path) -> Result<(), StoreLockError> {
  let metadata = LockMetadata {
    version: 1,
    pid: std::process::id(),
    started_at: Utc::now(),
    command: command.to_string(),
    home: home.to_path_buf(),
  };

  file.set_len(0).map_err(StoreLockError::WriteMetadata)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer_pretty(&mut writer, &metadata).map_err(|e| StoreLockError::WriteMetadata(io::Error::other(e)))?;
  writer.flush().map_err(StoreLockError::WriteMetadata)?;

  Ok(())
}

fn read_contention_error(lock_path: &Path) -> StoreLockError {
  let metadata = std::fs::read_to_string(lock_path)
    .ok()
    .and_then(|contents| serde_json::from_str::<LockMetadata>(&contents).ok());

  match metadata {
    Some(metadata) => StoreLockError::Contention {
      command: metadata.command,
      pid: metadata.pid,
      started_at: metadata.started_at.to_rfc3339(),
      lock_path: lock_path.to_path_buf(),
    },
    None => StoreLockError::ContentionUnknown {
      lock_path: lock_path.to_path_buf(),
    },
  }
}

#[cfg(unix)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = match mode {
    LockMode::Shared => FlockOperation::NonBlockingLockShared,
    LockMode::Exclusive => FlockOperation::NonBlockingLockExclusive,
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let flags = match mode {
    LockMode::Shared => LOCKFILE_FAIL_IMMEDIATELY,
    LockMode::Exclusive => LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
  };

  // SAFETY: OVERLAPPED is plain data and valid when zeroed; the handle is open.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn exclusive_lock_creates_home() {
    let temp = TempDir::new().unwrap();
    let home = temp.path().join("home");

    let lock = StoreLock::acquire(&home, LockMode::Exclusive, "install").unwrap();
    assert!(lock.lock_path().exists());
    assert_eq!(lock.lock_path(), home.join(".lock"));
  }

  #[test]
  fn multiple_shared_locks() {
    let temp = TempDir::new().unwrap();
    let lock1 = StoreLock::acquire(temp.path(), LockMode::Shared, "list").unwrap();
    let lock2 = StoreLock::acquire(temp.path(), LockMode::Shared, "info").unwrap();
    assert_eq!(lock1.lock_path(), lock2.lock_path());
  }

  #[test]
  fn metadata_names_the_command() {
    let temp = TempDir::new().unwrap();
    let lock = StoreLock::acquire(temp.path(), LockMode::Exclusive, "uninstall stack:notes").unwrap();

    let metadata = lock.read_metadata().unwrap();
    assert_eq!(metadata.version, 1);
    assert_eq!(metadata.command, "uninstall stack:notes");
    assert_eq!(metadata.pid, std::process::id());
    assert_eq!(metadata.home, temp.path());
  }

  #[cfg(unix)]
  #[test]
  fn second_writer_sees_contention() {
    let temp = TempDir::new().unwrap();
    let _held = StoreLock::acquire(temp.path(), LockMode::Exclusive, "install binary:rg").unwrap();

    let err = StoreLock::acquire(temp.path(), LockMode::Exclusive, "install binary:jq")
      .err()
      .expect("lock should be contended");
    match err {
      StoreLockError::Contention { command, .. } => assert_eq!(command, "install binary:rg"),
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn lock_released_on_drop() {
    let temp = TempDir::new().unwrap();
    {
      let _lock = StoreLock::acquire(temp.path(), LockMode::Exclusive, "first").unwrap();
    }

    let lock = StoreLock::acquire(temp.path(), LockMode::Exclusive, "second").unwrap();
    assert_eq!(lock.read_metadata().unwrap().command, "second");
  }
}
