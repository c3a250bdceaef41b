use crate::consts::APP_NAME;
use std::path::PathBuf;

/// Environment variable that relocates the rudi home directory.
pub const HOME_ENV: &str = "RUDI_HOME";

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the rudi home directory (`$RUDI_HOME`, else `~/.rudi`)
pub fn rudi_home() -> PathBuf {
  if let Ok(path) = std::env::var(HOME_ENV)
    && !path.is_empty()
  {
    return PathBuf::from(path);
  }
  home_dir().join(format!(".{}", APP_NAME))
}

#[cfg(test)]
#[cfg(not(windows))]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn rudi_home_env_takes_precedence() {
    temp_env::with_vars(
      [(HOME_ENV, Some("/custom/rudi")), ("HOME", Some("/home/user"))],
      || {
        assert_eq!(rudi_home(), PathBuf::from("/custom/rudi"));
      },
    );
  }

  #[test]
  #[serial]
  fn rudi_home_falls_back_to_dot_dir() {
    temp_env::with_vars([(HOME_ENV, None::<&str>), ("HOME", Some("/home/user"))], || {
      assert_eq!(rudi_home(), PathBuf::from("/home/user/.rudi"));
    });
  }
}
