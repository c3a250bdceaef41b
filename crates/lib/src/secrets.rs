//! Secret lookup.
//!
//! Installs only check that declared secrets exist; a missing secret is a
//! warning at install time and becomes a problem only when the package runs.

use crate::registry::SecretSpec;

/// A source of named secrets.
pub trait SecretStore: Send + Sync {
  fn get_secret(&self, name: &str) -> Option<String>;

  fn has_secret(&self, name: &str) -> bool {
    self.get_secret(name).is_some_and(|value| !value.is_empty())
  }
}

/// Resolves each secret from the environment variable of the same name.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
  fn get_secret(&self, name: &str) -> Option<String> {
    std::env::var(name).ok()
  }
}

/// Names of the declared secrets that `store` cannot provide.
pub fn missing_secrets(store: &dyn SecretStore, declared: &[SecretSpec]) -> Vec<String> {
  declared
    .iter()
    .map(SecretSpec::name)
    .filter(|name| !store.has_secret(name))
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn env_store_reads_variables() {
    temp_env::with_vars(
      [("RUDI_TEST_TOKEN", Some("abc")), ("RUDI_TEST_EMPTY", Some("")), ("RUDI_TEST_UNSET", None)],
      || {
        let store = EnvSecretStore;
        assert_eq!(store.get_secret("RUDI_TEST_TOKEN").as_deref(), Some("abc"));
        assert!(store.has_secret("RUDI_TEST_TOKEN"));
        assert!(!store.has_secret("RUDI_TEST_EMPTY"));
        assert!(!store.has_secret("RUDI_TEST_UNSET"));
      },
    );
  }

  #[test]
  #[serial]
  fn reports_only_missing_secrets() {
    temp_env::with_vars(
      [("RUDI_TEST_PRESENT", Some("1")), ("RUDI_TEST_ABSENT", None)],
      || {
        let declared = vec![
          SecretSpec::Name("RUDI_TEST_PRESENT".to_string()),
          SecretSpec::Detailed {
            name: "RUDI_TEST_ABSENT".to_string(),
            description: Some("API key".to_string()),
          },
        ];
        assert_eq!(missing_secrets(&EnvSecretStore, &declared), vec!["RUDI_TEST_ABSENT"]);
      },
    );
  }
}
