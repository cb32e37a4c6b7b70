//! Strongly-typed record names.
//!
//! Jobs and repositories are addressed by a unique, human-readable name. The
//! name is the primary key for every lookup and mutation, so it is validated
//! once at construction and again whenever a stored document is decoded.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Unique name of a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobName(String);

/// Unique name of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryName(String);

/// Check that `value` can be used as a record key.
fn validate(kind: &str, value: &str) -> Result<(), DomainError> {
    if value.is_empty() {
        return Err(DomainError::invalid_name(format!("{kind} must not be empty")));
    }
    if value.trim() != value {
        return Err(DomainError::invalid_name(format!(
            "{kind} '{value}' has leading or trailing whitespace"
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(DomainError::invalid_name(format!(
            "{kind} contains control characters"
        )));
    }
    Ok(())
}

macro_rules! impl_name_newtype {
    ($t:ty, $kind:literal) => {
        impl $t {
            /// Validate and wrap a name.
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                validate($kind, &value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $t {
            type Error = DomainError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl PartialEq<str> for $t {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $t {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

impl_name_newtype!(JobName, "job name");
impl_name_newtype!(RepositoryName, "repository name");

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_plain_names() {
        let name = JobName::new("build-1").unwrap();
        assert_eq!(name.as_str(), "build-1");
        assert_eq!(name, "build-1");
        assert_eq!(name.to_string(), "build-1");
    }

    #[test]
    fn rejects_empty_and_padded_names() {
        assert!(matches!(JobName::new(""), Err(DomainError::InvalidName(_))));
        assert!(matches!(JobName::new(" build"), Err(DomainError::InvalidName(_))));
        assert!(matches!(RepositoryName::new("repo\n"), Err(DomainError::InvalidName(_))));
    }

    #[test]
    fn rejects_control_characters() {
        let err = RepositoryName::new("a\u{0007}b").unwrap_err();
        assert!(err.to_string().contains("control characters"));
    }

    #[test]
    fn serde_validates_on_decode() {
        let ok: JobName = serde_json::from_str("\"nightly\"").unwrap();
        assert_eq!(ok, "nightly");

        let bad = serde_json::from_str::<JobName>("\"\"");
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn alphanumeric_names_round_trip(raw in "[a-zA-Z0-9][a-zA-Z0-9._/-]{0,40}") {
            let name = RepositoryName::new(raw.clone()).unwrap();
            let json = serde_json::to_string(&name).unwrap();
            let back: RepositoryName = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back.as_str(), raw.as_str());
        }
    }
}
