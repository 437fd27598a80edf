//! Identifier value objects
//!
//! Tenant, Group, Workspace and API-key ids are locally generated, 26-char
//! lexicographically sortable ULIDs. User ids are opaque strings owned by the
//! external identity provider and accepted as-is after trim/non-empty
//! validation. All ids are value objects - equality by value, no hidden
//! state.

use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! ulid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
        #[display("{_0}")]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Generates a new id, ordered after any id generated earlier in
            /// the same millisecond by monotonic entropy.
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            pub fn as_str(&self) -> String {
                self.0.to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ulid::from_string(s)
                    .map($name)
                    .map_err(|_| IdParseError(s.to_string()))
            }
        }
    };
}

ulid_id!(TenantId);
ulid_id!(GroupId);
ulid_id!(WorkspaceId);
ulid_id!(ApiKeyId);

#[derive(Debug, thiserror::Error)]
#[error("'{0}' is not a valid 26-character id")]
pub struct IdParseError(String);

/// An opaque user identifier minted by the external identity provider.
///
/// Unlike the locally generated ids above, `UserId` carries no assumption
/// about shape or length - it is whatever the IdP's `sub` claim or key
/// ownership record says it is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
#[display("{_0}")]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Builds a `UserId` after trimming and rejecting empty input.
    pub fn new(raw: impl Into<String>) -> Result<Self, UserIdError> {
        let trimmed = raw.into().trim().to_string();
        if trimmed.is_empty() {
            return Err(UserIdError::Empty);
        }
        Ok(Self(trimmed))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UserIdError {
    #[error("user id must not be empty")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ulid_ids_round_trip_through_string() {
        let id = TenantId::new();
        let parsed: TenantId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn ulid_ids_are_26_characters() {
        assert_eq!(TenantId::new().as_str().len(), 26);
        assert_eq!(GroupId::new().as_str().len(), 26);
        assert_eq!(WorkspaceId::new().as_str().len(), 26);
        assert_eq!(ApiKeyId::new().as_str().len(), 26);
    }

    #[test]
    fn ids_generated_later_sort_after_earlier_ones() {
        let a = TenantId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = TenantId::new();
        assert!(a.as_str() < b.as_str());
    }

    #[test]
    fn invalid_id_string_is_rejected() {
        assert!("not-a-ulid".parse::<TenantId>().is_err());
    }

    #[test]
    fn user_id_rejects_empty_and_trims_whitespace() {
        assert!(UserId::new("   ").is_err());
        assert_eq!(UserId::new("  auth0|abc123  ").unwrap().as_str(), "auth0|abc123");
    }
}
