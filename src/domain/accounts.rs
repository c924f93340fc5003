//! Account identity.
//!
//! Every cached value and every invalidation is scoped to exactly one account.
//! Account ids come from the auth provider as opaque subject strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Identifier of the tenant that owns inboxes, domains and orders.
///
/// Guaranteed non-empty and free of whitespace and `:`, so it can be embedded
/// in a `<namespace>:<account>` cache key without ambiguity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(DomainError::validation("account id must not be empty"));
        }
        if raw.contains(':') {
            return Err(DomainError::validation("account id must not contain `:`"));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(DomainError::validation(
                "account id must not contain whitespace",
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccountId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.0
    }
}
