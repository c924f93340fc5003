//! Cache key definitions.
//!
//! Keys have the stable wire form `<namespace>:<accountId>`. The namespace
//! names the producer, the account scopes the data to one tenant.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::domain::accounts::AccountId;

/// Producer family a cache entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// Aggregate dashboard counters.
    Dashboard,
    /// Inbox listing.
    Inboxes,
    /// Domain listing.
    Domains,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [Namespace::Dashboard, Namespace::Inboxes, Namespace::Domains];

    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Dashboard => "dashboard",
            Namespace::Inboxes => "inboxes",
            Namespace::Domains => "domains",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("unknown cache namespace `{0}`")]
    UnknownNamespace(String),
    #[error("cache key `{0}` is not of the form <namespace>:<account>")]
    Malformed(String),
    #[error("invalid account id in cache key: {0}")]
    Account(String),
}

impl FromStr for Namespace {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::ALL
            .into_iter()
            .find(|namespace| namespace.as_str() == s)
            .ok_or_else(|| KeyParseError::UnknownNamespace(s.to_string()))
    }
}

/// One cache entry per (namespace, account) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: Namespace,
    account_id: AccountId,
}

impl CacheKey {
    pub fn new(namespace: Namespace, account_id: AccountId) -> Self {
        Self {
            namespace,
            account_id,
        }
    }

    pub fn dashboard(account_id: &AccountId) -> Self {
        Self::new(Namespace::Dashboard, account_id.clone())
    }

    pub fn inboxes(account_id: &AccountId) -> Self {
        Self::new(Namespace::Inboxes, account_id.clone())
    }

    pub fn domains(account_id: &AccountId) -> Self {
        Self::new(Namespace::Domains, account_id.clone())
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.account_id)
    }
}

impl FromStr for CacheKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, account) = s
            .split_once(':')
            .ok_or_else(|| KeyParseError::Malformed(s.to_string()))?;
        let namespace = namespace.parse()?;
        let account_id =
            AccountId::parse(account).map_err(|err| KeyParseError::Account(err.to_string()))?;
        Ok(Self::new(namespace, account_id))
    }
}
