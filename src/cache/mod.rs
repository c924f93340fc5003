//! Server-side response cache.
//!
//! - [`ComputeCache`] is a read-through cache in front of expensive account
//!   aggregations, keyed by `<namespace>:<account_id>` with a per-entry TTL.
//! - [`StoreAdapter`] wraps a [`CacheStore`] backend and absorbs its failures.
//! - [`InvalidationRouter`] maps write operations to the keys they stale.
//! - [`conditional`] turns cached values into HTTP responses with validators.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 300
//! freshness_window_seconds = 60
//! max_entries = 10000
//! ```

pub mod conditional;
mod config;
mod invalidation;
mod keys;
pub(crate) mod lock;
mod read_through;
mod store;

pub use config::CacheConfig;
pub use invalidation::{InvalidationRouter, Mutation};
pub use keys::{CacheKey, KeyParseError, Namespace};
pub use read_through::{CacheRead, ComputeCache, ReadSource};
pub use store::{CacheStore, MemoryStore, StoreAdapter, StoreError, StoredEntry};
