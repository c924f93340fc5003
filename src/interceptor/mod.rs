//! Client-side network interception cache.
//!
//! Sits between a client and the network. Each request is classified into a
//! [`Strategy`] and served from the network, from per-generation storage, or
//! both. Responses are stored under the current [`Generation`]; activating a
//! new build deletes every older generation.

mod lifecycle;
mod network;
mod request;
mod response;
mod storage;
mod strategy;
mod worker;

pub use lifecycle::{
    ActivateReport, CACHE_GENERATION, Generation, InstallReport, LifecycleError, LifecycleState,
};
pub use network::{CacheDirective, FetchError, HttpNetwork, Network};
pub use request::{InterceptedRequest, RequestKey, RequestMode};
pub use response::{InterceptedResponse, ResponseKind};
pub use storage::{CacheStorage, DiskCacheStorage, MemoryCacheStorage, StorageError};
pub use strategy::{DEFAULT_API_PREFIX, DEFAULT_ICON_PATTERNS, RouteTable, Strategy};
pub use worker::{Interception, InterceptorWorker};
