//! inboxdesk: account dashboard backend for purchased inboxes and domains.
//!
//! The server tier caches expensive account-scoped reads behind a
//! read-through compute cache ([`cache`]) and evicts them when admin
//! mutations commit. The client tier ([`interceptor`]) is a network
//! interception cache that decides per request whether to answer from local
//! storage or the network.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod interceptor;
