//! Cache generation lifecycle.
//!
//! A worker build owns exactly one [`Generation`]. Install precaches the
//! navigational routes into that generation's namespace; activate deletes
//! every other namespace and starts controlling clients. Until activation
//! completes the worker passes every request through.

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use reqwest::Url;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::network::CacheDirective;
use super::request::InterceptedRequest;
use super::storage::StorageError;
use super::worker::InterceptorWorker;
use crate::cache::lock::mutex_lock;

const SOURCE: &str = "interceptor::lifecycle";

/// Generation name compiled into this build.
pub const CACHE_GENERATION: &str = concat!("inboxdesk-v", env!("CARGO_PKG_VERSION"));

/// Name of a client cache namespace owned by one build.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Generation(String);

impl Generation {
    pub fn current() -> Self {
        Self(CACHE_GENERATION.to_string())
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Generation {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: LifecycleState,
    },
    #[error("client cache storage failed: {0}")]
    Storage(#[from] StorageError),
}

/// Outcome of precaching during install.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub cached: Vec<String>,
    /// Route and the reason it was not cached.
    pub failed: Vec<(String, String)>,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    pub retained: String,
    pub deleted: Vec<String>,
}

/// Lifecycle flags shared by the worker's handlers.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: Mutex<LifecycleState>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Parsed),
            skip_waiting: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *mutex_lock(&self.state, SOURCE, "state")
    }

    fn transition(
        &self,
        action: &'static str,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<(), LifecycleError> {
        let mut state = mutex_lock(&self.state, SOURCE, action);
        if *state != from {
            return Err(LifecycleError::InvalidTransition {
                action,
                state: *state,
            });
        }
        *state = to;
        Ok(())
    }

    fn set(&self, to: LifecycleState) {
        *mutex_lock(&self.state, SOURCE, "set") = to;
    }

    pub(crate) fn skip_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    pub(crate) fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::Acquire)
    }

    /// Interception is live only once activated and controlling clients.
    pub(crate) fn is_controlling(&self) -> bool {
        self.state() == LifecycleState::Activated && self.clients_claimed()
    }
}

impl InterceptorWorker {
    /// Precache every configured route into the current generation.
    ///
    /// Routes are fetched concurrently and every outcome is collected; a
    /// failed route does not abort the others or the install.
    #[instrument(skip_all, fields(generation = %self.generation()))]
    pub async fn install(&self) -> Result<InstallReport, LifecycleError> {
        self.lifecycle()
            .transition("install", LifecycleState::Parsed, LifecycleState::Installing)?;

        let outcomes = join_all(self.precache_routes().iter().map(|url| self.precache(url))).await;

        let mut report = InstallReport::default();
        for (url, outcome) in self.precache_routes().iter().zip(outcomes) {
            match outcome {
                Ok(()) => report.cached.push(url.to_string()),
                Err(reason) => {
                    warn!(route = %url, reason = %reason, "precache failed");
                    report.failed.push((url.to_string(), reason));
                }
            }
        }

        self.lifecycle().set(LifecycleState::Installed);
        self.lifecycle().skip_waiting.store(true, Ordering::Release);
        info!(
            cached = report.cached.len(),
            failed = report.failed.len(),
            "client cache installed"
        );
        Ok(report)
    }

    /// Delete every namespace but the current generation, then claim clients.
    #[instrument(skip_all, fields(generation = %self.generation()))]
    pub async fn activate(&self) -> Result<ActivateReport, LifecycleError> {
        self.lifecycle()
            .transition("activate", LifecycleState::Installed, LifecycleState::Activating)?;

        let namespaces = match self.storage().namespaces().await {
            Ok(namespaces) => namespaces,
            Err(err) => {
                self.lifecycle().set(LifecycleState::Installed);
                return Err(err.into());
            }
        };

        let current = self.generation().as_str();
        let stale: Vec<&String> = namespaces.iter().filter(|name| *name != current).collect();
        let results = join_all(stale.iter().map(|name| self.storage().delete_namespace(name))).await;

        let mut deleted = Vec::new();
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(_) => deleted.push(name.clone()),
                Err(err) => warn!(namespace = %name, error = %err, "stale namespace not deleted"),
            }
        }

        self.lifecycle().set(LifecycleState::Activated);
        self.lifecycle().clients_claimed.store(true, Ordering::Release);
        info!(deleted = deleted.len(), "client cache activated");

        Ok(ActivateReport {
            retained: current.to_string(),
            deleted,
        })
    }

    /// Resume a generation installed by an earlier process.
    ///
    /// Returns `true` when the current generation's namespace already exists,
    /// in which case the worker is active without reinstalling.
    pub async fn resume(&self) -> Result<bool, LifecycleError> {
        let namespaces = self.storage().namespaces().await?;
        if !namespaces.iter().any(|name| name == self.generation().as_str()) {
            return Ok(false);
        }
        self.lifecycle()
            .transition("resume", LifecycleState::Parsed, LifecycleState::Activated)?;
        self.lifecycle().skip_waiting.store(true, Ordering::Release);
        self.lifecycle().clients_claimed.store(true, Ordering::Release);
        Ok(true)
    }

    async fn precache(&self, url: &Url) -> Result<(), String> {
        let request = InterceptedRequest::get(url.clone());
        let response = self
            .network()
            .fetch(&request, CacheDirective::NoCache)
            .await
            .map_err(|err| err.to_string())?;
        if !response.is_ok() || response.is_opaque() {
            return Err(format!("not cacheable: status {}", response.status.as_u16()));
        }
        self.storage()
            .put(self.generation().as_str(), &request.key(), &response)
            .await
            .map_err(|err| err.to_string())
    }
}
