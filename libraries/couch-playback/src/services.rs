//! Process-wide services injected into the controller
//!
//! Nothing here is a global: the application builds one `Services` value at
//! startup, starts the network monitor, and hands clones to whoever needs it.

use crate::error::{PlaybackError, Result};
use couch_core::{Catalog, FavoriteStore, MediaSource, ResumeStore};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};
use url::Url;

/// Network reachability as last reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    /// Reachable
    Online,
    /// Not reachable, remote sources cannot load
    Offline,
    /// Monitor not running or nothing reported yet
    Unknown,
}

/// Shared network reachability state
///
/// Cheap to clone; all clones observe the same status. Reports are ignored
/// unless the monitor has been started.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    status: Arc<watch::Sender<NetworkStatus>>,
    running: Arc<AtomicBool>,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkMonitor {
    /// Create a stopped monitor with unknown status
    pub fn new() -> Self {
        let (status, _) = watch::channel(NetworkStatus::Unknown);
        Self {
            status: Arc::new(status),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start accepting reports, assuming the network is up until told otherwise
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.status.send_replace(NetworkStatus::Online);
        info!("Network monitor started");
    }

    /// Stop accepting reports and forget the status
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.status.send_replace(NetworkStatus::Unknown);
        info!("Network monitor shut down");
    }

    /// Record a reachability change reported by the platform
    pub fn report(&self, status: NetworkStatus) {
        if !self.is_running() {
            debug!(?status, "Ignoring network report, monitor not running");
            return;
        }
        let previous = self.status.send_replace(status);
        if previous != status {
            info!(?previous, ?status, "Network status changed");
        }
    }

    /// Last known status
    pub fn status(&self) -> NetworkStatus {
        *self.status.borrow()
    }

    /// Watch status changes
    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.status.subscribe()
    }

    /// Whether the monitor has been started
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Remote sources are allowed unless the network is known to be down
    pub fn allows_remote(&self) -> bool {
        self.status() != NetworkStatus::Offline
    }

    /// Check that a source can be loaded right now
    ///
    /// Locators are `http`, `https` or `file` URLs, or absolute paths. Remote
    /// schemes additionally need the network.
    pub fn check_reachable(&self, source: &MediaSource) -> Result<()> {
        let locator = source.locator.trim();
        if locator.is_empty() {
            return Err(PlaybackError::SourceUnavailable(format!(
                "{} has no locator",
                source.id
            )));
        }

        let url = match Url::parse(locator) {
            Ok(url) => url,
            Err(_) if locator.starts_with('/') => return Ok(()),
            Err(e) => {
                return Err(PlaybackError::SourceUnavailable(format!(
                    "invalid locator {:?}: {}",
                    locator, e
                )));
            }
        };

        match url.scheme() {
            "file" => Ok(()),
            "http" | "https" if self.allows_remote() => Ok(()),
            "http" | "https" => Err(PlaybackError::SourceUnavailable(format!(
                "network unreachable, cannot load {}",
                source.id
            ))),
            other => Err(PlaybackError::SourceUnavailable(format!(
                "unsupported locator scheme {:?}",
                other
            ))),
        }
    }
}

/// Collaborators shared by the controller and the application
#[derive(Clone)]
pub struct Services {
    /// Resume point persistence
    pub resume: Arc<dyn ResumeStore>,
    /// Favorite persistence
    pub favorites: Arc<dyn FavoriteStore>,
    /// Next-unit and version lookups
    pub catalog: Arc<dyn Catalog>,
    /// Network reachability
    pub network: NetworkMonitor,
}

impl Services {
    /// Bundle collaborators
    pub fn new(
        resume: Arc<dyn ResumeStore>,
        favorites: Arc<dyn FavoriteStore>,
        catalog: Arc<dyn Catalog>,
        network: NetworkMonitor,
    ) -> Self {
        Self {
            resume,
            favorites,
            catalog,
            network,
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("network", &self.network.status())
            .finish_non_exhaustive()
    }
}
