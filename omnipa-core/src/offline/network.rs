//! Connectivity signal.
//!
//! [`NetworkMonitor`] is the platform side of connectivity: whatever detects
//! the network going up or down reports it here, and subscribers are woken on
//! every transition. On the command line the detection is a health probe
//! against the sync server.

use std::time::Duration;
use tokio::sync::watch;

/// Reachability of the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl NetworkStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, NetworkStatus::Online)
    }
}

impl std::fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkStatus::Online => write!(f, "online"),
            NetworkStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Broadcasts online/offline transitions.
#[derive(Debug)]
pub struct NetworkMonitor {
    status: watch::Sender<NetworkStatus>,
}

impl NetworkMonitor {
    pub fn new(initial: NetworkStatus) -> Self {
        let (status, _) = watch::channel(initial);
        Self { status }
    }

    /// Current status.
    pub fn status(&self) -> NetworkStatus {
        *self.status.borrow()
    }

    /// Receiver that is notified on every transition.
    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.status.subscribe()
    }

    /// Report the current status. Subscribers are only woken on a change.
    pub fn report(&self, status: NetworkStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            tracing::info!("Network is now {}", status);
        }
    }

    /// Probe the server's health endpoint and report the result.
    pub async fn probe(&self, server_url: &str, timeout: Duration) -> NetworkStatus {
        let status = if check_server(server_url, timeout).await {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        };
        self.report(status);
        status
    }
}

/// Returns true if `GET <server_url>/health` answers with a success status.
pub async fn check_server(server_url: &str, timeout: Duration) -> bool {
    let url = format!("{}/health", server_url.trim_end_matches('/'));
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("Failed to build HTTP client: {}", e);
            return false;
        }
    };

    match client.get(&url).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            tracing::debug!("Health check against {} failed: {}", url, e);
            false
        }
    }
}
