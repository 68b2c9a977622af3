//! Per-invocation sync session.
//!
//! Probes the server to decide whether we are online, builds the shopping
//! sync service over the data directory, and replays queued changes when the
//! server is back and `auto_sync` is enabled.

use std::sync::Arc;
use std::time::Duration;

use omnipa_core::{
    ConnectivitySubscription, FileStore, HttpRemote, NetworkMonitor, NetworkStatus, ShoppingSync,
    SyncReport,
};

use crate::config::Config;
use crate::notifier::ConsoleNotifier;

pub struct Session {
    pub sync: ShoppingSync,
    pub monitor: NetworkMonitor,
    server_url: Option<String>,
    reconnect_delay: Duration,
    probe_timeout: Duration,
    _connectivity: ConnectivitySubscription,
}

impl Session {
    /// Build the service. Without a configured server the session stays offline.
    pub async fn start(config: &Config) -> Self {
        let monitor = NetworkMonitor::new(NetworkStatus::Offline);
        let server_url = config.sync.server_url.clone().filter(|_| config.sync.is_configured());

        if let Some(url) = &server_url {
            let status = monitor.probe(url, config.sync.probe_timeout()).await;
            tracing::debug!("Server {} is {}", url, status);
        }

        let remote = HttpRemote::new(
            server_url.clone().unwrap_or_default(),
            config.sync.api_key.clone().unwrap_or_default(),
        );
        let store = FileStore::new(config.data_dir.value.clone());
        let options = config.sync_options();
        let reconnect_delay = options.reconnect_delay;
        let sync = ShoppingSync::builder(Arc::new(remote), Arc::new(store))
            .notifier(Arc::new(ConsoleNotifier))
            .options(options)
            .build(monitor.status());
        let connectivity = sync.observe(&monitor);

        Self {
            sync,
            monitor,
            server_url,
            reconnect_delay,
            probe_timeout: config.sync.probe_timeout(),
            _connectivity: connectivity,
        }
    }

    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    /// Replay queued changes if we are online and have any.
    ///
    /// This is what a reconnect does in a long-running client: the CLI comes
    /// back online by starting up. The pass waits `reconnect_delay` first and
    /// is skipped if the server is gone by then.
    pub async fn catch_up(&self) -> Option<SyncReport> {
        if self.sync.is_offline() || !self.sync.has_pending_changes(None) {
            return None;
        }

        tracing::info!("Server reachable, syncing in {:?}", self.reconnect_delay);
        tokio::time::sleep(self.reconnect_delay).await;
        if let Some(url) = &self.server_url {
            if !self.monitor.probe(url, self.probe_timeout).await.is_online() {
                tracing::debug!("Server went away before syncing");
                return None;
            }
        }
        Some(self.sync.sync_now().await)
    }
}
