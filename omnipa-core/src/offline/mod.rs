//! Offline mode: connectivity tracking and the pending-change queue.
//!
//! While the remote store is unreachable, mutations are recorded as
//! [`PendingChange`]s, persisted to the local mirror, and replayed in
//! timestamp order once connectivity returns.

mod network;
mod pending;
mod tracker;

pub use network::{check_server, NetworkMonitor, NetworkStatus};
pub use pending::{ChangeType, Mutation, PendingChange};
pub use tracker::OfflineTracker;

/// Keeps a tracker following the connectivity signal until dropped.
pub type ConnectivitySubscription = crate::task::BackgroundTask;
