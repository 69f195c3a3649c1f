//! # Network Monitor
//!
//! Tracks connectivity to the remote service and publishes transitions.
//!
//! ## Features
//!
//! - **Connectivity Detection**: synchronous `is_online()` reads
//! - **Edge Notifications**: a watch channel fires only when the status changes
//! - **Health Probe**: `GET /api/health` under a timeout decides the status

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::shared::remote::RemoteService;

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

#[derive(Debug)]
pub struct NetworkMonitor {
    status_tx: watch::Sender<NetworkStatus>,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkStatus::Offline)
    }
}

impl NetworkMonitor {
    pub fn new(initial: NetworkStatus) -> Self {
        let (status_tx, _) = watch::channel(initial);
        Self { status_tx }
    }

    pub fn get_status(&self) -> NetworkStatus {
        *self.status_tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.get_status().is_online()
    }

    /// Update the status; returns true when this was a transition
    pub fn set_status(&self, status: NetworkStatus) -> bool {
        let changed = self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            info!("[Network] Connectivity changed: {:?}", status);
        }
        changed
    }

    pub fn set_online(&self, online: bool) -> bool {
        self.set_status(if online {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        })
    }

    /// Receiver notified on every transition
    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.status_tx.subscribe()
    }

    /// Run the health check once and update the status
    pub async fn probe(&self, remote: &dyn RemoteService, timeout: Duration) -> NetworkStatus {
        let status = match tokio::time::timeout(timeout, remote.health()).await {
            Ok(Ok(())) => NetworkStatus::Online,
            Ok(Err(e)) => {
                debug!("[Network] Health check failed: {}", e);
                NetworkStatus::Offline
            }
            Err(_) => {
                debug!("[Network] Health check timed out after {:?}", timeout);
                NetworkStatus::Offline
            }
        };
        self.set_status(status);
        status
    }

    /// Probe every `interval` until the task is aborted
    pub fn spawn_probe_loop(
        self: &Arc<Self>,
        remote: Arc<dyn RemoteService>,
        interval: Duration,
        timeout: Duration,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.probe(remote.as_ref(), timeout).await;
            }
        })
    }
}
