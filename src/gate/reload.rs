// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Rule Reloader
//!
//! Background task that re-reads the rule file when the process receives
//! `SIGHUP`. A file that fails validation is logged and ignored; the active
//! table stays in place.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown, shared
//! with the HTTP server.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::RuleStore;

/// Reloads a [`RuleStore`] from its backing file on demand.
pub struct RuleReloader {
    store: RuleStore,
}

impl RuleReloader {
    pub fn new(store: RuleStore) -> Self {
        Self { store }
    }

    /// Run until the cancellation token is triggered, reloading on `SIGHUP`.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(reloader.run(shutdown.clone()));
    /// ```
    #[cfg(unix)]
    pub async fn run(self, shutdown: CancellationToken) {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangups = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGHUP, rule reload disabled");
                return;
            }
        };

        info!(
            rules_file = ?self.store.source(),
            "Rule reloader waiting for SIGHUP"
        );

        loop {
            tokio::select! {
                received = hangups.recv() => {
                    if received.is_none() {
                        return;
                    }
                    self.reload_once().await;
                }
                _ = shutdown.cancelled() => {
                    info!("Rule reloader shutting down");
                    return;
                }
            }
        }
    }

    #[cfg(not(unix))]
    pub async fn run(self, shutdown: CancellationToken) {
        warn!("Rule reload on SIGHUP is only available on unix");
        shutdown.cancelled().await;
    }

    /// Reload the table once. Returns whether the new table is active.
    ///
    /// File reads run on the blocking pool.
    pub async fn reload_once(&self) -> bool {
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.reload()).await {
            Ok(Ok(count)) => {
                info!(rules = count, "Rule table reloaded");
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Rule reload failed, keeping current table");
                false
            }
            Err(e) => {
                warn!(error = %e, "Rule reload task failed, keeping current table");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::RuleTable;

    #[tokio::test]
    async fn reload_once_reports_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, r#"{ "rules": [] }"#).unwrap();

        let store = RuleStore::from_file(&path).unwrap();
        let reloader = RuleReloader::new(store.clone());

        std::fs::write(&path, r#"{ "rules": [ { "pattern": "/", "access": "public" } ] }"#)
            .unwrap();
        assert!(reloader.reload_once().await);
        assert_eq!(store.current().len(), 1);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(!reloader.reload_once().await);
        assert_eq!(store.current().len(), 1);
    }

    #[tokio::test]
    async fn reload_once_without_file_fails() {
        let reloader = RuleReloader::new(RuleStore::new(RuleTable::gateway_default().unwrap()));
        assert!(!reloader.reload_once().await);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let reloader = RuleReloader::new(RuleStore::new(RuleTable::gateway_default().unwrap()));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(reloader.run(shutdown.clone()));

        shutdown.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("reloader did not stop")
            .unwrap();
    }
}
