//! Sync engine state machine.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::replica::ReplicaStore;
use crate::transport::SyncTransport;
use devkv_sync_protocol::{
    DeviceId, PullRequest, PushRequest, PushResponse, SyncMessage, SyncMode, SyncRecord,
    SyncStatus,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle has run yet.
    Idle,
    /// A cycle is exchanging records with peers.
    Syncing,
    /// The last cycle reached every peer.
    Completed,
    /// At least one peer failed in the last cycle.
    Failed,
}

impl SyncState {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }

    /// Returns true if a new cycle may start.
    pub fn can_start(&self) -> bool {
        !self.is_active()
    }
}

/// Statistics about sync cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles in which every peer succeeded.
    pub cycles_completed: u64,
    /// Cycles with at least one failed peer.
    pub cycles_failed: u64,
    /// Records sent to peers.
    pub records_pushed: u64,
    /// Records received from peers.
    pub records_pulled: u64,
    /// End of the last cycle.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Outcome of one sync cycle.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Status per requested device, in request order.
    pub results: Vec<(DeviceId, SyncStatus)>,
    /// Records sent.
    pub pushed: u64,
    /// Records received.
    pub pulled: u64,
    /// Wall time of the cycle, excluding the start delay.
    pub duration: Duration,
}

impl SyncReport {
    /// Returns true if every device succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|(_, status)| status.is_success())
    }

    /// Status reported for `device`, if it was part of the cycle.
    pub fn status_of(&self, device: &DeviceId) -> Option<SyncStatus> {
        self.results
            .iter()
            .find(|(d, _)| d == device)
            .map(|(_, status)| *status)
    }
}

/// Drives sync cycles for one replica.
///
/// Cycles are serialized: a second call waits until the running one ends.
pub struct SyncEngine {
    config: RwLock<SyncConfig>,
    transport: Arc<dyn SyncTransport>,
    replica: Weak<dyn ReplicaStore>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    cycle_lock: tokio::sync::Mutex<()>,
    cancelled: AtomicBool,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &*self.config.read())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Creates an engine for `replica` talking over `transport`.
    pub fn new(
        config: SyncConfig,
        transport: Arc<dyn SyncTransport>,
        replica: Weak<dyn ReplicaStore>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            transport,
            replica,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            cycle_lock: tokio::sync::Mutex::new(()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Current configuration.
    pub fn config(&self) -> SyncConfig {
        self.config.read().clone()
    }

    /// Changes the delay used when a cycle is requested without one.
    pub fn set_default_delay(&self, delay: Duration) {
        self.config.write().default_delay = delay;
    }

    /// Changes the per-peer timeout.
    pub fn set_timeout(&self, timeout: Duration) {
        self.config.write().timeout = timeout;
    }

    /// Stops this and all later cycles. Peers not yet reached report
    /// [`SyncStatus::Cancelled`].
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Peers the transport can currently reach.
    pub fn online_peers(&self) -> Vec<DeviceId> {
        self.transport.online_peers()
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn replica(&self) -> SyncResult<Arc<dyn ReplicaStore>> {
        self.replica.upgrade().ok_or(SyncError::Cancelled)
    }

    fn begin(&self) -> SyncResult<()> {
        let mut state = self.state.write();
        if !state.can_start() {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{:?}", *state),
                to: format!("{:?}", SyncState::Syncing),
            });
        }
        *state = SyncState::Syncing;
        Ok(())
    }

    /// Runs one cycle against `peers`.
    ///
    /// Waits `delay` (or the configured default) first. Every peer is
    /// handled independently; a failure with one never stops the others.
    pub async fn run_cycle(
        &self,
        peers: Vec<DeviceId>,
        mode: SyncMode,
        delay: Option<Duration>,
    ) -> SyncReport {
        let config = self.config();
        let delay = delay.unwrap_or(config.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let _cycle = self.cycle_lock.lock().await;
        let started = Instant::now();
        let mut report = SyncReport {
            results: Vec::with_capacity(peers.len()),
            pushed: 0,
            pulled: 0,
            duration: Duration::ZERO,
        };

        if let Err(e) = self.begin() {
            tracing::warn!(error = %e, "sync cycle rejected");
            report.results = peers
                .into_iter()
                .map(|peer| (peer, SyncStatus::Failed))
                .collect();
            return report;
        }

        tracing::debug!(peers = peers.len(), %mode, "sync cycle started");
        let mut last_error = None;
        for peer in peers {
            let outcome = match self.check_cancelled() {
                Ok(()) => match tokio::time::timeout(config.timeout, self.exchange_with(&peer, mode))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(SyncError::Timeout {
                        device: peer.clone(),
                        after: config.timeout,
                    }),
                },
                Err(e) => Err(e),
            };

            let status = match outcome {
                Ok((pushed, pulled)) => {
                    report.pushed += pushed;
                    report.pulled += pulled;
                    if let Ok(replica) = self.replica() {
                        replica.peer_seen(&peer);
                    }
                    tracing::debug!(%peer, pushed, pulled, "peer synced");
                    SyncStatus::Success
                }
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "peer sync failed");
                    let status = e.status();
                    last_error = Some(e.to_string());
                    status
                }
            };
            report.results.push((peer, status));
        }

        report.duration = started.elapsed();
        let succeeded = report.all_succeeded();
        *self.state.write() = if succeeded {
            SyncState::Completed
        } else {
            SyncState::Failed
        };
        {
            let mut stats = self.stats.write();
            if succeeded {
                stats.cycles_completed += 1;
            } else {
                stats.cycles_failed += 1;
            }
            stats.records_pushed += report.pushed;
            stats.records_pulled += report.pulled;
            stats.last_sync_time = Some(Instant::now());
            if last_error.is_some() {
                stats.last_error = last_error;
            }
        }
        tracing::info!(
            devices = report.results.len(),
            pushed = report.pushed,
            pulled = report.pulled,
            succeeded,
            "sync cycle finished"
        );
        report
    }

    async fn exchange_with(&self, peer: &DeviceId, mode: SyncMode) -> SyncResult<(u64, u64)> {
        let replica = self.replica()?;
        let labels: Option<Vec<String>> = replica
            .sync_range()
            .map(|range| range.labels().into_iter().collect());
        let mut pushed = 0;
        let mut pulled = 0;

        if mode.pushes() {
            let records = {
                let replica = Arc::clone(&replica);
                let labels = labels.clone();
                run_blocking(move || {
                    replica.authored_records(replica.local_device(), labels.as_deref())
                })
                .await?
            };
            pushed = records.len() as u64;
            let request = SyncMessage::PushRequest(PushRequest {
                store_id: replica.store_id().to_string(),
                sender: replica.local_device().clone(),
                records,
            });
            match self.round_trip(peer, &request).await? {
                SyncMessage::PushResponse(PushResponse {
                    applied,
                    superseded,
                }) => {
                    tracing::debug!(%peer, applied, superseded, "push acknowledged");
                }
                other => return Err(unexpected(&other)),
            }
        }

        self.check_cancelled()?;

        if mode.pulls() {
            let request = SyncMessage::PullRequest(PullRequest {
                store_id: replica.store_id().to_string(),
                requester: replica.local_device().clone(),
                labels,
            });
            let mut records = match self.round_trip(peer, &request).await? {
                SyncMessage::PullResponse(response) => response.records,
                other => return Err(unexpected(&other)),
            };
            if let Some(range) = replica.sync_range() {
                records.retain(|record: &SyncRecord| range.admits(&record.label));
            }
            pulled = records.len() as u64;
            let from = peer.clone();
            let replica = Arc::clone(&replica);
            run_blocking(move || replica.merge_records(&from, records)).await?;
        }

        Ok((pushed, pulled))
    }

    async fn round_trip(&self, peer: &DeviceId, request: &SyncMessage) -> SyncResult<SyncMessage> {
        let frame = request.encode()?;
        let reply = self.transport.exchange(peer, frame).await?;
        match SyncMessage::decode(&reply)? {
            SyncMessage::Error(error) => Err(SyncError::Remote(error.message)),
            message => Ok(message),
        }
    }
}

fn unexpected(message: &SyncMessage) -> SyncError {
    SyncError::Remote(format!("unexpected {} reply", message.name()))
}

async fn run_blocking<T, F>(f: F) -> SyncResult<T>
where
    F: FnOnce() -> SyncResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SyncError::replica(format!("replica task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_can_start() {
        assert!(SyncState::Idle.can_start());
        assert!(SyncState::Completed.can_start());
        assert!(SyncState::Failed.can_start());
        assert!(!SyncState::Syncing.can_start());
    }

    #[test]
    fn report_lookup() {
        let tv = DeviceId::new("tv").unwrap();
        let watch = DeviceId::new("watch").unwrap();
        let report = SyncReport {
            results: vec![
                (tv.clone(), SyncStatus::Success),
                (watch.clone(), SyncStatus::Unreachable),
            ],
            pushed: 0,
            pulled: 0,
            duration: Duration::ZERO,
        };
        assert!(!report.all_succeeded());
        assert_eq!(report.status_of(&tv), Some(SyncStatus::Success));
        assert_eq!(report.status_of(&watch), Some(SyncStatus::Unreachable));
        assert_eq!(report.status_of(&DeviceId::new("car").unwrap()), None);
    }
}
