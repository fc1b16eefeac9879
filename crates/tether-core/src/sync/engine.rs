//! Sync coordinator: one guarded upload → download → apply → checkpoint cycle
//! at a time, plus the periodic auto-sync task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::apply::{ApplyLayer, DEFAULT_EVENT_CAPACITY};
use super::download::DownloadStage;
use super::transport::{ResolveConflictRequest, SyncTransport};
use super::upload::UploadPipeline;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::models::{
    ChangeEvent, NewOperation, QueuedOperation, ResolutionStrategy, SyncCheckpoint, SyncConflict,
};
use crate::services::LocalStore;
use crate::state::SyncState;
use crate::util::unix_millis_now;

/// Result of a [`SyncEngine::sync`] call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOutcome {
    pub success: bool,
    /// Another cycle was already running; nothing was done
    pub skipped: bool,
    /// Conflicts left for the application to resolve
    pub conflicts: Vec<SyncConflict>,
    /// Conflicts settled automatically with the configured strategy
    pub auto_resolved: usize,
    pub uploaded: usize,
    pub upload_failed: usize,
    pub applied: usize,
    /// Checkpoint generation after the cycle
    pub checkpoint: i64,
    /// The download page was full; call `sync` again to continue
    pub has_more: bool,
}

impl SyncOutcome {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    fn merge(mut self, follow_up: Self) -> Self {
        self.success = follow_up.success || follow_up.skipped;
        for conflict in follow_up.conflicts {
            if !self
                .conflicts
                .iter()
                .any(|c| c.conflict_id == conflict.conflict_id)
            {
                self.conflicts.push(conflict);
            }
        }
        self.auto_resolved += follow_up.auto_resolved;
        self.uploaded += follow_up.uploaded;
        self.upload_failed += follow_up.upload_failed;
        self.applied += follow_up.applied;
        self.checkpoint = self.checkpoint.max(follow_up.checkpoint);
        if !follow_up.skipped {
            self.has_more = follow_up.has_more;
        }
        self
    }
}

/// Releases the single-flight flag when a cycle ends, however it ends
struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct AutoSync {
    stop: watch::Sender<bool>,
    _task: JoinHandle<()>,
}

/// Offline-first sync engine for one device and tenant.
///
/// Share it as `Arc<SyncEngine>`; auto-sync needs the `Arc` and every other
/// method works through `&self`.
pub struct SyncEngine {
    config: Arc<EngineConfig>,
    transport: Arc<dyn SyncTransport>,
    store: LocalStore,
    upload: UploadPipeline,
    download: DownloadStage,
    apply: ApplyLayer,
    syncing: AtomicBool,
    online: AtomicBool,
    state: watch::Sender<SyncState>,
    auto_sync: Mutex<Option<AutoSync>>,
}

impl SyncEngine {
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn SyncTransport>,
        store: LocalStore,
    ) -> Result<Self> {
        let config = Arc::new(config.validate()?);
        let (state, _) = watch::channel(SyncState::Idle);

        Ok(Self {
            upload: UploadPipeline::new(transport.clone(), store.clone(), config.clone()),
            download: DownloadStage::new(transport.clone(), config.clone()),
            apply: ApplyLayer::new(store.clone(), DEFAULT_EVENT_CAPACITY),
            config,
            transport,
            store,
            syncing: AtomicBool::new(false),
            online: AtomicBool::new(true),
            state,
            auto_sync: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Whether a cycle is running right now
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Record connectivity reported by the host. Scheduled cycles are
    /// skipped while offline; explicit `sync` calls still run.
    pub fn set_online(&self, online: bool) {
        let was_online = self.online.swap(online, Ordering::AcqRel);
        if was_online == online {
            return;
        }
        if online {
            info!("Device is online");
            self.state.send_if_modified(|state| {
                if *state == SyncState::Offline {
                    *state = SyncState::Idle;
                    true
                } else {
                    false
                }
            });
        } else {
            info!("Device is offline");
            self.state.send_replace(SyncState::Offline);
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Locally mirrored checkpoint generation
    pub async fn checkpoint(&self) -> Result<i64> {
        self.store
            .checkpoint_generation(&self.config.tenant_id)
            .await
    }

    /// Queued operations not yet acknowledged by the server
    pub async fn pending_count(&self) -> Result<u64> {
        Ok(self.store.queue_counts().await?.outstanding())
    }

    /// Watch lifecycle state changes
    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Events for every change applied from the server
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.apply.subscribe()
    }

    /// Persist a local mutation and, when online, try to sync right away.
    ///
    /// Only validation and local persistence errors are returned; the
    /// outcome of the triggered cycle is logged.
    pub async fn queue_operation(&self, op: NewOperation) -> Result<QueuedOperation> {
        op.validate()?;
        let queued = QueuedOperation::from_new(
            op,
            &self.config.device_id,
            &self.config.tenant_id,
            unix_millis_now(),
            self.config.debounce_ms(),
        );
        self.store.enqueue(&queued).await?;
        debug!(
            "Queued {} on {} as {}",
            queued.operation_type,
            queued.entity_key(),
            queued.id
        );

        if self.is_online() {
            let outcome = self.sync().await;
            if !outcome.success && !outcome.skipped {
                debug!("Sync after queueing {} did not complete", queued.id);
            }
        }
        Ok(queued)
    }

    /// Run one sync cycle unless one is already in progress.
    ///
    /// Never returns an error: failures are logged and reported as
    /// `success: false`. When conflicts were settled automatically, one
    /// follow-up cycle pulls the resolved values.
    pub async fn sync(&self) -> SyncOutcome {
        let outcome = self.run_guarded().await;
        if outcome.success && outcome.auto_resolved > 0 {
            debug!(
                "Running follow-up cycle for {} auto-resolved conflicts",
                outcome.auto_resolved
            );
            let follow_up = self.run_guarded().await;
            return outcome.merge(follow_up);
        }
        outcome
    }

    /// Settle a conflict on the server and sync.
    ///
    /// `resolved_value` may be omitted for `client_wins`/`server_wins`, in
    /// which case the recorded local or remote value is sent.
    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        strategy: ResolutionStrategy,
        resolved_value: Option<serde_json::Value>,
    ) -> Result<SyncOutcome> {
        let conflict_id = conflict_id.trim();
        if conflict_id.is_empty() {
            return Err(Error::InvalidInput("conflict id must not be empty".into()));
        }

        let resolved_value = match resolved_value {
            Some(value) => Some(value),
            None => self
                .store
                .get_conflict(conflict_id)
                .await?
                .and_then(|stored| stored.conflict.default_resolution_value(strategy)),
        };
        if strategy == ResolutionStrategy::Manual && resolved_value.is_none() {
            return Err(Error::InvalidInput(
                "manual resolution requires a resolved value".into(),
            ));
        }

        self.transport
            .resolve_conflict(&ResolveConflictRequest {
                conflict_id: conflict_id.to_string(),
                strategy,
                resolved_value,
            })
            .await?;
        self.store
            .mark_conflict_resolved(conflict_id, strategy, unix_millis_now())
            .await?;
        info!("Resolved conflict {conflict_id} with {strategy}");

        Ok(self.sync().await)
    }

    /// Start periodic sync and run one cycle immediately.
    ///
    /// Returns `false` (without syncing) when auto-sync is already running.
    /// The task holds only a weak reference and ends when the engine is
    /// dropped.
    pub async fn start_auto_sync(self: &Arc<Self>, interval: Duration) -> bool {
        let interval = interval.max(Duration::from_millis(1));
        {
            let mut slot = self.auto_sync.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                debug!("Auto-sync already running");
                return false;
            }
            let (stop, stop_rx) = watch::channel(false);
            let task = tokio::spawn(auto_sync_loop(Arc::downgrade(self), interval, stop_rx));
            *slot = Some(AutoSync { stop, _task: task });
        }

        info!("Auto-sync started with interval {interval:?}");
        self.sync().await;
        true
    }

    /// Stop periodic sync. A cycle already running is allowed to finish.
    pub fn stop_auto_sync(&self) -> bool {
        let running = self
            .auto_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match running {
            Some(auto_sync) => {
                let _ = auto_sync.stop.send(true);
                info!("Auto-sync stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_auto_sync_running(&self) -> bool {
        self.auto_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn run_guarded(&self) -> SyncOutcome {
        let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
            debug!("Sync already in progress, skipping");
            return SyncOutcome::skipped();
        };

        self.state.send_replace(SyncState::Syncing);
        match self.run_cycle().await {
            Ok(outcome) => {
                self.state.send_replace(if self.is_online() {
                    SyncState::Synced
                } else {
                    SyncState::Offline
                });
                outcome
            }
            Err(err) => {
                error!("Sync failed: {err}");
                self.state.send_replace(SyncState::Error);
                SyncOutcome::default()
            }
        }
    }

    async fn run_cycle(&self) -> Result<SyncOutcome> {
        let mut checkpoint = self.load_checkpoint().await?;
        let start_generation = checkpoint.last_sync_generation;

        let upload = self.upload.run().await?;
        let download = self.download.fetch(start_generation).await?;

        let now = unix_millis_now();
        for conflict in &download.conflicts {
            warn!(
                "Conflict {} on {} ({})",
                conflict.conflict_id,
                conflict.entity_key(),
                conflict.resolution_strategy
            );
            self.store.record_conflict(conflict, now).await?;
        }

        let applied = self.apply.apply(&download.changes).await;

        if let Some(max_generation) = applied.max_generation {
            if checkpoint.advance_to(max_generation) {
                checkpoint.pending_changes_count =
                    i64::try_from(self.store.queue_counts().await?.outstanding())
                        .unwrap_or(i64::MAX);
                self.transport.store_state(&checkpoint).await?;
            }
        }
        let generation = self
            .store
            .save_checkpoint_generation(&self.config.tenant_id, checkpoint.last_sync_generation)
            .await?;

        let (conflicts, auto_resolved) = self.settle_conflicts(download.conflicts).await;
        self.prune_processed(now).await;

        info!(
            "Sync complete: uploaded {}, applied {}, checkpoint {generation}",
            upload.processed, applied.applied
        );
        Ok(SyncOutcome {
            success: true,
            skipped: false,
            conflicts,
            auto_resolved,
            uploaded: upload.processed,
            upload_failed: upload.failed(),
            applied: applied.applied,
            checkpoint: generation,
            has_more: download.has_more,
        })
    }

    async fn prune_processed(&self, now_ms: i64) {
        let cutoff = now_ms.saturating_sub(self.config.processed_retention_ms());
        match self.store.prune_processed(cutoff).await {
            Ok(0) => {}
            Ok(pruned) => debug!("Pruned {pruned} processed operations"),
            Err(err) => warn!("Failed to prune processed operations: {err}"),
        }
    }

    /// Server checkpoint, never behind the local mirror
    async fn load_checkpoint(&self) -> Result<SyncCheckpoint> {
        let mut checkpoint = self
            .transport
            .fetch_state(&self.config.device_id, &self.config.tenant_id)
            .await?;
        let local = self
            .store
            .checkpoint_generation(&self.config.tenant_id)
            .await?;
        if local > checkpoint.last_sync_generation {
            debug!(
                "Server checkpoint {} is behind local {local}",
                checkpoint.last_sync_generation
            );
            checkpoint.last_sync_generation = local;
        }
        Ok(checkpoint)
    }

    /// Submit automatic resolutions; returns the conflicts still open
    async fn settle_conflicts(&self, conflicts: Vec<SyncConflict>) -> (Vec<SyncConflict>, usize) {
        let mut open = Vec::new();
        let mut resolved = 0;

        for conflict in conflicts {
            let strategy = conflict.resolution_strategy;
            if !strategy.is_automatic() {
                open.push(conflict);
                continue;
            }

            let request = ResolveConflictRequest {
                conflict_id: conflict.conflict_id.clone(),
                strategy,
                resolved_value: conflict.default_resolution_value(strategy),
            };
            let settled = match self.transport.resolve_conflict(&request).await {
                Ok(()) => self
                    .store
                    .mark_conflict_resolved(&conflict.conflict_id, strategy, unix_millis_now())
                    .await
                    .map(|_| ()),
                Err(err) => Err(err),
            };

            match settled {
                Ok(()) => {
                    info!(
                        "Auto-resolved conflict {} with {strategy}",
                        conflict.conflict_id
                    );
                    resolved += 1;
                }
                Err(err) => {
                    warn!(
                        "Could not auto-resolve conflict {}: {err}",
                        conflict.conflict_id
                    );
                    open.push(conflict);
                }
            }
        }

        (open, resolved)
    }
}

async fn auto_sync_loop(
    engine: Weak<SyncEngine>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
        }

        let Some(engine) = engine.upgrade() else {
            break;
        };
        if !engine.is_online() {
            debug!("Offline, skipping scheduled sync");
            continue;
        }
        if engine.is_syncing() {
            debug!("Sync in progress, skipping scheduled sync");
            continue;
        }
        engine.sync().await;
    }

    debug!("Auto-sync task finished");
}
