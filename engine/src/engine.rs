//! The sync engine.
//!
//! One explicitly constructed engine instance per session owns the whole
//! sync lifecycle: it observes local mutations through the store's
//! observer contract, debounces them into uploads, reconciles remote
//! state into the store, polls for remote freshness, and migrates record
//! ownership across login boundaries. All of it sits behind a two-state
//! offline/cloud gate.
//!
//! A single mutual-exclusion flag guarantees at most one of push/pull is
//! inside its network-plus-reconciliation section at a time; triggers
//! arriving while busy are coalesced into a "run once more" flag rather
//! than queued.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::auth::AuthProvider;
use crate::record::{JournalEntry, SyncState, Syncable, Task, GUEST_OWNER};
use crate::resolve::{resolve, Resolution};
use crate::store::{HasTable, LocalStore, Tables};
use crate::transport::{PushBatch, RemoteTransport};
use crate::{Error, OwnerId, RecordId, Result, Timestamp};

/// Store metadata key the mode is persisted under.
const MODE_META_KEY: &str = "syncMode";

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

/// Whether the engine talks to the remote at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Offline,
    Cloud,
}

impl SyncMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::Offline => "offline",
            SyncMode::Cloud => "cloud",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "offline" => Some(SyncMode::Offline),
            "cloud" => Some(SyncMode::Cloud),
            _ => None,
        }
    }
}

/// Observable state of the sync pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    /// Local changes are waiting out the debounce window.
    Pending,
    Syncing,
    Synced,
    Failed,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SyncStatus::Idle => "",
            SyncStatus::Pending => "Changes pending...",
            SyncStatus::Syncing => "Syncing...",
            SyncStatus::Synced => "Synced",
            SyncStatus::Failed => "Sync Failed",
        };
        f.write_str(text)
    }
}

/// What to do with local records on sign-out. There is no default; the
/// caller must choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutPolicy {
    /// Remove all local records for the signed-out identity.
    Clear,
    /// Reassign all local records to the guest identity as dirty drafts
    /// so a later session can still see and re-sync them.
    Retain,
}

/// Engine timing knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Quiet period a burst of local edits must survive before one push.
    pub debounce: Duration,
    /// Cadence of the remote freshness check.
    pub poll_interval: Duration,
    /// Remote freshness must exceed local by more than this to trigger a
    /// pull; absorbs clock drift and the wake right after our own push.
    pub freshness_skew_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            poll_interval: Duration::from_secs(5),
            freshness_skew_ms: 1000,
        }
    }
}

/// The per-session sync engine. Constructed once and shared by reference;
/// see [`SyncEngine::new`].
pub struct SyncEngine {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteTransport>,
    auth: Arc<dyn AuthProvider>,
    config: EngineConfig,
    mode: RwLock<SyncMode>,
    /// Mutual exclusion for the push/pull critical sections.
    busy: tokio::sync::Mutex<()>,
    /// "Run one more push after the current sync finishes."
    pending_upload: AtomicBool,
    status_tx: watch::Sender<SyncStatus>,
    debounce_task: Mutex<Option<JoinHandle<()>>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    /// Handle the engine gives its own background tasks; they hold no
    /// strong reference, so dropping the engine ends them.
    weak: Weak<SyncEngine>,
}

impl SyncEngine {
    /// Build the engine and attach its change interceptor to the store.
    ///
    /// The persisted mode is restored from store metadata; a fresh store
    /// starts offline.
    pub fn new(
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteTransport>,
        auth: Arc<dyn AuthProvider>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let mode = store
            .meta_get(MODE_META_KEY)
            .and_then(|s| SyncMode::parse(&s))
            .unwrap_or(SyncMode::Offline);
        let (status_tx, _) = watch::channel(SyncStatus::Idle);

        let engine = Arc::new_cyclic(|weak| Self {
            store,
            remote,
            auth,
            config,
            mode: RwLock::new(mode),
            busy: tokio::sync::Mutex::new(()),
            pending_upload: AtomicBool::new(false),
            status_tx,
            debounce_task: Mutex::new(None),
            poll_task: Mutex::new(None),
            weak: weak.clone(),
        });

        let weak = Arc::downgrade(&engine);
        engine.store.observe(move |_event| {
            if let Some(engine) = weak.upgrade() {
                engine.schedule_push();
            }
        });

        engine
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Subscribe to status changes ("Syncing...", "Synced", ...).
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    fn set_status(&self, status: SyncStatus) {
        self.status_tx.send_replace(status);
    }

    pub fn mode(&self) -> SyncMode {
        *self.mode.read()
    }

    /// Switch modes. `offline -> cloud` runs the initial reconciliation
    /// (push first, then pull, then polling); `cloud -> offline` stops
    /// the poll loop and turns the scheduler into a no-op. The new mode
    /// is persisted across restarts.
    pub async fn set_mode(&self, mode: SyncMode) -> Result<()> {
        let previous = {
            let mut guard = self.mode.write();
            std::mem::replace(&mut *guard, mode)
        };
        self.store.meta_set(MODE_META_KEY, mode.as_str());

        match (previous, mode) {
            (SyncMode::Offline, SyncMode::Cloud) => self.initial_sync().await?,
            (SyncMode::Cloud, SyncMode::Offline) => {
                self.stop_polling();
                self.cancel_scheduled();
                self.set_status(SyncStatus::Idle);
            }
            _ => {}
        }
        Ok(())
    }

    /// The gate every sync entry point passes through: cloud mode and a
    /// live session, or nothing happens.
    fn gate(&self) -> Option<OwnerId> {
        if self.mode() != SyncMode::Cloud {
            return None;
        }
        if !self.auth.session_active() {
            return None;
        }
        self.auth.identity()
    }

    /// Reset the debounce timer; when it survives the quiet period it
    /// invokes one push. Called by the change interceptor on every local
    /// mutation. A no-op while offline or unauthenticated.
    pub fn schedule_push(&self) {
        if self.gate().is_none() {
            return;
        }
        self.set_status(SyncStatus::Pending);

        let weak = self.weak.clone();
        let delay = self.config.debounce;
        let mut slot = self.debounce_task.lock();
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(engine) = weak.upgrade() {
                if let Err(err) = engine.push().await {
                    tracing::warn!(error = %err, "scheduled push failed");
                }
            }
        }));
    }

    /// Push pipeline: ship dirty records and tombstone ids to the remote,
    /// then apply the local post-commit effects.
    ///
    /// If a sync is already in flight the request is coalesced into one
    /// deferred run. On failure all local state is left untouched and
    /// stays queued for the next trigger.
    pub async fn push(&self) -> Result<()> {
        let Some(owner) = self.gate() else {
            return Ok(());
        };
        let Ok(_guard) = self.busy.try_lock() else {
            tracing::debug!("sync in flight, coalescing upload");
            self.pending_upload.store(true, Ordering::SeqCst);
            return Ok(());
        };

        loop {
            self.pending_upload.store(false, Ordering::SeqCst);
            self.push_locked(&owner).await?;
            if !self.pending_upload.load(Ordering::SeqCst) {
                return Ok(());
            }
            // A mutation landed while we were uploading; run once more.
        }
    }

    async fn push_locked(&self, owner: &str) -> Result<()> {
        let batch = self.store.read(|tables| PushBatch {
            tasks: tables.dirty::<Task>(owner),
            journals: tables.dirty::<JournalEntry>(owner),
            deleted_task_ids: tables.tombstone_ids::<Task>(owner),
            deleted_journal_ids: tables.tombstone_ids::<JournalEntry>(owner),
        });

        if batch.is_empty() {
            tracing::debug!("nothing to upload");
            self.set_status(SyncStatus::Synced);
            return Ok(());
        }

        self.set_status(SyncStatus::Syncing);
        if let Err(err) = self.remote.push(&batch).await {
            tracing::warn!(error = %err, "upload failed");
            self.set_status(SyncStatus::Failed);
            return Err(err);
        }

        // The remote accepted the batch: purge confirmed tombstones and
        // flip the pushed dirty records to synced, in one transaction.
        let commit = self.store.transaction(|tables| {
            for id in &batch.deleted_task_ids {
                tables.remove::<Task>(id);
            }
            for id in &batch.deleted_journal_ids {
                tables.remove::<JournalEntry>(id);
            }
            mark_synced::<Task>(tables, batch.tasks.iter().map(|t| t.id.clone()));
            mark_synced::<JournalEntry>(tables, batch.journals.iter().map(|j| j.id.clone()));
            Ok(())
        });
        if let Err(err) = commit {
            self.set_status(SyncStatus::Failed);
            return Err(err);
        }

        tracing::info!(
            tasks = batch.tasks.len(),
            journals = batch.journals.len(),
            deleted = batch.deleted_task_ids.len() + batch.deleted_journal_ids.len(),
            "upload complete"
        );
        self.set_status(SyncStatus::Synced);
        Ok(())
    }

    /// Pull pipeline: fetch the remote live set and reconcile it into the
    /// local store in one atomic transaction per invocation.
    pub async fn pull(&self) -> Result<()> {
        let Some(owner) = self.gate() else {
            return Ok(());
        };
        let Ok(guard) = self.busy.try_lock() else {
            return Ok(());
        };

        let result = self.pull_locked(&owner).await;
        drop(guard);

        // An upload was requested while we were reconciling; run it now
        // that the flag is free.
        if self.pending_upload.swap(false, Ordering::SeqCst) {
            self.push().await?;
        }
        result
    }

    async fn pull_locked(&self, owner: &str) -> Result<()> {
        self.set_status(SyncStatus::Syncing);

        let remote = match self.remote.fetch().await {
            Ok(set) => set,
            Err(err) => {
                tracing::warn!(error = %err, "download failed");
                self.set_status(SyncStatus::Failed);
                return Err(err);
            }
        };

        let commit = self.store.transaction(|tables| {
            reconcile_kind::<Task>(tables, owner, remote.tasks);
            reconcile_kind::<JournalEntry>(tables, owner, remote.journals);
            Ok(())
        });
        if let Err(err) = commit {
            self.set_status(SyncStatus::Failed);
            return Err(err);
        }

        tracing::info!("download complete");
        self.set_status(SyncStatus::Synced);
        Ok(())
    }

    /// Initial reconciliation after entering cloud mode: push first so
    /// offline edits are acknowledged by the remote before any pull could
    /// downgrade them, then pull, then start polling.
    pub async fn initial_sync(&self) -> Result<()> {
        if self.gate().is_none() {
            return Ok(());
        }
        self.push().await?;
        self.pull().await?;
        self.start_polling();
        Ok(())
    }

    /// One freshness probe: compare the remote's max modification
    /// timestamp against the local max among synced records and pull if
    /// the remote is ahead by more than the skew tolerance.
    pub async fn poll_once(&self) -> Result<()> {
        if self.gate().is_none() {
            return Ok(());
        }

        let needs_pull = {
            // Skip the probe entirely while a push or pull is in flight.
            let Ok(_guard) = self.busy.try_lock() else {
                return Ok(());
            };
            let remote_ts = self.remote.latest_change().await?;
            let local_ts = self.store.read(|tables| {
                tables
                    .max_synced_updated_at::<Task>()
                    .max(tables.max_synced_updated_at::<JournalEntry>())
            });
            remote_ts > local_ts + self.config.freshness_skew_ms
        };

        if needs_pull {
            tracing::info!("remote is fresher, pulling");
            self.pull().await?;
        }
        Ok(())
    }

    /// Start the poll loop. Replaces any previous loop.
    pub fn start_polling(&self) {
        let weak = self.weak.clone();
        let period = self.config.poll_interval;

        let mut slot = self.poll_task.lock();
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately; skip it so the loop
            // starts one full period after the initial reconciliation.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(engine) = weak.upgrade() else {
                    break;
                };
                // Detached, so stopping the loop never cancels a probe or
                // pull that is already in flight.
                tokio::spawn(async move {
                    if let Err(err) = engine.poll_once().await {
                        tracing::debug!(error = %err, "freshness check failed");
                    }
                });
            }
        }));
    }

    pub fn stop_polling(&self) {
        if let Some(handle) = self.poll_task.lock().take() {
            handle.abort();
        }
    }

    fn cancel_scheduled(&self) {
        if let Some(handle) = self.debounce_task.lock().take() {
            handle.abort();
        }
    }

    /// Adopt guest records after authentication: everything owned by the
    /// guest sentinel is reassigned to the new identity and re-marked
    /// dirty so it is uploaded rather than left orphaned, then the
    /// initial reconciliation runs.
    pub async fn on_login(&self) -> Result<()> {
        let identity = self.auth.identity().ok_or(Error::AuthExpired)?;

        let migrated = self.store.transaction(|tables| {
            let mut count = reassign::<Task>(tables, Some(GUEST_OWNER), &identity);
            count += reassign::<JournalEntry>(tables, Some(GUEST_OWNER), &identity);
            Ok(count)
        })?;
        if migrated > 0 {
            tracing::info!(migrated, "adopted guest records for new identity");
        }

        self.initial_sync().await
    }

    /// Tear down sync for a signed-out identity. The caller chooses the
    /// data policy explicitly; there is no silent default.
    pub fn sign_out(&self, identity: &str, policy: SignOutPolicy) -> Result<()> {
        self.stop_polling();
        self.cancel_scheduled();
        self.set_status(SyncStatus::Idle);

        match policy {
            SignOutPolicy::Clear => self.store.transaction(|tables| {
                remove_owned::<Task>(tables, identity);
                remove_owned::<JournalEntry>(tables, identity);
                Ok(())
            }),
            SignOutPolicy::Retain => self.store.transaction(|tables| {
                reassign::<Task>(tables, None, GUEST_OWNER);
                reassign::<JournalEntry>(tables, None, GUEST_OWNER);
                Ok(())
            }),
        }
    }

    /// Cancel the engine's scheduled tasks. Also runs on drop.
    pub fn shutdown(&self) {
        self.stop_polling();
        self.cancel_scheduled();
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Merge one kind's remote live set into the local tables.
///
/// Clean local records absent from the remote set are deleted; dirty ones
/// represent unsynced local work and survive until their own push
/// resolves them. Remote records are adopted (marked synced) only where
/// the resolver says they win.
fn reconcile_kind<R: Syncable>(tables: &mut Tables, owner: &str, remote_records: Vec<R>)
where
    Tables: HasTable<R>,
{
    let remote_ids: HashSet<RecordId> = remote_records.iter().map(|r| r.id().clone()).collect();

    let stale: Vec<RecordId> = tables
        .all::<R>()
        .filter(|r| {
            r.owner_id() == owner
                && r.sync_state() == SyncState::Synced
                && !remote_ids.contains(r.id())
        })
        .map(|r| r.id().clone())
        .collect();
    for id in stale {
        tables.remove::<R>(&id);
    }

    for mut record in remote_records {
        if resolve(tables.get::<R>(record.id()), &record) == Resolution::RemoteWins {
            record.set_sync_state(SyncState::Synced);
            tables.put(record);
        }
    }
}

fn mark_synced<R: Syncable>(tables: &mut Tables, ids: impl Iterator<Item = RecordId>)
where
    Tables: HasTable<R>,
{
    for id in ids {
        if let Some(record) = tables.get::<R>(&id) {
            let mut record = record.clone();
            record.set_sync_state(SyncState::Synced);
            tables.put(record);
        }
    }
}

/// Reassign ownership; `from = None` means every record. Reassigned
/// records are re-marked `created` so they are pushed as fresh drafts.
fn reassign<R: Syncable>(tables: &mut Tables, from: Option<&str>, to: &str) -> usize
where
    Tables: HasTable<R>,
{
    let ids: Vec<RecordId> = tables
        .all::<R>()
        .filter(|r| from.map_or(true, |from| r.owner_id() == from))
        .map(|r| r.id().clone())
        .collect();
    let count = ids.len();
    for id in ids {
        if let Some(record) = tables.get::<R>(&id) {
            let mut record = record.clone();
            record.set_owner_id(to.to_string());
            record.set_sync_state(SyncState::Created);
            tables.put(record);
        }
    }
    count
}

fn remove_owned<R: Syncable>(tables: &mut Tables, owner: &str)
where
    Tables: HasTable<R>,
{
    let ids: Vec<RecordId> = tables
        .all::<R>()
        .filter(|r| r.owner_id() == owner)
        .map(|r| r.id().clone())
        .collect();
    for id in ids {
        tables.remove::<R>(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_string_roundtrip() {
        assert_eq!(SyncMode::parse("cloud"), Some(SyncMode::Cloud));
        assert_eq!(SyncMode::parse("offline"), Some(SyncMode::Offline));
        assert_eq!(SyncMode::parse("bogus"), None);
        assert_eq!(SyncMode::parse(SyncMode::Cloud.as_str()), Some(SyncMode::Cloud));
    }

    #[test]
    fn status_text() {
        assert_eq!(SyncStatus::Idle.to_string(), "");
        assert_eq!(SyncStatus::Syncing.to_string(), "Syncing...");
        assert_eq!(SyncStatus::Synced.to_string(), "Synced");
        assert_eq!(SyncStatus::Failed.to_string(), "Sync Failed");
    }

    #[test]
    fn default_config_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.debounce, Duration::from_secs(2));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.freshness_skew_ms, 1000);
    }
}
