//! The local record store.
//!
//! An in-memory, transactional table store keyed by record id, with
//! indexed queries by owner and day bucket, and synchronous mutation
//! hooks fired after every committed create/update/delete. The sync
//! engine registers its change interceptor through [`LocalStore::observe`]
//! rather than depending on any particular storage backend's hook API.
//!
//! Local writes always succeed regardless of connectivity; the sync
//! pipelines read and repair state through the same transactional API
//! and never bypass it.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::ordering;
use crate::record::{JournalEntry, Quadrant, SyncState, Syncable, Task};
use crate::{Error, RecordId, Result, Timestamp};

/// A single record table keyed by id.
#[derive(Debug, Clone)]
pub struct Table<R: Syncable> {
    records: HashMap<RecordId, R>,
}

impl<R: Syncable> Default for Table<R> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
        }
    }
}

impl<R: Syncable> Table<R> {
    pub fn get(&self, id: &str) -> Option<&R> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Created,
    Updated,
    Deleted,
}

/// A committed mutation, delivered to observers after the enclosing
/// transaction commits.
#[derive(Debug, Clone)]
pub struct MutationEvent {
    /// Record-kind name (`tasks`, `journals`).
    pub kind: &'static str,
    pub mutation: MutationKind,
    pub id: RecordId,
}

/// Gives [`Tables`] a slot per record kind so store and pipeline code can
/// stay generic over [`Syncable`].
pub trait HasTable<R: Syncable> {
    fn table(&self) -> &Table<R>;
    fn table_mut(&mut self) -> &mut Table<R>;
}

/// All record tables, mutated together inside one transaction.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    tasks: Table<Task>,
    journals: Table<JournalEntry>,
    events: Vec<MutationEvent>,
}

impl HasTable<Task> for Tables {
    fn table(&self) -> &Table<Task> {
        &self.tasks
    }
    fn table_mut(&mut self) -> &mut Table<Task> {
        &mut self.tasks
    }
}

impl HasTable<JournalEntry> for Tables {
    fn table(&self) -> &Table<JournalEntry> {
        &self.journals
    }
    fn table_mut(&mut self) -> &mut Table<JournalEntry> {
        &mut self.journals
    }
}

impl Tables {
    pub fn get<R: Syncable>(&self, id: &str) -> Option<&R>
    where
        Self: HasTable<R>,
    {
        <Self as HasTable<R>>::table(self).get(id)
    }

    /// Insert or replace a record, recording the mutation for observers.
    pub fn put<R: Syncable>(&mut self, record: R)
    where
        Self: HasTable<R>,
    {
        let mutation = if <Self as HasTable<R>>::table(self).contains(record.id()) {
            MutationKind::Updated
        } else {
            MutationKind::Created
        };
        self.events.push(MutationEvent {
            kind: R::KIND,
            mutation,
            id: record.id().clone(),
        });
        <Self as HasTable<R>>::table_mut(self)
            .records
            .insert(record.id().clone(), record);
    }

    /// Hard-delete a record, recording the mutation for observers. A
    /// missing id is a no-op.
    pub fn remove<R: Syncable>(&mut self, id: &str)
    where
        Self: HasTable<R>,
    {
        if <Self as HasTable<R>>::table_mut(self).records.remove(id).is_some() {
            self.events.push(MutationEvent {
                kind: R::KIND,
                mutation: MutationKind::Deleted,
                id: id.to_string(),
            });
        }
    }

    pub fn all<R: Syncable>(&self) -> impl Iterator<Item = &R>
    where
        Self: HasTable<R>,
    {
        <Self as HasTable<R>>::table(self).iter()
    }

    /// Records owned by `owner` with unpushed changes.
    pub fn dirty<R: Syncable>(&self, owner: &str) -> Vec<R>
    where
        Self: HasTable<R>,
    {
        self.all::<R>()
            .filter(|r| r.owner_id() == owner && r.sync_state().is_dirty())
            .cloned()
            .collect()
    }

    /// Ids of tombstones owned by `owner`.
    pub fn tombstone_ids<R: Syncable>(&self, owner: &str) -> Vec<RecordId>
    where
        Self: HasTable<R>,
    {
        self.all::<R>()
            .filter(|r| r.owner_id() == owner && r.sync_state() == SyncState::Deleted)
            .map(|r| r.id().clone())
            .collect()
    }

    /// Freshest `updatedAt` among synced records of one kind.
    pub fn max_synced_updated_at<R: Syncable>(&self) -> Timestamp
    where
        Self: HasTable<R>,
    {
        self.all::<R>()
            .filter(|r| r.sync_state() == SyncState::Synced)
            .map(|r| r.updated_at())
            .max()
            .unwrap_or(0)
    }

    /// Live tasks in one (owner, date, quadrant) bucket, sorted by
    /// ranking key.
    pub fn quadrant_tasks(&self, owner: &str, date: &str, quadrant: Quadrant) -> Vec<Task> {
        let mut bucket: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| {
                t.owner_id == owner
                    && t.date == date
                    && t.quadrant == quadrant
                    && t.sync_state != SyncState::Deleted
            })
            .cloned()
            .collect();
        bucket.sort_by(|a, b| a.order.total_cmp(&b.order));
        bucket
    }

    /// Live journal entries for one day, oldest first.
    pub fn journal_for_day(&self, owner: &str, date: &str) -> Vec<JournalEntry> {
        let mut entries: Vec<JournalEntry> = self
            .journals
            .iter()
            .filter(|j| j.owner_id == owner && j.date == date && j.sync_state != SyncState::Deleted)
            .cloned()
            .collect();
        entries.sort_by_key(|j| j.created_at);
        entries
    }
}

type Hook = Box<dyn Fn(&MutationEvent) + Send + Sync>;

/// The shared local store. Cheap to clone behind an `Arc`; all mutation
/// goes through [`LocalStore::transaction`].
#[derive(Default)]
pub struct LocalStore {
    tables: RwLock<Tables>,
    meta: RwLock<HashMap<String, String>>,
    hooks: RwLock<Vec<Hook>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mutation observer. Observers run synchronously after
    /// each transaction commits, outside the store lock.
    pub fn observe(&self, hook: impl Fn(&MutationEvent) + Send + Sync + 'static) {
        self.hooks.write().push(Box::new(hook));
    }

    /// Run `f` against a staged copy of the tables. On `Ok` the staged
    /// state replaces the live state in one swap and the collected
    /// mutation events are delivered to observers; on `Err` nothing is
    /// visible to readers and no events fire.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut guard = self.tables.write();
        let mut staged = guard.clone();
        staged.events.clear();

        let value = f(&mut staged)?;

        let events = std::mem::take(&mut staged.events);
        *guard = staged;
        drop(guard);

        self.emit(&events);
        Ok(value)
    }

    /// Read-only access to the tables.
    pub fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        f(&self.tables.read())
    }

    fn emit(&self, events: &[MutationEvent]) {
        let hooks = self.hooks.read();
        for event in events {
            for hook in hooks.iter() {
                hook(event);
            }
        }
    }

    /// Engine metadata persisted alongside the records (sync mode, etc).
    pub fn meta_get(&self, key: &str) -> Option<String> {
        self.meta.read().get(key).cloned()
    }

    pub fn meta_set(&self, key: &str, value: &str) {
        self.meta.write().insert(key.to_string(), value.to_string());
    }

    // ------------------------------------------------------------------
    // Task operations
    // ------------------------------------------------------------------

    /// Create a task appended to the end of its quadrant bucket.
    pub fn create_task(
        &self,
        owner: &str,
        title: &str,
        quadrant: Quadrant,
        date: &str,
        now: Timestamp,
    ) -> Result<Task> {
        self.transaction(|tables| {
            let keys: Vec<f64> = tables
                .quadrant_tasks(owner, date, quadrant)
                .iter()
                .map(|t| t.order)
                .collect();
            let task = Task::new(owner, title, quadrant, date, ordering::append_key(&keys), now);
            task.validate()?;
            tables.put(task.clone());
            Ok(task)
        })
    }

    /// Apply an edit to a live task. Bumps the version and dirties the
    /// record; validation failures abort without mutating anything.
    pub fn update_task(
        &self,
        id: &str,
        now: Timestamp,
        edit: impl FnOnce(&mut Task),
    ) -> Result<Task> {
        self.transaction(|tables| {
            let mut task = live::<Task>(tables, id)?;
            edit(&mut task);
            task.validate()?;
            task.mark_updated(now);
            tables.put(task.clone());
            Ok(task)
        })
    }

    /// Soft-delete a task. The tombstone is retained until a push
    /// confirms the remote deletion.
    pub fn delete_task(&self, id: &str, now: Timestamp) -> Result<()> {
        self.transaction(|tables| {
            let mut task = live::<Task>(tables, id)?;
            task.mark_deleted(now);
            tables.put(task);
            Ok(())
        })
    }

    /// Move a task to `quadrant` at `index` (None appends), reassigning
    /// its ranking key against the destination bucket only. Renumbers the
    /// whole bucket when keys degenerate.
    pub fn move_task(
        &self,
        id: &str,
        quadrant: Quadrant,
        index: Option<usize>,
        now: Timestamp,
    ) -> Result<Task> {
        self.transaction(|tables| {
            let mut task = live::<Task>(tables, id)?;

            let mut bucket: Vec<Task> = tables
                .quadrant_tasks(&task.owner_id, &task.date, quadrant)
                .into_iter()
                .filter(|t| t.id != task.id)
                .collect();
            let keys: Vec<f64> = bucket.iter().map(|t| t.order).collect();

            let key = ordering::place_key(&keys, index);
            let pos = match index {
                Some(i) if i < bucket.len() => i,
                _ => bucket.len(),
            };
            let before = pos.checked_sub(1).map(|i| keys[i]);
            let after = keys.get(pos).copied();

            task.quadrant = quadrant;

            if ordering::needs_rebalance(key, before, after) {
                bucket.insert(pos, task.clone());
                let fresh_keys: Vec<f64> = ordering::rebalanced(bucket.len()).collect();
                let mut moved = task;
                for (mut rec, fresh) in bucket.into_iter().zip(fresh_keys) {
                    rec.order = fresh;
                    rec.mark_updated(now);
                    if rec.id == moved.id {
                        moved = rec.clone();
                    }
                    tables.put(rec);
                }
                Ok(moved)
            } else {
                task.order = key;
                task.mark_updated(now);
                tables.put(task.clone());
                Ok(task)
            }
        })
    }

    // ------------------------------------------------------------------
    // Journal operations
    // ------------------------------------------------------------------

    pub fn create_journal(
        &self,
        owner: &str,
        content: &str,
        date: &str,
        now: Timestamp,
    ) -> Result<JournalEntry> {
        self.transaction(|tables| {
            let entry = JournalEntry::new(owner, content, date, now);
            entry.validate()?;
            tables.put(entry.clone());
            Ok(entry)
        })
    }

    pub fn update_journal(
        &self,
        id: &str,
        now: Timestamp,
        edit: impl FnOnce(&mut JournalEntry),
    ) -> Result<JournalEntry> {
        self.transaction(|tables| {
            let mut entry = live::<JournalEntry>(tables, id)?;
            edit(&mut entry);
            entry.validate()?;
            entry.mark_updated(now);
            tables.put(entry.clone());
            Ok(entry)
        })
    }

    pub fn delete_journal(&self, id: &str, now: Timestamp) -> Result<()> {
        self.transaction(|tables| {
            let mut entry = live::<JournalEntry>(tables, id)?;
            entry.mark_deleted(now);
            tables.put(entry);
            Ok(())
        })
    }
}

/// Fetch a record that is not a tombstone.
fn live<R: Syncable>(tables: &Tables, id: &str) -> Result<R>
where
    Tables: HasTable<R>,
{
    tables
        .get::<R>(id)
        .filter(|r| r.sync_state() != SyncState::Deleted)
        .cloned()
        .ok_or_else(|| Error::RecordNotFound(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const DAY: &str = "2024-03-01";

    fn store() -> LocalStore {
        LocalStore::new()
    }

    #[test]
    fn create_appends_to_bucket() {
        let store = store();
        let a = store.create_task("guest", "first", Quadrant::Q1, DAY, 1000).unwrap();
        let b = store.create_task("guest", "second", Quadrant::Q1, DAY, 2000).unwrap();

        assert_eq!(a.order, 1000.0);
        assert_eq!(b.order, 2000.0);

        let bucket = store.read(|t| t.quadrant_tasks("guest", DAY, Quadrant::Q1));
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket[0].id, a.id);
    }

    #[test]
    fn update_bumps_version_and_dirties() {
        let store = store();
        let task = store.create_task("guest", "draft", Quadrant::Q2, DAY, 1000).unwrap();

        let edited = store
            .update_task(&task.id, 2000, |t| t.title = "final".into())
            .unwrap();
        assert_eq!(edited.version, 2);
        // Never pushed, so still `created`.
        assert_eq!(edited.sync_state, SyncState::Created);

        // Simulate a pushed record, then edit again.
        store
            .transaction(|tables| {
                let mut t: Task = tables.get::<Task>(&task.id).cloned().unwrap();
                t.sync_state = SyncState::Synced;
                tables.put(t);
                Ok(())
            })
            .unwrap();
        let edited = store
            .update_task(&task.id, 3000, |t| t.completed = true)
            .unwrap();
        assert_eq!(edited.version, 3);
        assert_eq!(edited.sync_state, SyncState::Updated);
    }

    #[test]
    fn validation_failure_leaves_store_untouched() {
        let store = store();
        let err = store.create_task("guest", "   ", Quadrant::Q1, DAY, 1000);
        assert!(matches!(err, Err(Error::Validation { .. })));
        assert_eq!(store.read(|t| t.all::<Task>().count()), 0);

        let task = store.create_task("guest", "ok", Quadrant::Q1, DAY, 1000).unwrap();
        let err = store.update_task(&task.id, 2000, |t| t.progress = Some(250));
        assert!(matches!(err, Err(Error::Validation { .. })));
        let stored = store.read(|t| t.get::<Task>(&task.id).cloned().unwrap());
        assert_eq!(stored.version, 1);
        assert_eq!(stored.progress, None);
    }

    #[test]
    fn delete_leaves_tombstone_until_removed() {
        let store = store();
        let task = store.create_task("guest", "doomed", Quadrant::Q4, DAY, 1000).unwrap();
        store.delete_task(&task.id, 2000).unwrap();

        let stored = store.read(|t| t.get::<Task>(&task.id).cloned().unwrap());
        assert_eq!(stored.sync_state, SyncState::Deleted);
        assert_eq!(stored.version, 2);

        // Hidden from queries, still present for the push pipeline.
        assert!(store.read(|t| t.quadrant_tasks("guest", DAY, Quadrant::Q4)).is_empty());
        assert_eq!(store.read(|t| t.tombstone_ids::<Task>("guest")), vec![task.id.clone()]);

        // Deleting a tombstone again is an error.
        assert!(store.delete_task(&task.id, 3000).is_err());
    }

    #[test]
    fn move_between_neighbors() {
        let store = store();
        let a = store.create_task("guest", "a", Quadrant::Q1, DAY, 1000).unwrap();
        let _b = store.create_task("guest", "b", Quadrant::Q1, DAY, 1000).unwrap();
        let c = store.create_task("guest", "c", Quadrant::Q1, DAY, 1000).unwrap();

        // Move c between a and b.
        let moved = store.move_task(&c.id, Quadrant::Q1, Some(1), 2000).unwrap();
        assert_eq!(moved.order, 1500.0);

        let bucket = store.read(|t| t.quadrant_tasks("guest", DAY, Quadrant::Q1));
        let titles: Vec<_> = bucket.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "c", "b"]);

        // Cross-bucket move appends against the destination bucket only.
        let moved = store.move_task(&a.id, Quadrant::Q2, None, 3000).unwrap();
        assert_eq!(moved.quadrant, Quadrant::Q2);
        assert_eq!(moved.order, 1000.0);
    }

    #[test]
    fn degenerate_bucket_is_renumbered() {
        let store = store();
        let a = store.create_task("guest", "a", Quadrant::Q1, DAY, 1000).unwrap();
        let b = store.create_task("guest", "b", Quadrant::Q1, DAY, 1000).unwrap();

        // Drive a's key past the bound by hand; appending b after it then
        // lands outside the bound and renumbers the bucket.
        store
            .update_task(&a.id, 1500, |t| t.order = ordering::ORDER_BOUND + 5.0)
            .unwrap();
        store.move_task(&b.id, Quadrant::Q1, None, 2000).unwrap();

        let bucket = store.read(|t| t.quadrant_tasks("guest", DAY, Quadrant::Q1));
        let keys: Vec<f64> = bucket.iter().map(|t| t.order).collect();
        assert_eq!(keys, vec![1000.0, 2000.0]);
        let titles: Vec<_> = bucket.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b"]);
    }

    #[test]
    fn hooks_fire_after_commit() {
        let store = store();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        store.observe(move |event| {
            assert_eq!(event.kind, Task::KIND);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.create_task("guest", "observed", Quadrant::Q1, DAY, 1000).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        // A failed transaction fires nothing.
        let _ = store.create_task("guest", "", Quadrant::Q1, DAY, 1000);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transaction_rollback_discards_writes() {
        let store = store();
        let result: Result<()> = store.transaction(|tables| {
            tables.put(Task::new("guest", "phantom", Quadrant::Q1, DAY, 1000.0, 1000));
            Err(Error::StorageTransaction("forced".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.read(|t| t.all::<Task>().count()), 0);
    }

    #[test]
    fn journal_lifecycle() {
        let store = store();
        let entry = store.create_journal("guest", "morning pages", DAY, 1000).unwrap();
        assert_eq!(entry.version, 1);

        let edited = store
            .update_journal(&entry.id, 2000, |j| j.tags.push("focus".into()))
            .unwrap();
        assert_eq!(edited.version, 2);

        store.delete_journal(&entry.id, 3000).unwrap();
        assert!(store.read(|t| t.journal_for_day("guest", DAY)).is_empty());
        assert_eq!(
            store.read(|t| t.tombstone_ids::<JournalEntry>("guest")),
            vec![entry.id]
        );
    }

    #[test]
    fn meta_roundtrip() {
        let store = store();
        assert_eq!(store.meta_get("syncMode"), None);
        store.meta_set("syncMode", "cloud");
        assert_eq!(store.meta_get("syncMode").as_deref(), Some("cloud"));
    }
}
