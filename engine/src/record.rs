//! Record types shared by the local store and the sync pipelines.
//!
//! Every syncable record carries the same bookkeeping fields: an
//! immutable id (the join key between local and remote copies), the
//! owning identity, a strictly increasing version, the timestamp of the
//! last local mutation, and a [`SyncState`]. The payload fields differ
//! per kind ([`Task`], [`JournalEntry`]); the pipelines only ever touch
//! the bookkeeping through the [`Syncable`] trait.

use crate::{OwnerId, RecordId, Timestamp, Version};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// The reserved identity owning records created before authentication.
pub const GUEST_OWNER: &str = "guest";

/// Where a record stands relative to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Believed identical to the remote's last known copy. The engine is
    /// free to discard it in favor of remote state during reconciliation.
    Synced,
    /// Created locally, never pushed.
    Created,
    /// Edited locally since the last push.
    Updated,
    /// Tombstone: deleted locally, retained until the remote confirms.
    Deleted,
}

impl SyncState {
    /// Dirty records represent local changes the remote does not yet
    /// have; they must never be silently overwritten by a stale remote
    /// copy.
    pub fn is_dirty(self) -> bool {
        matches!(self, SyncState::Created | SyncState::Updated)
    }
}

/// One of the four Eisenhower quadrants a task lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Quadrant {
    /// Urgent and important.
    Q1,
    /// Important, not urgent.
    Q2,
    /// Urgent, not important.
    Q3,
    /// Neither urgent nor important.
    Q4,
}

impl Quadrant {
    pub fn as_u8(self) -> u8 {
        match self {
            Quadrant::Q1 => 1,
            Quadrant::Q2 => 2,
            Quadrant::Q3 => 3,
            Quadrant::Q4 => 4,
        }
    }
}

impl From<Quadrant> for u8 {
    fn from(q: Quadrant) -> u8 {
        q.as_u8()
    }
}

impl TryFrom<u8> for Quadrant {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Quadrant::Q1),
            2 => Ok(Quadrant::Q2),
            3 => Ok(Quadrant::Q3),
            4 => Ok(Quadrant::Q4),
            other => Err(format!("quadrant must be 1-4, got {other}")),
        }
    }
}

/// Workflow state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Blocked,
    Cancelled,
}

/// Priority label of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

/// A checklist item inside a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTask {
    pub id: RecordId,
    pub title: String,
    pub completed: bool,
}

/// A task on the quadrant board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: RecordId,
    pub owner_id: OwnerId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub quadrant: Quadrant,
    /// Day bucket the task belongs to, `YYYY-MM-DD`.
    pub date: String,
    pub completed: bool,
    /// Fractional ranking key within the (owner, date, quadrant) bucket.
    pub order: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<SubTask>,
    /// Completion percentage, 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub version: Version,
    pub sync_state: SyncState,
}

impl Task {
    /// Create a new local task. Starts dirty at version 1.
    pub fn new(
        owner_id: impl Into<OwnerId>,
        title: impl Into<String>,
        quadrant: Quadrant,
        date: impl Into<String>,
        order: f64,
        now: Timestamp,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            title: title.into(),
            description: None,
            quadrant,
            date: date.into(),
            completed: false,
            order,
            status: None,
            priority: None,
            due_date: None,
            tags: Vec::new(),
            subtasks: Vec::new(),
            progress: None,
            created_at: now,
            updated_at: now,
            version: 1,
            sync_state: SyncState::Created,
        }
    }

    /// Reject malformed payloads before any local mutation.
    pub fn validate(&self) -> crate::Result<()> {
        if self.title.trim().is_empty() {
            return Err(crate::Error::validation(
                Task::KIND,
                "title must not be empty",
            ));
        }
        if let Some(progress) = self.progress {
            if progress > 100 {
                return Err(crate::Error::validation(
                    Task::KIND,
                    format!("progress must be 0-100, got {progress}"),
                ));
            }
        }
        Ok(())
    }
}

/// A free-form journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: RecordId,
    pub owner_id: OwnerId,
    pub content: String,
    /// Day bucket the entry belongs to, `YYYY-MM-DD`.
    pub date: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub version: Version,
    pub sync_state: SyncState,
}

impl JournalEntry {
    /// Create a new local journal entry. Starts dirty at version 1.
    pub fn new(
        owner_id: impl Into<OwnerId>,
        content: impl Into<String>,
        date: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            content: content.into(),
            date: date.into(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 1,
            sync_state: SyncState::Created,
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.content.trim().is_empty() {
            return Err(crate::Error::validation(
                JournalEntry::KIND,
                "content must not be empty",
            ));
        }
        Ok(())
    }
}

/// The bookkeeping surface the sync pipelines operate on.
///
/// Both record kinds implement this; the push/pull pipelines and the
/// conflict resolver are generic over it and never look at payloads.
pub trait Syncable: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Record-kind name used on the wire and in mutation events.
    const KIND: &'static str;

    fn id(&self) -> &RecordId;
    fn owner_id(&self) -> &OwnerId;
    fn set_owner_id(&mut self, owner: OwnerId);
    fn version(&self) -> Version;
    fn set_version(&mut self, version: Version);
    fn updated_at(&self) -> Timestamp;
    fn set_updated_at(&mut self, at: Timestamp);
    fn sync_state(&self) -> SyncState;
    fn set_sync_state(&mut self, state: SyncState);

    /// Record a local edit: bump the version, stamp the time, and move a
    /// clean record to `updated`. A record still in `created` has never
    /// been pushed, so it stays `created`.
    fn mark_updated(&mut self, now: Timestamp) {
        self.set_version(self.version() + 1);
        self.set_updated_at(now);
        if self.sync_state() != SyncState::Created {
            self.set_sync_state(SyncState::Updated);
        }
    }

    /// Turn the record into a tombstone awaiting remote confirmation.
    fn mark_deleted(&mut self, now: Timestamp) {
        self.set_version(self.version() + 1);
        self.set_updated_at(now);
        self.set_sync_state(SyncState::Deleted);
    }
}

impl Syncable for Task {
    const KIND: &'static str = "tasks";

    fn id(&self) -> &RecordId {
        &self.id
    }
    fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }
    fn set_owner_id(&mut self, owner: OwnerId) {
        self.owner_id = owner;
    }
    fn version(&self) -> Version {
        self.version
    }
    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
    fn updated_at(&self) -> Timestamp {
        self.updated_at
    }
    fn set_updated_at(&mut self, at: Timestamp) {
        self.updated_at = at;
    }
    fn sync_state(&self) -> SyncState {
        self.sync_state
    }
    fn set_sync_state(&mut self, state: SyncState) {
        self.sync_state = state;
    }
}

impl Syncable for JournalEntry {
    const KIND: &'static str = "journals";

    fn id(&self) -> &RecordId {
        &self.id
    }
    fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }
    fn set_owner_id(&mut self, owner: OwnerId) {
        self.owner_id = owner;
    }
    fn version(&self) -> Version {
        self.version
    }
    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
    fn updated_at(&self) -> Timestamp {
        self.updated_at
    }
    fn set_updated_at(&mut self, at: Timestamp) {
        self.updated_at = at;
    }
    fn sync_state(&self) -> SyncState {
        self.sync_state
    }
    fn set_sync_state(&mut self, state: SyncState) {
        self.sync_state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_starts_dirty() {
        let task = Task::new("guest", "Write report", Quadrant::Q1, "2024-03-01", 1000.0, 1000);
        assert_eq!(task.version, 1);
        assert_eq!(task.sync_state, SyncState::Created);
        assert!(task.sync_state.is_dirty());
        assert!(!task.completed);
    }

    #[test]
    fn edits_bump_version_and_keep_created() {
        let mut task = Task::new("guest", "Write report", Quadrant::Q1, "2024-03-01", 1000.0, 1000);

        task.mark_updated(2000);
        assert_eq!(task.version, 2);
        assert_eq!(task.updated_at, 2000);
        // Never pushed, so still `created`.
        assert_eq!(task.sync_state, SyncState::Created);

        task.sync_state = SyncState::Synced;
        task.mark_updated(3000);
        assert_eq!(task.version, 3);
        assert_eq!(task.sync_state, SyncState::Updated);
    }

    #[test]
    fn delete_makes_tombstone() {
        let mut entry = JournalEntry::new("guest", "dear diary", "2024-03-01", 1000);
        entry.mark_deleted(2000);
        assert_eq!(entry.sync_state, SyncState::Deleted);
        assert_eq!(entry.version, 2);
        assert!(!entry.sync_state.is_dirty());
    }

    #[test]
    fn quadrant_bounds() {
        assert_eq!(Quadrant::try_from(1).unwrap(), Quadrant::Q1);
        assert_eq!(Quadrant::try_from(4).unwrap(), Quadrant::Q4);
        assert!(Quadrant::try_from(0).is_err());
        assert!(Quadrant::try_from(5).is_err());
    }

    #[test]
    fn task_validation() {
        let mut task = Task::new("guest", "  ", Quadrant::Q2, "2024-03-01", 1000.0, 1000);
        assert!(task.validate().is_err());

        task.title = "Plan sprint".into();
        assert!(task.validate().is_ok());

        task.progress = Some(101);
        assert!(task.validate().is_err());
    }

    #[test]
    fn serialization_roundtrip() {
        let mut task = Task::new("user-1", "Review PR", Quadrant::Q3, "2024-03-01", 2000.0, 1000);
        task.status = Some(TaskStatus::InProgress);
        task.priority = Some(TaskPriority::High);
        task.tags = vec!["work".into()];
        task.subtasks = vec![SubTask {
            id: "sub-1".into(),
            title: "read diff".into(),
            completed: true,
        }];
        task.progress = Some(50);

        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains("\"quadrant\":3"));
        assert!(json.contains("\"syncState\":\"created\""));
        assert!(json.contains("\"status\":\"in_progress\""));

        let parsed: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(task, parsed);
    }
}
