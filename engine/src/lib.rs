//! # Quadrant Engine
//!
//! The offline-first sync engine behind the Quadrant planner.
//!
//! Local writes always succeed against the local store, whatever the
//! connectivity. The engine keeps that store eventually consistent with
//! a remote store of record across intermittent connectivity, concurrent
//! devices, and identity changes, without ever blocking a local edit.
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! Two record kinds, [`Task`] and [`JournalEntry`], share the same sync
//! bookkeeping through the [`Syncable`] trait: an immutable id, the
//! owning identity, a strictly increasing version, the timestamp of the
//! last local mutation, and a [`SyncState`]. Deleted records become
//! tombstones, retained until the remote confirms the deletion.
//!
//! ### Pipelines
//!
//! Local mutations flow through the store's observer contract into a
//! debounced upload; remote changes flow back through a poll-triggered
//! pull that reconciles the fetched live set under a record-granularity
//! last-writer-wins policy ([`resolve`]). A single mutual-exclusion flag
//! keeps push and pull from overlapping; a trigger arriving while busy is
//! coalesced into one deferred run.
//!
//! ### Modes and identities
//!
//! Everything is gated by a persisted offline/cloud mode and the current
//! identity. Records created before authentication belong to the guest
//! sentinel and are adopted (re-marked dirty) on login; sign-out takes an
//! explicit clear-or-retain policy.
//!
//! ## Quick Start
//!
//! ```rust
//! use quadrant_engine::{LocalStore, Quadrant, SyncState, GUEST_OWNER};
//!
//! let store = LocalStore::new();
//!
//! // Local CRUD never blocks on connectivity.
//! let task = store
//!     .create_task(GUEST_OWNER, "Plan the week", Quadrant::Q2, "2024-03-01", 1_700_000_000_000)
//!     .unwrap();
//! assert_eq!(task.version, 1);
//! assert_eq!(task.sync_state, SyncState::Created);
//!
//! let edited = store
//!     .update_task(&task.id, 1_700_000_001_000, |t| t.completed = true)
//!     .unwrap();
//! assert_eq!(edited.version, 2);
//! ```
//!
//! To sync, wrap the store in a [`SyncEngine`] with a [`RemoteTransport`]
//! (e.g. [`HttpRemote`] against the quadrant-server `/sync` routes) and an
//! [`AuthProvider`], then switch it to [`SyncMode::Cloud`].

pub mod auth;
pub mod engine;
pub mod error;
pub mod ordering;
pub mod record;
pub mod resolve;
pub mod store;
pub mod transport;

// Re-export main types at crate root
pub use auth::{AuthProvider, SessionAuth};
pub use engine::{
    now_ms, EngineConfig, SignOutPolicy, SyncEngine, SyncMode, SyncStatus,
};
pub use error::{Error, Result};
pub use record::{
    JournalEntry, Quadrant, SubTask, SyncState, Syncable, Task, TaskPriority, TaskStatus,
    GUEST_OWNER,
};
pub use resolve::{resolve, Resolution};
pub use store::{HasTable, LocalStore, MutationEvent, MutationKind, Table, Tables};
pub use transport::{HttpRemote, PushBatch, RemoteCheck, RemoteSet, RemoteTransport};

/// Type aliases for clarity
pub type RecordId = String;
pub type OwnerId = String;
pub type Version = u64;
pub type Timestamp = u64;
