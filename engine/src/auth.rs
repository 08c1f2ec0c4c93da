//! The authentication collaborator seam.
//!
//! The engine only ever asks two questions: who owns new records, and is
//! the session still good. An absent identity closes the sync gate
//! unconditionally; local CRUD keeps working against the guest identity.

use parking_lot::RwLock;

use crate::OwnerId;

/// Exposes the current identity to the engine.
pub trait AuthProvider: Send + Sync {
    /// The authenticated identity, or `None` when signed out.
    fn identity(&self) -> Option<OwnerId>;

    /// Whether the session is still usable for remote calls.
    fn session_active(&self) -> bool {
        self.identity().is_some()
    }
}

/// A simple provider backed by a shared slot. Suitable for embedders
/// that manage tokens elsewhere, and for tests.
#[derive(Default)]
pub struct SessionAuth {
    identity: RwLock<Option<OwnerId>>,
}

impl SessionAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(identity: impl Into<OwnerId>) -> Self {
        Self {
            identity: RwLock::new(Some(identity.into())),
        }
    }

    pub fn sign_in(&self, identity: impl Into<OwnerId>) {
        *self.identity.write() = Some(identity.into());
    }

    pub fn sign_out(&self) {
        *self.identity.write() = None;
    }
}

impl AuthProvider for SessionAuth {
    fn identity(&self) -> Option<OwnerId> {
        self.identity.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_tracks_identity() {
        let auth = SessionAuth::new();
        assert_eq!(auth.identity(), None);
        assert!(!auth.session_active());

        auth.sign_in("user-1");
        assert_eq!(auth.identity().as_deref(), Some("user-1"));
        assert!(auth.session_active());

        auth.sign_out();
        assert!(!auth.session_active());
    }
}
