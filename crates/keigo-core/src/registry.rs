//! Explicit session registry.
//!
//! The original system hung per-surface state off weak-keyed side tables
//! and let garbage collection clean up after closed compose windows. Here
//! session lifetime is explicit: `attach` when a surface appears, `detach`
//! when it closes. No state survives a detach.

use std::collections::HashMap;

use parking_lot::RwLock;

use keigo_types::SurfaceId;

use crate::session::SurfaceSession;

/// Owns every live [`SurfaceSession`], keyed by surface id.
///
/// All mutations of a session happen under the registry lock via
/// [`with_session`](Self::with_session), which keeps the pending-flag
/// discipline synchronous (no suspension point between check and set).
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SurfaceId, SurfaceSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new surface and return its id.
    pub fn attach(&self) -> SurfaceId {
        let id = SurfaceId::new();
        self.attach_with_id(id);
        id
    }

    /// Register a surface under a caller-chosen id (idempotent).
    pub fn attach_with_id(&self, id: SurfaceId) {
        self.sessions
            .write()
            .entry(id)
            .or_insert_with(|| SurfaceSession::new(id));
    }

    /// Drop a surface's session and everything it owns.
    ///
    /// Returns `false` if the surface was not attached.
    pub fn detach(&self, id: SurfaceId) -> bool {
        self.sessions.write().remove(&id).is_some()
    }

    /// Run `f` against a surface's session under the registry lock.
    ///
    /// Returns `None` when the surface is not attached (already detached
    /// surfaces silently ignore late events).
    pub fn with_session<R>(&self, id: SurfaceId, f: impl FnOnce(&mut SurfaceSession) -> R) -> Option<R> {
        self.sessions.write().get_mut(&id).map(f)
    }

    pub fn contains(&self, id: SurfaceId) -> bool {
        self.sessions.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
