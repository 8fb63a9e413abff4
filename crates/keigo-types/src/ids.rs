//! Typed identifiers for surfaces and rollback entries.
//!
//! Both ID types wrap UUIDv7 (time-ordered, globally unique). A `SurfaceId`
//! names one compose editor instance for its whole lifetime; an `EntryId`
//! names one rollback entry within a surface's log. The `short()` form
//! (first 8 hex chars) is for human-facing output — never used as a lookup
//! key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier for one compose-editor surface (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(uuid::Uuid);

/// Identifier for one rollback entry (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Create a new time-ordered ID (UUIDv7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// First 8 hex characters — for human display only, not lookup.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Full UUID with hyphens for log readability
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(SurfaceId, "SurfaceId");
impl_typed_id!(EntryId, "EntryId");

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_unique() {
        let a = SurfaceId::new();
        let b = SurfaceId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_is_8_chars() {
        assert_eq!(EntryId::new().short().len(), 8);
    }

    #[test]
    fn test_ordering_is_time_ordered() {
        let ids: Vec<EntryId> = (0..10).map(|_| EntryId::new()).collect();
        for i in 1..ids.len() {
            assert!(ids[i] >= ids[i - 1]);
        }
    }

    #[test]
    fn test_parse_roundtrip() {
        let id = SurfaceId::new();
        let parsed = SurfaceId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_serde_roundtrip() {
        let id = EntryId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: EntryId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = SurfaceId::new();
        let json = serde_json::to_string(&id).unwrap();
        // Plain UUID string, not a wrapper object.
        assert!(json.starts_with('"'));
        assert_eq!(json.len(), 38); // 36 chars + quotes
    }

    #[test]
    fn test_debug_shows_type_and_short() {
        let id = SurfaceId::new();
        let debug = format!("{:?}", id);
        assert!(debug.starts_with("SurfaceId("));
        assert!(debug.ends_with(')'));
    }
}
