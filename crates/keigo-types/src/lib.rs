//! Shared identifiers, tone model, and wire contracts for keigo.
//!
//! This crate is the foundation the other keigo crates build on: typed IDs
//! for surfaces and rollback entries, the tone/analysis data model, and the
//! two JSON contracts the system speaks. It has **no internal keigo
//! dependencies** — a pure leaf crate.
//!
//! # Entity overview
//!
//! ```text
//! Surface (SurfaceId) ← one compose editor instance
//!     └── owns a bounded rollback log of entries (EntryId)
//!     └── has at most one analysis in flight at a time
//!
//! Analysis service ← external black box over a persistent socket
//!     └── ServiceRequest  (analyze / ping)        outbound
//!     └── ServiceReply    (suggestions / error)   inbound
//!
//! UI front end ← the compose-surface client
//!     └── UiRequest / UiResponse / UiPush          line-JSON
//! ```

pub mod ids;
pub mod protocol;
pub mod tone;

// Re-export primary types at crate root for convenience.
pub use ids::{EntryId, SurfaceId};
pub use protocol::{ServiceReply, ServiceRequest, UiPush, UiRequest, UiResponse};
pub use tone::{AnalysisRequest, AnalysisResult, ToneError, ToneLevel};

/// Current time as Unix milliseconds. Used by constructors throughout keigo.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
