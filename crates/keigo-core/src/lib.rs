//! Core session and rollback logic for keigo.
//!
//! Everything in this crate is pure state manipulation — no sockets, no
//! timers, no DOM. The engine crate drives it from the event loop:
//!
//! ```text
//! keystroke ──▶ SurfaceSession::observe_keystroke ──▶ Trigger{focus, context}
//!                    │ (dedup, stale-text, boundary detection)
//!                    ▼
//!              pending flag (single-flight)  ◀── engine dispatch/result
//!                    │
//! suggestion ──▶ apply_suggestion ──▶ RollbackLog::record (bounded, 10)
//!                    │
//! undo ────────▶ rollback ──▶ first-occurrence textual reversal
//! ```
//!
//! Surfaces are independent: each [`SurfaceSession`] owns its own last
//! fragment, pending flag, suggestion buffer, and rollback log, and the
//! [`SessionRegistry`] ties session lifetime to explicit attach/detach.

pub mod history;
pub mod registry;
pub mod sentence;
pub mod session;

pub use history::{HistoryError, RollbackEntry, RollbackLog, HISTORY_CAP};
pub use registry::SessionRegistry;
pub use sentence::{FocusSplit, ends_terminal, focus_split, is_terminal, split_sentences};
pub use session::{AppliedSuggestion, KeystrokeOutcome, RollbackOutcome, SurfaceSession, DEBOUNCE};
