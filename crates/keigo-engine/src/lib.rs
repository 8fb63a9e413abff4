//! The analysis engine: timing and routing around the core session state.
//!
//! `keigo-core` decides *what* a keystroke means; this crate decides
//! *when* things happen around it:
//!
//! - trailing 500 ms debounce between a completed sentence and dispatch,
//!   restarted by every further qualifying keystroke;
//! - single-flight dispatch through an [`AnalysisDispatcher`] (the relay
//!   in production, a mock in tests);
//! - reply routing back to the owning surface, with a 30 s timeout that
//!   releases a surface whose request the service never answered;
//! - an [`EngineEvent`] broadcast the daemon fans out to UI connections.

pub mod dispatcher;
pub mod engine;

pub use dispatcher::AnalysisDispatcher;
pub use engine::{Engine, EngineError, EngineEvent, REQUEST_TIMEOUT};
