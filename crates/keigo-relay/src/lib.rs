//! Socket client for the tone analysis service.
//!
//! Owns the one persistent connection the whole process shares: a
//! newline-delimited JSON duplex channel to a local analysis service.
//! A single actor task holds the socket, serving dispatch commands from
//! an mpsc channel and broadcasting inbound replies and connection
//! transitions to subscribers:
//!
//! ```text
//!   RelayHandle (Clone, Send+Sync)    mpsc     RelayActor (one task)
//!   ┌──────────────────────────┐  ─────────▶  ┌───────────────────────┐
//!   │ .dispatch(request)       │              │ Framed<Tcp, Lines>    │
//!   │ .is_connected()          │  ◀─────────  │ heartbeat every 20 s  │
//!   │ .subscribe() → events    │   oneshot/   │ reconnect every 5 s   │
//!   └──────────────────────────┘   broadcast  └───────────────────────┘
//! ```
//!
//! Dispatch while disconnected fails immediately — requests are never
//! queued. The connection retries on its own schedule.

pub mod actor;
pub mod conn;
pub mod constants;

pub use actor::{spawn_relay, RelayError, RelayEvent, RelayHandle};
pub use conn::{ConnError, ServiceConn};
