//! Relay constants.

use std::time::Duration;

/// Where the local analysis service listens by default.
pub const DEFAULT_SERVICE_ADDR: &str = "127.0.0.1:37100";

/// Heartbeat cadence while connected. The service never answers pings;
/// they exist to detect a dead socket promptly.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Fixed backoff between reconnect attempts after a loss.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Upper bound on one wire line. Replies carry a handful of sentence
/// rewrites; anything near this is garbage.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;
