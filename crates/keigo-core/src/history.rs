//! Bounded per-surface rollback history.
//!
//! Every applied suggestion records one [`RollbackEntry`] *before* the text
//! mutation takes effect. The log keeps at most [`HISTORY_CAP`] entries;
//! overflow silently evicts the oldest. An evicted entry is permanently
//! unrecoverable — the accepted data-loss tradeoff of bounded history.

use serde::{Deserialize, Serialize};

use keigo_types::{now_millis, EntryId};

/// Maximum entries retained per surface. Oldest evicted first.
pub const HISTORY_CAP: usize = 10;

/// One reversible edit: the sentence that was replaced and its replacement.
///
/// Immutable after creation. Consumed by rollback or evicted by capacity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackEntry {
    /// Unique within the surface's log for the entry's lifetime.
    pub id: EntryId,
    /// The text as it was before the suggestion was applied.
    pub original: String,
    /// The suggestion text that replaced it.
    pub modified: String,
    /// When the suggestion was applied (Unix millis).
    pub created_at: u64,
}

impl RollbackEntry {
    fn new(original: impl Into<String>, modified: impl Into<String>) -> Self {
        Self {
            id: EntryId::new(),
            original: original.into(),
            modified: modified.into(),
            created_at: now_millis(),
        }
    }

    /// Human-readable age relative to `now` (Unix millis), for listings.
    pub fn age_label(&self, now: u64) -> String {
        let elapsed = now.saturating_sub(self.created_at);
        let minutes = elapsed / 60_000;
        let hours = elapsed / 3_600_000;
        let days = elapsed / 86_400_000;
        if minutes < 1 {
            "just now".to_string()
        } else if minutes < 60 {
            format!("{minutes}m ago")
        } else if hours < 24 {
            format!("{hours}h ago")
        } else {
            format!("{days}d ago")
        }
    }
}

/// Errors from rollback lookup.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HistoryError {
    /// The entry was already consumed, evicted, or never existed.
    /// Benign: double-invoking rollback on the same entry lands here.
    #[error("no rollback entry with id {0:?}")]
    NotFound(EntryId),
    /// Quick-undo on a surface with nothing recorded.
    #[error("rollback history is empty")]
    Empty,
}

/// One surface's ordered rollback log.
///
/// Storage order is insertion order; presentation order (via
/// [`iter_recent_first`](Self::iter_recent_first)) is reversed.
#[derive(Debug, Default)]
pub struct RollbackLog {
    entries: Vec<RollbackEntry>,
}

impl RollbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an applied suggestion. Evicts the oldest entry beyond
    /// [`HISTORY_CAP`] — routine capacity management, never an error.
    pub fn record(&mut self, original: impl Into<String>, modified: impl Into<String>) -> EntryId {
        let entry = RollbackEntry::new(original, modified);
        let id = entry.id;
        self.entries.push(entry);
        if self.entries.len() > HISTORY_CAP {
            let evicted = self.entries.remove(0);
            tracing::debug!(
                entry = %evicted.id,
                age = %evicted.age_label(now_millis()),
                "rollback entry evicted at capacity"
            );
        }
        id
    }

    /// The most recently recorded entry, if any.
    pub fn peek_latest(&self) -> Option<&RollbackEntry> {
        self.entries.last()
    }

    /// All entries, most recent first.
    pub fn iter_recent_first(&self) -> impl Iterator<Item = &RollbackEntry> {
        self.entries.iter().rev()
    }

    /// Remove and return the entry with the given id.
    pub fn take(&mut self, id: EntryId) -> Result<RollbackEntry, HistoryError> {
        let index = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(HistoryError::NotFound(id))?;
        Ok(self.entries.remove(index))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reverse an entry within `text`: replace the first occurrence of
/// `entry.modified` with `entry.original`.
///
/// Returns the (possibly unchanged) text and whether a match was found.
/// No match means intervening edits removed the replaced text — the
/// rollback is a no-op on content, not a failure.
pub fn apply_rollback(text: &str, entry: &RollbackEntry) -> (String, bool) {
    if text.contains(entry.modified.as_str()) {
        (text.replacen(entry.modified.as_str(), &entry.original, 1), true)
    } else {
        (text.to_string(), false)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_within_capacity() {
        let mut log = RollbackLog::new();
        for i in 0..10 {
            log.record(format!("orig {i}"), format!("mod {i}"));
        }
        assert_eq!(log.len(), 10);
    }

    #[test]
    fn test_eleventh_record_evicts_oldest() {
        let mut log = RollbackLog::new();
        let first = log.record("orig 0", "mod 0");
        for i in 1..=10 {
            log.record(format!("orig {i}"), format!("mod {i}"));
        }
        assert_eq!(log.len(), 10);
        assert!(log.iter_recent_first().all(|e| e.id != first));
        // The ten most recent survive, in order.
        let mods: Vec<&str> = log.iter_recent_first().map(|e| e.modified.as_str()).collect();
        assert_eq!(mods[0], "mod 10");
        assert_eq!(mods[9], "mod 1");
    }

    #[test]
    fn test_listing_is_most_recent_first() {
        let mut log = RollbackLog::new();
        log.record("Hi,", "Hello,");
        log.record("Hi,", "Hey,");
        let mods: Vec<&str> = log.iter_recent_first().map(|e| e.modified.as_str()).collect();
        assert_eq!(mods, vec!["Hey,", "Hello,"]);
        assert_eq!(log.peek_latest().unwrap().modified, "Hey,");
    }

    #[test]
    fn test_ids_are_unique_within_log() {
        let mut log = RollbackLog::new();
        let a = log.record("a", "b");
        let b = log.record("a", "b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_take_removes_entry() {
        let mut log = RollbackLog::new();
        let id = log.record("orig", "mod");
        let entry = log.take(id).unwrap();
        assert_eq!(entry.original, "orig");
        assert!(log.is_empty());
        // Second take with the same id reports NotFound, never panics.
        assert_eq!(log.take(id), Err(HistoryError::NotFound(id)));
    }

    #[test]
    fn test_take_middle_entry_preserves_others() {
        let mut log = RollbackLog::new();
        log.record("a", "1");
        let mid = log.record("b", "2");
        log.record("c", "3");
        log.take(mid).unwrap();
        let mods: Vec<&str> = log.iter_recent_first().map(|e| e.modified.as_str()).collect();
        assert_eq!(mods, vec!["3", "1"]);
    }

    #[test]
    fn test_apply_rollback_replaces_first_occurrence() {
        let mut log = RollbackLog::new();
        let id = log.record("Hi,", "Hello,");
        let entry = log.take(id).unwrap();
        let (text, matched) = apply_rollback("Hello, world. Hello, again.", &entry);
        assert!(matched);
        assert_eq!(text, "Hi, world. Hello, again.");
    }

    #[test]
    fn test_apply_rollback_no_match_leaves_text_unchanged() {
        let mut log = RollbackLog::new();
        let id = log.record("Hi,", "Hello,");
        let entry = log.take(id).unwrap();
        let (text, matched) = apply_rollback("Completely rewritten since.", &entry);
        assert!(!matched);
        assert_eq!(text, "Completely rewritten since.");
    }

    #[test]
    fn test_age_labels() {
        let mut entry = RollbackEntry::new("a", "b");
        entry.created_at = 1_000_000;
        assert_eq!(entry.age_label(1_000_000 + 30_000), "just now");
        assert_eq!(entry.age_label(1_000_000 + 5 * 60_000), "5m ago");
        assert_eq!(entry.age_label(1_000_000 + 3 * 3_600_000), "3h ago");
        assert_eq!(entry.age_label(1_000_000 + 2 * 86_400_000), "2d ago");
    }
}
