//! Per-surface session state.
//!
//! A [`SurfaceSession`] is the explicit state object behind one compose
//! surface: the last analyzed fragment (dedup), the pending-analysis flag
//! (single-flight), the current suggestion buffer, and the rollback log.
//!
//! The session is pure state: it decides *what* should happen in response
//! to a keystroke or a service reply; the engine owns *when* (debounce
//! timers, dispatch, timeouts).

use std::time::Duration;

use keigo_types::{AnalysisResult, EntryId, SurfaceId};

use crate::history::{apply_rollback, HistoryError, RollbackEntry, RollbackLog};
use crate::sentence::{ends_terminal, focus_split, is_terminal, split_sentences};

/// Trailing-debounce window between a qualifying keystroke and dispatch.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// What a keystroke on a surface amounts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeystrokeOutcome {
    /// Not a sentence-terminal key.
    Ignored,
    /// The key says "sentence finished" but the text doesn't end in
    /// terminal punctuation — the event and the content disagree (race),
    /// so the trigger is skipped.
    StaleText,
    /// No sentence to analyze (empty or whitespace-only body).
    NoSentence,
    /// Focus identical to the last analyzed fragment; suppressed.
    Duplicate,
    /// A new completed sentence. The caller should debounce, then dispatch.
    Trigger { focus: String, context: String },
}

/// Result of applying a suggestion to a surface's body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedSuggestion {
    /// The rollback entry recorded for this application.
    pub entry_id: EntryId,
    /// The body text after the focus sentence was replaced.
    pub new_body: String,
}

/// Result of a rollback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RollbackOutcome {
    /// The consumed entry (removed from the log either way).
    pub entry: RollbackEntry,
    /// The body text after reversal (unchanged when `matched` is false).
    pub new_body: String,
    /// Whether `entry.modified` was still present verbatim. A `false`
    /// here means intervening edits orphaned the entry — benign.
    pub matched: bool,
}

/// State for one compose surface.
#[derive(Debug)]
pub struct SurfaceSession {
    id: SurfaceId,
    /// Last fragment sent for analysis, or last applied replacement.
    last_fragment: Option<String>,
    /// Single-flight guard: at most one analysis in flight per surface.
    pending: bool,
    /// Most recent analysis result (last result wins).
    result: Option<AnalysisResult>,
    history: RollbackLog,
}

impl SurfaceSession {
    pub fn new(id: SurfaceId) -> Self {
        Self {
            id,
            last_fragment: None,
            pending: false,
            result: None,
            history: RollbackLog::new(),
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn last_fragment(&self) -> Option<&str> {
        self.last_fragment.as_deref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// The current suggestion buffer (empty until a result arrives).
    pub fn last_result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    // ========================================================================
    // Keystroke tracking
    // ========================================================================

    /// Evaluate a keystroke against the surface's current full text.
    ///
    /// On `Trigger`, `last_fragment` has already been updated — a repeat of
    /// the same focus before any further edit reads as `Duplicate`.
    pub fn observe_keystroke(&mut self, key: char, full_text: &str) -> KeystrokeOutcome {
        if !is_terminal(key) {
            return KeystrokeOutcome::Ignored;
        }

        let trimmed = full_text.trim();
        if trimmed.is_empty() {
            return KeystrokeOutcome::NoSentence;
        }
        if !ends_terminal(trimmed) {
            return KeystrokeOutcome::StaleText;
        }

        let Some(split) = focus_split(trimmed) else {
            return KeystrokeOutcome::NoSentence;
        };
        if self.last_fragment.as_deref() == Some(split.focus.as_str()) {
            return KeystrokeOutcome::Duplicate;
        }

        self.last_fragment = Some(split.focus.clone());
        KeystrokeOutcome::Trigger {
            focus: split.focus,
            context: split.context,
        }
    }

    // ========================================================================
    // Single-flight analysis window
    // ========================================================================

    /// Claim the analysis slot. Returns `false` (busy) if one is in flight.
    ///
    /// Must be called synchronously before any suspension point of the
    /// dispatch path; it is the only overlap guard.
    pub fn try_begin_analysis(&mut self) -> bool {
        if self.pending {
            return false;
        }
        self.pending = true;
        true
    }

    /// Release the analysis slot without a result (error or timeout path).
    pub fn fail_analysis(&mut self) {
        self.pending = false;
    }

    /// Install a result, releasing the slot.
    ///
    /// Accepted even with no analysis pending (late or duplicate reply
    /// after a reconnect): last result wins, the buffer is overwritten.
    pub fn install_result(&mut self, result: AnalysisResult) {
        self.pending = false;
        self.result = Some(result);
    }

    // ========================================================================
    // Suggestion application and rollback
    // ========================================================================

    /// Replace the body's focus sentence with `suggestion`, recording a
    /// rollback entry before the mutation.
    ///
    /// Returns `None` when the body holds no sentence to replace.
    pub fn apply_suggestion(&mut self, body: &str, suggestion: &str) -> Option<AppliedSuggestion> {
        let mut parts = split_sentences(body);
        parts.pop()?;

        // Record before mutating; the entry's `original` is the fragment
        // the suggestion replaces.
        let original = self.last_fragment.clone().unwrap_or_default();
        let entry_id = self.history.record(original, suggestion);

        parts.push(suggestion);
        let new_body = format!("{} ", parts.join(" "));
        self.last_fragment = Some(suggestion.to_string());

        Some(AppliedSuggestion { entry_id, new_body })
    }

    /// Reverse a recorded edit within `body`.
    ///
    /// The entry is consumed even when its `modified` text no longer
    /// matches — an orphaned entry would otherwise shadow newer ones.
    /// `last_fragment` follows the reversal so future dedup decisions see
    /// the restored text.
    pub fn rollback(&mut self, body: &str, entry_id: EntryId) -> Result<RollbackOutcome, HistoryError> {
        let entry = self.history.take(entry_id)?;
        let (new_body, matched) = apply_rollback(body, &entry);
        if !matched {
            tracing::debug!(surface = %self.id, entry = %entry.id, "rollback target text not found; entry consumed");
        }
        self.last_fragment = Some(entry.original.clone());
        Ok(RollbackOutcome { entry, new_body, matched })
    }

    /// Reverse only the most recent entry.
    pub fn quick_undo(&mut self, body: &str) -> Result<RollbackOutcome, HistoryError> {
        let id = self.history.peek_latest().ok_or(HistoryError::Empty)?.id;
        self.rollback(body, id)
    }

    /// The rollback log (read access, e.g. for listings).
    pub fn history(&self) -> &RollbackLog {
        &self.history
    }

    pub fn has_history(&self) -> bool {
        !self.history.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use keigo_types::ToneLevel;

    fn session() -> SurfaceSession {
        SurfaceSession::new(SurfaceId::new())
    }

    fn result(suggestions: &[&str]) -> AnalysisResult {
        AnalysisResult {
            tone: ToneLevel::Flagged,
            tone_label: "무례".into(),
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
        }
    }

    // ── Keystroke tracking ──────────────────────────────────────────────

    #[test]
    fn test_non_terminal_key_ignored() {
        assert_eq!(session().observe_keystroke('a', "Hello."), KeystrokeOutcome::Ignored);
        assert_eq!(session().observe_keystroke(',', "Hello,"), KeystrokeOutcome::Ignored);
    }

    #[test]
    fn test_stale_text_aborts() {
        // Key event says '.' but the text doesn't end in punctuation.
        assert_eq!(
            session().observe_keystroke('.', "Hello there"),
            KeystrokeOutcome::StaleText
        );
    }

    #[test]
    fn test_empty_body_is_no_sentence() {
        assert_eq!(session().observe_keystroke('.', "   "), KeystrokeOutcome::NoSentence);
    }

    #[test]
    fn test_trigger_carries_focus_and_context() {
        let mut s = session();
        let outcome = s.observe_keystroke('?', "Hello there. How are you?");
        assert_eq!(
            outcome,
            KeystrokeOutcome::Trigger {
                focus: "How are you?".into(),
                context: "Hello there.".into(),
            }
        );
        assert_eq!(s.last_fragment(), Some("How are you?"));
    }

    #[test]
    fn test_identical_focus_deduplicated() {
        let mut s = session();
        let first = s.observe_keystroke('.', "Send it now.");
        assert!(matches!(first, KeystrokeOutcome::Trigger { .. }));
        // Cursor moved, same punctuation retyped: same focus, suppressed.
        assert_eq!(s.observe_keystroke('.', "Send it now."), KeystrokeOutcome::Duplicate);
    }

    #[test]
    fn test_new_sentence_after_duplicate_triggers_again() {
        let mut s = session();
        s.observe_keystroke('.', "Send it now.");
        let outcome = s.observe_keystroke('!', "Send it now. Right away!");
        assert_eq!(
            outcome,
            KeystrokeOutcome::Trigger {
                focus: "Right away!".into(),
                context: "Send it now.".into(),
            }
        );
    }

    #[test]
    fn test_unicode_terminal_key_triggers() {
        let mut s = session();
        let outcome = s.observe_keystroke('。', "こんにちは。");
        assert!(matches!(outcome, KeystrokeOutcome::Trigger { .. }));
    }

    // ── Single-flight window ────────────────────────────────────────────

    #[test]
    fn test_single_flight_guard() {
        let mut s = session();
        assert!(s.try_begin_analysis());
        assert!(s.is_pending());
        // Second claim while in flight is refused.
        assert!(!s.try_begin_analysis());
        s.install_result(result(&["Could you please…"]));
        assert!(!s.is_pending());
        assert!(s.try_begin_analysis());
    }

    #[test]
    fn test_fail_analysis_releases_slot() {
        let mut s = session();
        assert!(s.try_begin_analysis());
        s.fail_analysis();
        assert!(!s.is_pending());
        assert!(s.try_begin_analysis());
    }

    #[test]
    fn test_late_result_accepted_idempotently() {
        let mut s = session();
        s.install_result(result(&["first"]));
        // No pending request — still accepted, last result wins.
        s.install_result(result(&["second"]));
        assert_eq!(s.last_result().unwrap().suggestions, vec!["second"]);
        assert!(!s.is_pending());
    }

    // ── Suggestion application and rollback ─────────────────────────────

    #[test]
    fn test_apply_suggestion_replaces_focus_and_records() {
        let mut s = session();
        s.observe_keystroke('.', "Hello there. Fix this now.");
        let applied = s.apply_suggestion(
            "Hello there. Fix this now.",
            "Could you fix this when you have a moment?",
        )
        .unwrap();
        assert_eq!(
            applied.new_body,
            "Hello there. Could you fix this when you have a moment? "
        );
        assert_eq!(s.history().len(), 1);
        let entry = s.history().peek_latest().unwrap();
        assert_eq!(entry.original, "Fix this now.");
        assert_eq!(entry.modified, "Could you fix this when you have a moment?");
        // last_fragment follows the applied text, so re-analysis dedups.
        assert_eq!(s.last_fragment(), Some("Could you fix this when you have a moment?"));
    }

    #[test]
    fn test_apply_suggestion_on_empty_body() {
        let mut s = session();
        assert!(s.apply_suggestion("", "anything").is_none());
        assert!(!s.has_history());
    }

    #[test]
    fn test_rollback_reverses_and_consumes() {
        let mut s = session();
        s.observe_keystroke('.', "Fix this now.");
        let applied = s.apply_suggestion("Fix this now.", "Could you fix this?").unwrap();
        let body = applied.new_body.clone();

        let outcome = s.rollback(&body, applied.entry_id).unwrap();
        assert!(outcome.matched);
        assert_eq!(outcome.new_body, "Fix this now. ");
        assert!(!s.has_history());
        assert_eq!(s.last_fragment(), Some("Fix this now."));

        // Double-invoke on the consumed entry: typed not-found, no mutation.
        assert_eq!(
            s.rollback(&outcome.new_body, applied.entry_id),
            Err(HistoryError::NotFound(applied.entry_id))
        );
    }

    #[test]
    fn test_rollback_match_failure_consumes_entry() {
        let mut s = session();
        s.observe_keystroke('.', "Fix this now.");
        let applied = s.apply_suggestion("Fix this now.", "Could you fix this?").unwrap();

        // Intervening edits removed the applied text entirely.
        let outcome = s.rollback("Something else entirely.", applied.entry_id).unwrap();
        assert!(!outcome.matched);
        assert_eq!(outcome.new_body, "Something else entirely.");
        assert!(!s.has_history());
    }

    #[test]
    fn test_quick_undo_targets_latest() {
        let mut s = session();
        s.observe_keystroke('.', "Hi.");
        let a = s.apply_suggestion("Hi.", "Hello.").unwrap();
        let b = s.apply_suggestion(&a.new_body, "Hey.").unwrap();

        let outcome = s.quick_undo(&b.new_body).unwrap();
        assert_eq!(outcome.entry.modified, "Hey.");
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn test_quick_undo_on_empty_history() {
        let mut s = session();
        assert_eq!(s.quick_undo("whatever"), Err(HistoryError::Empty));
    }
}
