//! Sentence-boundary detection.
//!
//! A boundary exists after a terminal punctuation character followed by one
//! or more whitespace characters. The terminal set covers Latin `.!?`, the
//! Arabic question mark, inverted `¡`, and the full-width CJK variants.
//!
//! The last segment of a split is the *focus* (the candidate sentence for
//! analysis); everything before it, space-joined, is the *context*.

/// Sentence-terminal punctuation, including locale variants.
pub const TERMINAL_PUNCTUATION: [char; 8] = ['.', '!', '?', '؟', '¡', '。', '？', '！'];

/// Is this character sentence-terminal punctuation?
pub fn is_terminal(c: char) -> bool {
    TERMINAL_PUNCTUATION.contains(&c)
}

/// Does the text (ignoring trailing whitespace) end in terminal punctuation?
///
/// Used as the stale-text check: a punctuation key event whose surface text
/// does not actually end in punctuation means the event and the content
/// disagree, and the trigger is skipped.
pub fn ends_terminal(text: &str) -> bool {
    text.trim_end().chars().next_back().is_some_and(is_terminal)
}

/// Split text into sentences at terminal-punctuation-then-whitespace
/// boundaries. Segments are trimmed; empty segments are dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if is_terminal(c) {
            // Boundary only when at least one whitespace char follows.
            if chars.peek().is_some_and(|&(_, next)| next.is_whitespace()) {
                let end = i + c.len_utf8();
                let segment = text[start..end].trim();
                if !segment.is_empty() {
                    segments.push(segment);
                }
                start = end;
            }
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        segments.push(tail);
    }
    segments
}

/// The focus sentence and its preceding context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FocusSplit {
    /// The last (most recently completed) sentence.
    pub focus: String,
    /// All prior sentences, joined by a single space. Empty for the first
    /// sentence of a body.
    pub context: String,
}

/// Extract the focus sentence and context from a full body text.
///
/// Returns `None` when the text contains no sentences at all.
pub fn focus_split(text: &str) -> Option<FocusSplit> {
    let mut sentences = split_sentences(text);
    let focus = sentences.pop()?.to_string();
    Some(FocusSplit {
        focus,
        context: sentences.join(" "),
    })
}

// ============================================================================
// Tests
// ============================================================================
