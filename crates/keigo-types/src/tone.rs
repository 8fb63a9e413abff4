//! Tone classification and analysis data model.
//!
//! The analysis service replies with a flat suggestion array whose first
//! element is a human-readable tone label; the rest are rewrite suggestions
//! in presentation order. [`AnalysisResult::from_labeled_suggestions`] is
//! the single place that array shape is interpreted.

use serde::{Deserialize, Serialize};

use crate::now_millis;

/// Two-valued tone classification of a focus fragment.
///
/// `Flagged` means the service considers the fragment worth rewriting;
/// suggestions are surfaced only for flagged fragments.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ToneLevel {
    Neutral,
    Flagged,
}

impl ToneLevel {
    /// Map a service-provided tone label onto a level.
    ///
    /// The service labels rude fragments either in its own locale ("무례")
    /// or in English ("Rude"); anything else reads as neutral.
    pub fn from_label(label: &str) -> Self {
        if label == "무례" || label.eq_ignore_ascii_case("rude") {
            ToneLevel::Flagged
        } else {
            ToneLevel::Neutral
        }
    }
}

/// One analysis request, built when a completed sentence is dispatched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// The candidate sentence under analysis.
    pub focus: String,
    /// All preceding sentences in the body, space-joined.
    pub context: String,
    /// The full body text at dispatch time.
    pub full_body: String,
    /// When the request was issued (Unix millis).
    pub issued_at: u64,
}

impl AnalysisRequest {
    /// Build a request stamped with the current time.
    pub fn new(
        focus: impl Into<String>,
        context: impl Into<String>,
        full_body: impl Into<String>,
    ) -> Self {
        Self {
            focus: focus.into(),
            context: context.into(),
            full_body: full_body.into(),
            issued_at: now_millis(),
        }
    }
}

/// A parsed analysis reply: tone level, the service's own label, and the
/// suggestion texts in presentation order (index 0 gets initial focus).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub tone: ToneLevel,
    pub tone_label: String,
    pub suggestions: Vec<String>,
}

impl AnalysisResult {
    /// Interpret the service's label-first suggestion array.
    ///
    /// An empty array is malformed — distinct from a neutral reply that
    /// simply carries no suggestions after the label.
    pub fn from_labeled_suggestions(raw: Vec<String>) -> Result<Self, ToneError> {
        let mut iter = raw.into_iter();
        let tone_label = iter.next().ok_or(ToneError::EmptyReply)?;
        Ok(Self {
            tone: ToneLevel::from_label(&tone_label),
            tone_label,
            suggestions: iter.collect(),
        })
    }
}

/// Errors interpreting a service reply.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ToneError {
    /// The service sent an empty suggestion array (no tone label).
    #[error("analysis reply carried no tone label")]
    EmptyReply,
}

// ============================================================================
// Tests
// ============================================================================
