//! Wire contracts: the analysis-service channel and the UI-facing channel.
//!
//! Both channels speak newline-delimited JSON. The field names and tag
//! values here are the published contract — the tests at the bottom pin
//! the exact shapes, so a rename that would break a peer fails loudly.
//!
//! Neither channel carries request IDs: the UI channel relies on the
//! single-flight-per-surface discipline for correlation, and the service
//! channel is single-flight per connection in practice.

use serde::{Deserialize, Serialize};

use crate::tone::{AnalysisRequest, ToneLevel};

// ============================================================================
// Analysis service channel (keigo → service → keigo)
// ============================================================================

/// Outbound message to the analysis service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServiceRequest {
    /// Ask for a tone classification + rewrite suggestions.
    Analyze {
        /// Candidate sentence.
        focus: String,
        /// Preceding sentences, space-joined.
        context: String,
        /// Full body text.
        body: String,
        /// Unix millis at dispatch.
        timestamp: u64,
    },
    /// Heartbeat. The service is not required to answer.
    Ping,
}

impl From<AnalysisRequest> for ServiceRequest {
    fn from(req: AnalysisRequest) -> Self {
        ServiceRequest::Analyze {
            focus: req.focus,
            context: req.context,
            body: req.full_body,
            timestamp: req.issued_at,
        }
    }
}

/// Inbound message from the analysis service.
///
/// Success carries a flat array whose first element is the tone label;
/// see [`AnalysisResult::from_labeled_suggestions`](crate::AnalysisResult).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServiceReply {
    Suggestions { suggestions: Vec<String> },
    Error { error: String },
}

// ============================================================================
// UI-facing channel (compose-surface client ↔ keigo daemon)
// ============================================================================

/// Request from the UI front end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UiRequest {
    /// Submit a completed sentence (plus its context) for analysis.
    ///
    /// The surface is implied by the connection: one UI connection serves
    /// exactly one compose surface for its lifetime.
    #[serde(rename = "emailContent")]
    EmailContent {
        focus: String,
        context: String,
        body: String,
        timestamp: u64,
    },
}

/// Direct response to a [`UiRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UiResponse {
    /// The request went out to the analysis service.
    Sent,
    /// The request did not go out (busy, disconnected, malformed).
    Error { error: String },
}

/// Unsolicited push to the UI front end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiPush {
    /// Analysis finished for this connection's surface.
    AnalysisResult {
        tone: ToneLevel,
        #[serde(rename = "toneText")]
        tone_text: String,
        suggestions: Vec<String>,
        timestamp: u64,
    },
    /// Analysis failed (transport or application error).
    Error { error: String },
}

// ============================================================================
// Tests
// ============================================================================
